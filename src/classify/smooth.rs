use crate::swing::SwingPhase;

/// フェーズラベルの時間平滑化
///
/// 1. 両隣が一致していて自分だけ違う1フレームのスパイクを隣の値に直す
///    （判定は元の入力で行う）
/// 2. 長さが `min_phase_duration` 未満の連続区間を、直前の区間のラベルに揃える
///    （先頭の区間は対象外、左から順に処理）
pub fn smooth(labels: &[SwingPhase], min_phase_duration: usize) -> Vec<SwingPhase> {
    let n = labels.len();
    let mut out = labels.to_vec();

    for i in 1..n.saturating_sub(1) {
        let (before, current, after) = (labels[i - 1], labels[i], labels[i + 1]);
        if current != before && before == after {
            out[i] = before;
        }
    }

    let mut start = 0;
    while start < n {
        let label = out[start];
        let end = out[start..]
            .iter()
            .position(|&l| l != label)
            .map_or(n, |len| start + len);
        if start > 0 && end - start < min_phase_duration {
            let preceding = out[start - 1];
            out[start..end].fill(preceding);
        }
        start = end;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use SwingPhase::{Backswing as B, Contact as C, FollowThrough as F, Preparation as P};

    #[test]
    fn test_spike_fixture() {
        let labels = [P, P, B, P, B, B, B];
        assert_eq!(smooth(&labels, 3), vec![P, P, P, B, B, B, B]);
    }

    #[test]
    fn test_short_run_takes_preceding_label() {
        let labels = [P, P, P, B, B, C, C, C, C];
        assert_eq!(smooth(&labels, 3), vec![P, P, P, P, P, C, C, C, C]);
    }

    #[test]
    fn test_first_run_is_kept() {
        let labels = [B, P, P, P, P];
        // 先頭の1フレームはスパイクではなく、先頭区間なので残る
        assert_eq!(smooth(&labels, 3), labels.to_vec());
    }

    #[test]
    fn test_monotonic_sequence_unchanged() {
        let labels = [P, P, P, B, B, B, C, C, C, F, F, F];
        assert_eq!(smooth(&labels, 3), labels.to_vec());
    }

    #[test]
    fn test_degenerate_inputs() {
        assert!(smooth(&[], 3).is_empty());
        assert_eq!(smooth(&[C], 3), vec![C]);
        let labels = [P, B, P];
        assert_eq!(smooth(&labels, 1), vec![P, P, P]);
    }
}
