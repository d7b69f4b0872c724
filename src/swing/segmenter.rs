use serde::Serialize;

use crate::config::SegmenterConfig;
use crate::pose::signal::Frame;

use super::phase::{heuristic_phase, is_qualifying, SwingPhase};

/// 区間を閉じた理由
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    /// 末尾にフォロースルーが安定して続いた
    StableFollowThrough,
    /// フォロースルー後に構えへ戻った
    ReturnToPreparation,
    /// バッファが上限（`max_swing_frames`）を超えた
    Timeout,
    /// 可視ゲートの連続失敗による強制終了
    VisibilityLost,
    /// 入力の終端
    EndOfStream,
}

/// 閉じた区間を捨てた理由
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropCause {
    TooShort,
    /// 構えとバックスイング/フォロースルーが揃っていない
    Invalid,
}

/// 閉じたスイング区間（打点検出前）
#[derive(Debug, Clone)]
pub struct ClosedSegment {
    pub frames: Vec<Frame>,
    pub reason: CompletionReason,
}

/// 1フレーム投入ごとの結果
#[derive(Debug, Clone)]
pub enum SegmentEvent {
    /// 待機中でフレームは使われなかった
    Idle,
    /// 新しい区間を開始した
    Started,
    /// 区間に追加した
    Continued,
    /// 可視ゲートで弾かれた（区間は継続中）
    Missing,
    Emitted(ClosedSegment),
    Dropped {
        reason: CompletionReason,
        len: usize,
        cause: DropCause,
    },
}

impl SegmentEvent {
    /// 区間が閉じた場合はその理由
    pub fn completion(&self) -> Option<CompletionReason> {
        match self {
            Self::Emitted(segment) => Some(segment.reason),
            Self::Dropped { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

/// 区間検出の集計
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SegmenterStats {
    pub frames_seen: usize,
    pub swings_started: usize,
    pub swings_emitted: usize,
    pub dropped_too_short: usize,
    pub dropped_invalid: usize,
    pub visibility_losses: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmenterState {
    Idle,
    Tracking,
}

/// スイング区間検出ステートマシン
///
/// - Idle: 可視ゲートを通り、粗い局面推定が Preparation のフレームで Tracking へ
/// - Tracking: ゲートを通ったフレームを局面ラベル付きでバッファに積み、終了条件を判定
///
/// `finish` を呼ばずに破棄した場合、途中のバッファは捨てられる。
pub struct SwingSegmenter {
    config: SegmenterConfig,
    state: SegmenterState,
    buffer: Vec<Frame>,
    missing: usize,
    stats: SegmenterStats,
}

impl SwingSegmenter {
    pub fn new(config: &SegmenterConfig) -> Self {
        Self {
            config: config.clone(),
            state: SegmenterState::Idle,
            buffer: Vec::new(),
            missing: 0,
            stats: SegmenterStats::default(),
        }
    }

    pub fn state(&self) -> SegmenterState {
        self.state
    }

    pub fn stats(&self) -> SegmenterStats {
        self.stats
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// 時系列順にフレームを1枚投入
    pub fn push(&mut self, frame: Frame) -> SegmentEvent {
        self.stats.frames_seen += 1;
        let qualifying = is_qualifying(&frame, self.config.visibility_confidence);

        match self.state {
            SegmenterState::Idle => {
                if !qualifying {
                    return SegmentEvent::Idle;
                }
                let phase = heuristic_phase(&frame, &self.config);
                if phase != SwingPhase::Preparation {
                    return SegmentEvent::Idle;
                }
                log::debug!("swing started at frame {}", frame.index());
                self.buffer.push(frame.with_phase(phase));
                self.state = SegmenterState::Tracking;
                self.missing = 0;
                self.stats.swings_started += 1;
                SegmentEvent::Started
            }
            SegmenterState::Tracking => {
                if !qualifying {
                    self.missing += 1;
                    if self.missing > self.config.max_missing_frames {
                        self.stats.visibility_losses += 1;
                        return self.close(CompletionReason::VisibilityLost);
                    }
                    return SegmentEvent::Missing;
                }
                self.missing = 0;
                let phase = heuristic_phase(&frame, &self.config);
                self.buffer.push(frame.with_phase(phase));

                match self.completion() {
                    Some(reason)
                        if self.is_valid()
                            || self.buffer.len() >= self.config.soft_limit_frames =>
                    {
                        self.close(reason)
                    }
                    _ => SegmentEvent::Continued,
                }
            }
        }
    }

    /// 入力終端。追跡中の区間を通常の規則で閉じる
    pub fn finish(&mut self) -> SegmentEvent {
        match self.state {
            SegmenterState::Idle => SegmentEvent::Idle,
            SegmenterState::Tracking => self.close(CompletionReason::EndOfStream),
        }
    }

    fn completion(&self) -> Option<CompletionReason> {
        let buffer = &self.buffer;
        let n = buffer.len();

        let follow_run = buffer
            .iter()
            .rev()
            .take_while(|f| f.phase() == SwingPhase::FollowThrough)
            .count();
        if follow_run >= self.config.stable_follow_through_frames {
            return Some(CompletionReason::StableFollowThrough);
        }

        // 末尾ウィンドウ内の構えが、それより前のフォロースルーに続いている
        if n > self.config.return_to_prep_min_frames {
            let start = n.saturating_sub(self.config.return_to_prep_window);
            let last_prep = buffer[start..]
                .iter()
                .rposition(|f| f.phase() == SwingPhase::Preparation);
            if let Some(p) = last_prep {
                if buffer[..start + p]
                    .iter()
                    .any(|f| f.phase() == SwingPhase::FollowThrough)
                {
                    return Some(CompletionReason::ReturnToPreparation);
                }
            }
        }

        if n > self.config.max_swing_frames {
            return Some(CompletionReason::Timeout);
        }
        None
    }

    /// 構えと、バックスイングまたはフォロースルーを含むか
    fn is_valid(&self) -> bool {
        let has = |phase: SwingPhase| self.buffer.iter().any(|f| f.phase() == phase);
        has(SwingPhase::Preparation)
            && (has(SwingPhase::Backswing) || has(SwingPhase::FollowThrough))
    }

    fn close(&mut self, reason: CompletionReason) -> SegmentEvent {
        let valid = self.is_valid();
        let frames = std::mem::take(&mut self.buffer);
        self.state = SegmenterState::Idle;
        self.missing = 0;
        let len = frames.len();

        if len < self.config.min_swing_frames {
            log::debug!("dropped {}-frame swing ({:?}): too short", len, reason);
            self.stats.dropped_too_short += 1;
            return SegmentEvent::Dropped {
                reason,
                len,
                cause: DropCause::TooShort,
            };
        }
        // 強制終了は長さだけで判定
        if !valid && reason != CompletionReason::VisibilityLost {
            log::debug!("dropped {}-frame swing ({:?}): no swing motion", len, reason);
            self.stats.dropped_invalid += 1;
            return SegmentEvent::Dropped {
                reason,
                len,
                cause: DropCause::Invalid,
            };
        }

        log::info!(
            "swing closed ({:?}): frames {}..={}",
            reason,
            frames.first().map_or(0, Frame::index),
            frames.last().map_or(0, Frame::index)
        );
        self.stats.swings_emitted += 1;
        SegmentEvent::Emitted(ClosedSegment { frames, reason })
    }
}
