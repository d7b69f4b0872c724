use serde::{Deserialize, Serialize};

use crate::config::FeatureConfig;
use crate::error::AnalysisError;
use crate::pose::signal::Frame;
use crate::swing::{PhaseMap, SwingPhase};

use super::extractor::{FeatureExtractor, FeatureVector, FEATURE_COUNT};

/// 品質モデルの入力次元（平均・標準偏差・レンジ）
pub const MODEL_INPUT_LEN: usize = FEATURE_COUNT * 3;

/// 1局面分の特徴量統計
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseAggregate {
    pub frame_count: usize,
    pub mean: FeatureVector,
    /// 母標準偏差
    pub std_dev: FeatureVector,
    pub range: FeatureVector,
}

impl PhaseAggregate {
    /// 特徴量ごとに有限値だけで統計を取る
    ///
    /// 有限値が1つも無い特徴量は平均・標準偏差・レンジとも 0。
    pub fn from_features(features: &[FeatureVector], clamp: f32) -> Self {
        let stats = FeatureStats::from_features(features);
        let mut mean = [0.0; FEATURE_COUNT];
        let mut std_dev = [0.0; FEATURE_COUNT];
        let mut range = [0.0; FEATURE_COUNT];
        for k in 0..FEATURE_COUNT {
            mean[k] = sanitize(stats.mean[k], clamp);
            std_dev[k] = sanitize(stats.std_dev[k], clamp);
            range[k] = sanitize(stats.max[k] - stats.min[k], clamp);
        }

        Self {
            frame_count: stats.frame_count,
            mean,
            std_dev,
            range,
        }
    }

    /// `[平均 20, 標準偏差 20, レンジ 20]`
    pub fn to_model_input(&self) -> [f32; MODEL_INPUT_LEN] {
        let mut input = [0.0; MODEL_INPUT_LEN];
        input[..FEATURE_COUNT].copy_from_slice(&self.mean);
        input[FEATURE_COUNT..FEATURE_COUNT * 2].copy_from_slice(&self.std_dev);
        input[FEATURE_COUNT * 2..].copy_from_slice(&self.range);
        input
    }
}

/// 特徴量ごとの基本統計（有限値のみ）
///
/// 局面集約と参照プロファイルの両方がこれを使う。
/// 有限値が無い特徴量は全て 0。
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FeatureStats {
    pub frame_count: usize,
    pub mean: FeatureVector,
    /// 母標準偏差
    pub std_dev: FeatureVector,
    pub min: FeatureVector,
    pub max: FeatureVector,
}

impl FeatureStats {
    pub fn from_features(features: &[FeatureVector]) -> Self {
        let mut stats = Self {
            frame_count: features.len(),
            mean: [0.0; FEATURE_COUNT],
            std_dev: [0.0; FEATURE_COUNT],
            min: [0.0; FEATURE_COUNT],
            max: [0.0; FEATURE_COUNT],
        };

        for k in 0..FEATURE_COUNT {
            let values: Vec<f64> = features
                .iter()
                .map(|f| f[k])
                .filter(|v| v.is_finite())
                .map(f64::from)
                .collect();
            if values.is_empty() {
                continue;
            }
            let n = values.len() as f64;
            let m = values.iter().sum::<f64>() / n;
            let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n;
            stats.mean[k] = m as f32;
            stats.std_dev[k] = var.sqrt() as f32;
            stats.min[k] = values.iter().copied().fold(f64::INFINITY, f64::min) as f32;
            stats.max[k] = values.iter().copied().fold(f64::NEG_INFINITY, f64::max) as f32;
        }

        stats
    }
}

fn sanitize(v: f32, clamp: f32) -> f32 {
    if v.is_finite() {
        v.clamp(-clamp, clamp)
    } else {
        0.0
    }
}

/// 局面ごとの特徴量集約
#[derive(Debug, Clone)]
pub struct PhaseAggregator {
    extractor: FeatureExtractor,
    clamp: f32,
}

impl PhaseAggregator {
    pub fn new(config: &FeatureConfig) -> Self {
        Self {
            extractor: FeatureExtractor::new(config),
            clamp: config.clamp,
        }
    }

    /// ある局面に属するフレーム列をまとめて集約
    ///
    /// 速度の参照は列内の直前フレーム。間が空いていても実経過時間で割る。
    pub fn aggregate(&self, frames: &[Frame], is_right_handed: bool) -> PhaseAggregate {
        let features = self.extractor.extract_swing(frames, is_right_handed);
        PhaseAggregate::from_features(&features, self.clamp)
    }

    /// スイング全体の特徴量とラベルから、出現した局面ごとに集約
    ///
    /// `None` ラベルのフレームは集計しない。
    pub fn aggregate_by_phase(
        &self,
        features: &[FeatureVector],
        labels: &[SwingPhase],
    ) -> Result<PhaseMap<PhaseAggregate>, AnalysisError> {
        if features.len() != labels.len() {
            return Err(AnalysisError::LabelCount {
                expected: features.len(),
                actual: labels.len(),
            });
        }

        let mut grouped: PhaseMap<Vec<FeatureVector>> = PhaseMap::new();
        for (f, &phase) in features.iter().zip(labels) {
            if phase == SwingPhase::None {
                continue;
            }
            match grouped.get_mut(phase) {
                Some(v) => v.push(*f),
                None => {
                    grouped.insert(phase, vec![*f]);
                }
            }
        }

        Ok(grouped.map(|_, v| PhaseAggregate::from_features(v, self.clamp)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SignalConfig;
    use crate::features::extractor::index;
    use crate::pose::signal::SignalBuilder;
    use crate::test_support::{body, BACK, PREP};

    fn with_first(values: &[f32]) -> Vec<FeatureVector> {
        values
            .iter()
            .map(|&v| {
                let mut f = [0.5; FEATURE_COUNT];
                f[0] = v;
                f
            })
            .collect()
    }

    #[test]
    fn test_aggregate_fixture() {
        let agg = PhaseAggregate::from_features(&with_first(&[1.0, 2.0, 3.0]), 3.0);
        assert_eq!(agg.frame_count, 3);
        assert!((agg.mean[0] - 2.0).abs() < 1e-6);
        assert!((agg.std_dev[0] - (2.0f32 / 3.0).sqrt()).abs() < 1e-6);
        assert!((agg.range[0] - 2.0).abs() < 1e-6);
        // 定数の特徴量
        assert_eq!(agg.mean[1], 0.5);
        assert_eq!(agg.std_dev[1], 0.0);
        assert_eq!(agg.range[1], 0.0);
    }

    #[test]
    fn test_non_finite_values_are_dropped() {
        let agg = PhaseAggregate::from_features(&with_first(&[1.0, f32::NAN, 3.0, f32::INFINITY]), 3.0);
        assert!((agg.mean[0] - 2.0).abs() < 1e-6);
        assert!((agg.std_dev[0] - 1.0).abs() < 1e-6);

        let agg = PhaseAggregate::from_features(&with_first(&[f32::NAN, f32::NAN]), 3.0);
        assert_eq!(agg.mean[0], 0.0);
        assert_eq!(agg.std_dev[0], 0.0);
        assert_eq!(agg.range[0], 0.0);
    }

    #[test]
    fn test_empty_phase_is_zero() {
        let agg = PhaseAggregate::from_features(&[], 3.0);
        assert_eq!(agg.frame_count, 0);
        assert!(agg.to_model_input().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_model_input_layout() {
        let agg = PhaseAggregate::from_features(&with_first(&[1.0, 3.0]), 3.0);
        let input = agg.to_model_input();
        assert_eq!(input[0], 2.0);
        assert_eq!(input[FEATURE_COUNT], 1.0);
        assert_eq!(input[FEATURE_COUNT * 2], 2.0);
    }

    #[test]
    fn test_aggregate_by_phase() {
        let aggregator = PhaseAggregator::new(&FeatureConfig::default());
        let features = with_first(&[0.1, 0.2, 1.0, 2.0, 3.0]);
        let labels = [
            SwingPhase::None,
            SwingPhase::Preparation,
            SwingPhase::Contact,
            SwingPhase::Contact,
            SwingPhase::Contact,
        ];
        let phases = aggregator.aggregate_by_phase(&features, &labels).unwrap();
        assert!(!phases.contains(SwingPhase::None));
        assert!(!phases.contains(SwingPhase::Backswing));
        assert_eq!(phases.get(SwingPhase::Preparation).unwrap().frame_count, 1);
        let contact = phases.get(SwingPhase::Contact).unwrap();
        assert!((contact.mean[0] - 2.0).abs() < 1e-6);

        assert!(aggregator.aggregate_by_phase(&features, &labels[..4]).is_err());
    }

    #[test]
    fn test_aggregate_frames_matches_phase_grouping() {
        let mut builder = SignalBuilder::new(640, 480, 30.0, &SignalConfig::default()).unwrap();
        let frames: Vec<Frame> = (0..8)
            .map(|k| {
                let t = k as f32 / 7.0;
                let wrist = (PREP.0 + (BACK.0 - PREP.0) * t, PREP.1 + (BACK.1 - PREP.1) * t);
                builder.push(&body(wrist, 0.9))
            })
            .collect();

        let aggregator = PhaseAggregator::new(&FeatureConfig::default());
        let agg = aggregator.aggregate(&frames, true);
        assert_eq!(agg.frame_count, 8);
        assert_eq!(agg.mean[index::HANDEDNESS], 1.0);
        assert!(agg.mean[index::DOMINANT_WRIST_SPEED] > 0.0);

        // 同じフレームを1局面としてまとめた場合と一致する
        let features = FeatureExtractor::new(&FeatureConfig::default()).extract_swing(&frames, true);
        let labels = vec![SwingPhase::Backswing; frames.len()];
        let phases = aggregator.aggregate_by_phase(&features, &labels).unwrap();
        assert_eq!(phases.get(SwingPhase::Backswing), Some(&agg));
    }

    #[test]
    fn test_feature_stats_min_max() {
        let stats = FeatureStats::from_features(&with_first(&[3.0, f32::NAN, -1.0, 2.0]));
        assert_eq!(stats.frame_count, 4);
        assert_eq!(stats.min[0], -1.0);
        assert_eq!(stats.max[0], 3.0);
        assert!((stats.mean[0] - 4.0 / 3.0).abs() < 1e-6);
        assert_eq!(stats.min[1], 0.5);
        assert_eq!(stats.std_dev[1], 0.0);

        // レンジは最大と最小の差
        let agg = PhaseAggregate::from_features(&with_first(&[3.0, f32::NAN, -1.0, 2.0]), 10.0);
        assert_eq!(agg.range[0], stats.max[0] - stats.min[0]);
        assert_eq!(agg.mean[0], stats.mean[0]);
    }
}
