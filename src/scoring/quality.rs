use anyhow::Result;
use serde::Serialize;

use crate::config::{FeatureConfig, HeuristicWeights, ScoringConfig};
use crate::features::extractor::index;
use crate::features::PhaseAggregate;
use crate::swing::{PhaseMap, SwingPhase};

/// 局面ごとの品質回帰モデル
pub trait QualityModel {
    fn name(&self) -> &'static str;

    /// 0〜100 のスコア
    fn score(&mut self, aggregate: &PhaseAggregate) -> Result<f32>;
}

/// 1局面の品質スコア
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PhaseScore {
    pub phase: SwingPhase,
    pub score: f32,
    /// false ならヒューリスティックによる代替値
    pub is_from_model: bool,
}

/// モデルの代わりに使う経験則スコア
///
/// 基準点に、手首速度・肩速度の平均と、肘角度の 90° への近さを加える。
pub fn heuristic_score(aggregate: &PhaseAggregate, weights: &HeuristicWeights, limb_angle_norm: f32) -> f32 {
    let wrist = aggregate.mean[index::DOMINANT_WRIST_SPEED];
    let shoulder = aggregate.mean[index::DOMINANT_SHOULDER_SPEED];
    let elbow_deg = aggregate.mean[index::DOMINANT_ELBOW_ANGLE] * limb_angle_norm;
    let elbow_closeness = (1.0 - (elbow_deg - 90.0).abs() / 90.0).max(0.0);

    let score = weights.base
        + wrist * weights.wrist_speed
        + shoulder * weights.shoulder_speed
        + elbow_closeness * weights.elbow_angle;
    if score.is_finite() {
        score.clamp(0.0, 100.0)
    } else {
        weights.base.clamp(0.0, 100.0)
    }
}

/// モデルファイル名（`models_dir` 内）
pub fn model_file_name(phase: SwingPhase) -> Option<&'static str> {
    match phase {
        SwingPhase::Preparation => Some("prep_quality.onnx"),
        SwingPhase::Backswing => Some("backswing_quality.onnx"),
        SwingPhase::Contact => Some("contact_quality.onnx"),
        SwingPhase::FollowThrough => Some("followthrough_quality.onnx"),
        SwingPhase::None => None,
    }
}

/// 採点対象局面のスコアリング
///
/// モデルが無い局面、またはモデルが失敗した局面はヒューリスティックで採点し、
/// `is_from_model = false` を付ける。
pub struct QualityScorer {
    models: PhaseMap<Box<dyn QualityModel>>,
    config: ScoringConfig,
    limb_angle_norm: f32,
}

impl QualityScorer {
    pub fn new(config: &ScoringConfig, features: &FeatureConfig) -> Self {
        Self {
            models: PhaseMap::new(),
            config: config.clone(),
            limb_angle_norm: features.limb_angle_norm,
        }
    }

    pub fn with_model(mut self, phase: SwingPhase, model: Box<dyn QualityModel>) -> Self {
        self.models.insert(phase, model);
        self
    }

    /// `models_dir` から存在する局面モデルを読み込む
    #[cfg(feature = "onnx")]
    pub fn load_models<P: AsRef<std::path::Path>>(mut self, models_dir: P) -> Self {
        for phase in SwingPhase::SCORED {
            let Some(file) = model_file_name(phase) else {
                continue;
            };
            let path = models_dir.as_ref().join(file);
            if !path.exists() {
                log::warn!("{} not found; {} uses heuristic scoring", path.display(), phase.name());
                continue;
            }
            match OnnxQualityModel::new(&path) {
                Ok(model) => {
                    self.models.insert(phase, Box::new(model));
                }
                Err(e) => log::warn!("{:#}; {} uses heuristic scoring", e, phase.name()),
            }
        }
        self
    }

    pub fn has_model(&self, phase: SwingPhase) -> bool {
        self.models.contains(phase)
    }

    pub fn score_phase(&mut self, phase: SwingPhase, aggregate: &PhaseAggregate) -> PhaseScore {
        if let Some(model) = self.models.get_mut(phase) {
            match model.score(aggregate) {
                Ok(score) if score.is_finite() => {
                    return PhaseScore {
                        phase,
                        score: score.clamp(0.0, 100.0),
                        is_from_model: true,
                    };
                }
                Ok(score) => log::warn!(
                    "{} model '{}' returned {}; falling back to heuristic",
                    phase.name(),
                    model.name(),
                    score
                ),
                Err(e) => log::warn!(
                    "{} model '{}' failed: {:#}; falling back to heuristic",
                    phase.name(),
                    model.name(),
                    e
                ),
            }
        }
        PhaseScore {
            phase,
            score: heuristic_score(aggregate, &self.config.heuristic, self.limb_angle_norm),
            is_from_model: false,
        }
    }

    /// 採点対象の局面のうち、出現したものだけを採点
    pub fn score_phases(&mut self, aggregates: &PhaseMap<PhaseAggregate>) -> PhaseMap<PhaseScore> {
        let mut scores = PhaseMap::new();
        for (phase, aggregate) in aggregates.iter() {
            if phase.is_scored() {
                scores.insert(phase, self.score_phase(phase, aggregate));
            }
        }
        scores
    }
}

fn phase_weight(phase: SwingPhase, config: &ScoringConfig) -> f32 {
    match phase {
        SwingPhase::Backswing => config.backswing_weight,
        SwingPhase::Contact => config.contact_weight,
        SwingPhase::FollowThrough => config.follow_through_weight,
        _ => 0.0,
    }
}

/// 出現した採点局面の重み付き平均（重みは出現局面の和で正規化）
///
/// 採点局面が1つも無ければ `None`。
pub fn overall_score(scores: &PhaseMap<PhaseScore>, config: &ScoringConfig) -> Option<f32> {
    let mut weighted = 0.0;
    let mut total = 0.0;
    for (phase, score) in scores.iter() {
        let w = phase_weight(phase, config);
        weighted += score.score * w;
        total += w;
    }
    (total > 0.0).then(|| weighted / total)
}

#[cfg(feature = "onnx")]
pub use onnx::OnnxQualityModel;

#[cfg(feature = "onnx")]
mod onnx {
    use anyhow::{Context, Result};
    use ndarray::Array2;
    use ort::session::builder::GraphOptimizationLevel;
    use ort::session::Session;
    use ort::value::Tensor;
    use std::path::Path;

    use super::QualityModel;
    use crate::error::AnalysisError;
    use crate::features::{PhaseAggregate, MODEL_INPUT_LEN};

    /// 局面品質の回帰モデル
    ///
    /// 入力 `features` [1, 60]、出力 `quality_score` [1, 1]。
    pub struct OnnxQualityModel {
        session: Session,
    }

    impl OnnxQualityModel {
        pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
            let session = Session::builder()?
                .with_optimization_level(GraphOptimizationLevel::Level3)?
                .commit_from_file(model_path.as_ref())
                .with_context(|| {
                    format!("failed to load quality model {}", model_path.as_ref().display())
                })?;
            Ok(Self { session })
        }
    }

    impl QualityModel for OnnxQualityModel {
        fn name(&self) -> &'static str {
            "onnx_quality"
        }

        fn score(&mut self, aggregate: &PhaseAggregate) -> Result<f32> {
            let input = Array2::from_shape_vec((1, MODEL_INPUT_LEN), aggregate.to_model_input().to_vec())?;
            let input_tensor = Tensor::from_array(input)?;
            let outputs = self
                .session
                .run(ort::inputs!["features" => input_tensor])
                .context("quality inference failed")?;
            let output: ndarray::ArrayViewD<f32> = outputs["quality_score"]
                .try_extract_array()
                .context("failed to extract quality score")?;
            let score = output.iter().next().copied().ok_or_else(|| {
                AnalysisError::ModelOutput(format!("quality output {:?}", output.shape()))
            })?;
            Ok(score)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FEATURE_COUNT;

    fn aggregate(wrist: f32, shoulder: f32, elbow_norm: f32) -> PhaseAggregate {
        let mut mean = [0.0; FEATURE_COUNT];
        mean[index::DOMINANT_WRIST_SPEED] = wrist;
        mean[index::DOMINANT_SHOULDER_SPEED] = shoulder;
        mean[index::DOMINANT_ELBOW_ANGLE] = elbow_norm;
        PhaseAggregate {
            frame_count: 5,
            mean,
            std_dev: [0.0; FEATURE_COUNT],
            range: [0.0; FEATURE_COUNT],
        }
    }

    struct ConstantModel(f32);

    impl QualityModel for ConstantModel {
        fn name(&self) -> &'static str {
            "constant"
        }

        fn score(&mut self, _aggregate: &PhaseAggregate) -> Result<f32> {
            Ok(self.0)
        }
    }

    struct BrokenModel;

    impl QualityModel for BrokenModel {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn score(&mut self, _aggregate: &PhaseAggregate) -> Result<f32> {
            anyhow::bail!("session closed")
        }
    }

    #[test]
    fn test_heuristic_score() {
        let weights = HeuristicWeights::default();
        // 50 + 0.5*20 + 0.2*15 + 1.0*10 (肘 90°)
        let score = heuristic_score(&aggregate(0.5, 0.2, 0.5), &weights, 180.0);
        assert!((score - 73.0).abs() < 1e-4);
        // 上限
        assert_eq!(heuristic_score(&aggregate(3.0, 3.0, 0.5), &weights, 180.0), 100.0);
    }

    #[test]
    fn test_model_and_fallback_flags() {
        let mut scorer = QualityScorer::new(&ScoringConfig::default(), &FeatureConfig::default())
            .with_model(SwingPhase::Contact, Box::new(ConstantModel(88.0)))
            .with_model(SwingPhase::Backswing, Box::new(BrokenModel));
        let agg = aggregate(0.5, 0.2, 0.5);

        let contact = scorer.score_phase(SwingPhase::Contact, &agg);
        assert_eq!(contact.score, 88.0);
        assert!(contact.is_from_model);

        let backswing = scorer.score_phase(SwingPhase::Backswing, &agg);
        assert!(!backswing.is_from_model);
        assert!((backswing.score - 73.0).abs() < 1e-4);

        let follow = scorer.score_phase(SwingPhase::FollowThrough, &agg);
        assert!(!follow.is_from_model);
    }

    #[test]
    fn test_model_score_is_clamped() {
        let mut scorer = QualityScorer::new(&ScoringConfig::default(), &FeatureConfig::default())
            .with_model(SwingPhase::Contact, Box::new(ConstantModel(140.0)));
        assert_eq!(scorer.score_phase(SwingPhase::Contact, &aggregate(0.0, 0.0, 0.0)).score, 100.0);
    }

    #[test]
    fn test_preparation_is_not_scored() {
        let mut scorer = QualityScorer::new(&ScoringConfig::default(), &FeatureConfig::default());
        let mut aggregates = PhaseMap::new();
        aggregates.insert(SwingPhase::Preparation, aggregate(0.1, 0.1, 0.5));
        aggregates.insert(SwingPhase::Contact, aggregate(0.1, 0.1, 0.5));
        let scores = scorer.score_phases(&aggregates);
        assert!(!scores.contains(SwingPhase::Preparation));
        assert!(scores.contains(SwingPhase::Contact));
    }

    #[test]
    fn test_overall_uses_present_phases_only() {
        let config = ScoringConfig::default();
        let score = |phase, value| PhaseScore {
            phase,
            score: value,
            is_from_model: true,
        };

        let mut scores = PhaseMap::new();
        scores.insert(SwingPhase::Backswing, score(SwingPhase::Backswing, 60.0));
        scores.insert(SwingPhase::Contact, score(SwingPhase::Contact, 80.0));
        // (60*0.3 + 80*0.4) / 0.7
        let overall = overall_score(&scores, &config).unwrap();
        assert!((overall - 50.0 / 0.7).abs() < 1e-3);

        scores.insert(SwingPhase::FollowThrough, score(SwingPhase::FollowThrough, 70.0));
        let overall = overall_score(&scores, &config).unwrap();
        assert!((overall - 71.0).abs() < 1e-3);

        assert_eq!(overall_score(&PhaseMap::new(), &config), None);
    }
}
