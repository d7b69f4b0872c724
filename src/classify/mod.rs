pub mod smooth;

pub use smooth::smooth;

use anyhow::Result;

use crate::config::SmoothingConfig;
use crate::error::AnalysisError;
use crate::features::extractor::index;
use crate::features::FeatureVector;
use crate::swing::SwingPhase;

/// フレーム列の局面分類器
///
/// スイング全体の特徴量列を一度に受け取り、フレームごとのラベルを返す。
pub trait PhaseClassifier {
    fn name(&self) -> &'static str;

    /// 学習済みモデルによる推論か
    fn is_model(&self) -> bool;

    fn classify(&mut self, features: &[FeatureVector]) -> Result<Vec<SwingPhase>>;
}

/// モデルが無いときの代替分類
///
/// 利き手手首速度のピークを打点とし、その前後1フレームを Contact にする。
/// 打点より前は、速度がピークの一定割合を超えた最初のフレームから Backswing、
/// それ以前は Preparation。打点より後は FollowThrough。
/// 割合は `[smoothing] backswing_fraction`（既定 0.25）。
#[derive(Debug, Clone)]
pub struct HeuristicPhaseClassifier {
    backswing_fraction: f32,
}

impl HeuristicPhaseClassifier {
    pub fn new(config: &SmoothingConfig) -> Self {
        Self {
            backswing_fraction: config.backswing_fraction,
        }
    }

    pub fn label(&self, features: &[FeatureVector]) -> Vec<SwingPhase> {
        let speeds: Vec<f32> = features
            .iter()
            .map(|f| f[index::DOMINANT_WRIST_SPEED])
            .collect();

        let mut peak: Option<(usize, f32)> = None;
        for (i, &s) in speeds.iter().enumerate() {
            if peak.map_or(true, |(_, p)| s > p) {
                peak = Some((i, s));
            }
        }
        let Some((contact, peak_speed)) = peak.filter(|&(_, p)| p > 0.0) else {
            return vec![SwingPhase::Preparation; features.len()];
        };

        let onset = speeds[..contact]
            .iter()
            .position(|&s| s >= peak_speed * self.backswing_fraction)
            .unwrap_or(contact);

        (0..features.len())
            .map(|i| {
                if i + 1 >= contact && i <= contact + 1 {
                    SwingPhase::Contact
                } else if i > contact {
                    SwingPhase::FollowThrough
                } else if i >= onset {
                    SwingPhase::Backswing
                } else {
                    SwingPhase::Preparation
                }
            })
            .collect()
    }
}

impl Default for HeuristicPhaseClassifier {
    fn default() -> Self {
        Self::new(&SmoothingConfig::default())
    }
}

impl PhaseClassifier for HeuristicPhaseClassifier {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn is_model(&self) -> bool {
        false
    }

    fn classify(&mut self, features: &[FeatureVector]) -> Result<Vec<SwingPhase>> {
        Ok(self.label(features))
    }
}

/// 平滑化済みのラベル列
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseLabels {
    pub labels: Vec<SwingPhase>,
    pub is_from_model: bool,
}

/// 分類器の入出力を整え、平滑化まで行うアダプタ
///
/// 分類器が失敗した場合は警告を出して代替分類に切り替える。
/// ラベル数がフレーム数と合わないのは契約違反としてエラー。
pub struct PhaseClassifierAdapter {
    classifier: Box<dyn PhaseClassifier>,
    fallback: HeuristicPhaseClassifier,
    min_phase_duration: usize,
}

impl PhaseClassifierAdapter {
    pub fn new(classifier: Box<dyn PhaseClassifier>, config: &SmoothingConfig) -> Self {
        Self {
            classifier,
            fallback: HeuristicPhaseClassifier::new(config),
            min_phase_duration: config.min_phase_duration,
        }
    }

    /// 代替分類のみ
    pub fn heuristic(config: &SmoothingConfig) -> Self {
        Self::new(Box::new(HeuristicPhaseClassifier::new(config)), config)
    }

    pub fn classifier_name(&self) -> &'static str {
        self.classifier.name()
    }

    pub fn classify(&mut self, features: &[FeatureVector]) -> Result<PhaseLabels, AnalysisError> {
        let (raw, is_from_model) = match self.classifier.classify(features) {
            Ok(labels) => (labels, self.classifier.is_model()),
            Err(e) => {
                log::warn!(
                    "phase classifier '{}' failed: {:#}; using heuristic labels",
                    self.classifier.name(),
                    e
                );
                (self.fallback.label(features), false)
            }
        };

        if raw.len() != features.len() {
            return Err(AnalysisError::LabelCount {
                expected: features.len(),
                actual: raw.len(),
            });
        }

        Ok(PhaseLabels {
            labels: smooth(&raw, self.min_phase_duration),
            is_from_model,
        })
    }
}

#[cfg(feature = "onnx")]
pub use onnx::OnnxPhaseClassifier;

#[cfg(feature = "onnx")]
mod onnx {
    use anyhow::{Context, Result};
    use ndarray::Array3;
    use ort::session::builder::GraphOptimizationLevel;
    use ort::session::Session;
    use ort::value::Tensor;
    use std::path::Path;

    use super::PhaseClassifier;
    use crate::error::AnalysisError;
    use crate::features::{FeatureVector, FEATURE_COUNT};
    use crate::swing::SwingPhase;

    /// 系列モデル `phase_classifier.onnx`
    ///
    /// 入力 `features` [1, T, 20]、出力 `phase_scores` [1, T, 5]（`SwingPhase` の序数順）。
    pub struct OnnxPhaseClassifier {
        session: Session,
    }

    impl OnnxPhaseClassifier {
        pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
            let session = Session::builder()?
                .with_optimization_level(GraphOptimizationLevel::Level3)?
                .commit_from_file(model_path.as_ref())
                .with_context(|| {
                    format!("failed to load phase classifier {}", model_path.as_ref().display())
                })?;
            Ok(Self { session })
        }
    }

    impl PhaseClassifier for OnnxPhaseClassifier {
        fn name(&self) -> &'static str {
            "onnx_phase_classifier"
        }

        fn is_model(&self) -> bool {
            true
        }

        fn classify(&mut self, features: &[FeatureVector]) -> Result<Vec<SwingPhase>> {
            let t = features.len();
            let mut input = Array3::<f32>::zeros((1, t, FEATURE_COUNT));
            for (i, f) in features.iter().enumerate() {
                for (k, &v) in f.iter().enumerate() {
                    input[[0, i, k]] = v;
                }
            }

            let input_tensor = Tensor::from_array(input)?;
            let outputs = self
                .session
                .run(ort::inputs!["features" => input_tensor])
                .context("phase classifier inference failed")?;
            let scores: ndarray::ArrayViewD<f32> = outputs["phase_scores"]
                .try_extract_array()
                .context("failed to extract phase scores")?;

            if scores.shape() != &[1, t, SwingPhase::COUNT][..] {
                return Err(AnalysisError::ModelOutput(format!(
                    "phase classifier output {:?}",
                    scores.shape()
                ))
                .into());
            }

            let labels = (0..t)
                .map(|i| {
                    let mut best = 0;
                    for c in 1..SwingPhase::COUNT {
                        if scores[[0, i, c]] > scores[[0, i, best]] {
                            best = c;
                        }
                    }
                    SwingPhase::from_index(best).unwrap_or_default()
                })
                .collect();
            Ok(labels)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FEATURE_COUNT;
    use SwingPhase::{Backswing as B, Contact as C, FollowThrough as F, Preparation as P};

    fn with_speeds(speeds: &[f32]) -> Vec<FeatureVector> {
        speeds
            .iter()
            .map(|&s| {
                let mut f = [0.0; FEATURE_COUNT];
                f[index::DOMINANT_WRIST_SPEED] = s;
                f
            })
            .collect()
    }

    /// 常に固定のラベル列を返す分類器
    struct Fixed(Vec<SwingPhase>);

    impl PhaseClassifier for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn is_model(&self) -> bool {
            true
        }

        fn classify(&mut self, _features: &[FeatureVector]) -> Result<Vec<SwingPhase>> {
            Ok(self.0.clone())
        }
    }

    struct Failing;

    impl PhaseClassifier for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn is_model(&self) -> bool {
            true
        }

        fn classify(&mut self, _features: &[FeatureVector]) -> Result<Vec<SwingPhase>> {
            anyhow::bail!("no session")
        }
    }

    #[test]
    fn test_heuristic_labels() {
        let features = with_speeds(&[0.0, 0.05, 0.1, 0.3, 0.6, 1.0, 2.0, 1.0, 0.5, 0.2, 0.1, 0.0]);
        let labels = HeuristicPhaseClassifier::default().label(&features);
        // ピーク 2.0 の 25% = 0.5 を最初に超えるのは index 4
        assert_eq!(labels, vec![P, P, P, P, B, C, C, C, F, F, F, F]);
    }

    #[test]
    fn test_heuristic_without_motion() {
        let labels = HeuristicPhaseClassifier::default().label(&with_speeds(&[0.0; 4]));
        assert_eq!(labels, vec![P; 4]);
    }

    #[test]
    fn test_heuristic_backswing_fraction_from_config() {
        let features = with_speeds(&[0.0, 0.05, 0.1, 0.3, 0.6, 1.0, 2.0, 1.0, 0.5, 0.2, 0.1, 0.0]);
        let config = SmoothingConfig {
            min_phase_duration: 1,
            backswing_fraction: 0.1,
        };
        // ピーク 2.0 の 10% = 0.2 を最初に超えるのは index 3
        let labels = HeuristicPhaseClassifier::new(&config).label(&features);
        assert_eq!(labels, vec![P, P, P, B, B, C, C, C, F, F, F, F]);

        // 代替分類にも同じ割合が渡る
        let mut adapter = PhaseClassifierAdapter::new(Box::new(Failing), &config);
        assert_eq!(adapter.classify(&features).unwrap().labels, labels);
    }

    #[test]
    fn test_adapter_smooths_model_output() {
        let mut adapter = PhaseClassifierAdapter::new(
            Box::new(Fixed(vec![P, P, B, P, B, B, B])),
            &SmoothingConfig::default(),
        );
        let result = adapter.classify(&with_speeds(&[0.0; 7])).unwrap();
        assert_eq!(result.labels, vec![P, P, P, B, B, B, B]);
        assert!(result.is_from_model);
    }

    #[test]
    fn test_adapter_rejects_label_count_mismatch() {
        let mut adapter =
            PhaseClassifierAdapter::new(Box::new(Fixed(vec![P, P])), &SmoothingConfig::default());
        assert_eq!(
            adapter.classify(&with_speeds(&[0.0; 3])),
            Err(AnalysisError::LabelCount {
                expected: 3,
                actual: 2
            })
        );
    }

    #[test]
    fn test_adapter_falls_back_on_failure() {
        let mut adapter = PhaseClassifierAdapter::new(Box::new(Failing), &SmoothingConfig::default());
        let result = adapter.classify(&with_speeds(&[0.1, 0.5, 1.0, 0.5, 0.1])).unwrap();
        assert!(!result.is_from_model);
        assert_eq!(result.labels.len(), 5);
    }
}
