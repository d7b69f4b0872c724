pub mod deviation;
pub mod profile;
pub mod quality;

pub use deviation::{compute_deviations, FeatureDeviation, Severity, Direction};
pub use profile::{PhaseProfile, ProfileBuilder, ReferenceProfile, ReferenceSwing, StrokeType};
pub use quality::{heuristic_score, overall_score, PhaseScore, QualityModel, QualityScorer};

#[cfg(feature = "onnx")]
pub use quality::OnnxQualityModel;
