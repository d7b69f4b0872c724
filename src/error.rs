use thiserror::Error;

/// 上流コラボレータの契約違反
///
/// 欠損キーポイントや低信頼度はエラーではない（`Option` で伝播する）。
/// ここに並ぶのは入力の形そのものが壊れているケースのみ。
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("expected {expected} keypoints, got {actual}")]
    KeypointCount { expected: usize, actual: usize },

    #[error("expected feature vector of length {expected}, got {actual}")]
    FeatureLength { expected: usize, actual: usize },

    #[error("swing must contain at least one frame")]
    EmptySwing,

    #[error("contact frame index {index} out of range for swing of {len} frames")]
    ContactOutOfRange { index: usize, len: usize },

    #[error("invalid image size {width}x{height}")]
    InvalidImageSize { width: u32, height: u32 },

    #[error("invalid frame rate {0}")]
    InvalidFrameRate(f32),

    #[error("classifier returned {actual} labels for {expected} frames")]
    LabelCount { expected: usize, actual: usize },

    #[error("model output has unexpected shape: {0}")]
    ModelOutput(String),

    #[error("reference profile phase {phase} has {actual} values per statistic, expected {expected}")]
    ProfileShape {
        phase: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("only {found} qualifying reference videos, need at least {required}")]
    InsufficientReferences { found: usize, required: usize },
}
