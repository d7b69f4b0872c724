pub mod aggregate;
pub mod extractor;

pub use aggregate::{PhaseAggregate, PhaseAggregator, MODEL_INPUT_LEN};
pub use extractor::{
    feature_vector_from_slice, FeatureExtractor, FeatureVector, FEATURE_COUNT, FEATURE_NAMES,
};
