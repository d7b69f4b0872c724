pub mod crop;
pub mod estimator;
pub mod keypoint;
pub mod preprocess;
pub mod signal;

pub use crop::{remap_pose, CropRegion, RegionTracker};
pub use estimator::{estimate_full_frame, PoseEstimator};
#[cfg(feature = "onnx")]
pub use estimator::MoveNetEstimator;
pub use keypoint::{Keypoint, KeypointIndex, Pose, Side};
pub use preprocess::RgbFrame;
pub use signal::{Frame, FrameMeta, JointAngle, JointObservation, SignalBuilder};
