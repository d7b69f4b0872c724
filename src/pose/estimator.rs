use anyhow::Result;

use super::crop::{remap_pose, CropRegion};
use super::keypoint::Pose;
use super::preprocess::RgbFrame;

/// 姿勢推定器
///
/// 入力はフレーム全体とクロップ領域。返す `Pose` はクロップ内の正規化座標で、
/// 元画像座標への変換は呼び出し側（[`estimate_full_frame`]）が行う。
/// 推論は同期・ブロッキング呼び出しとして扱う。
pub trait PoseEstimator {
    /// 推定器の識別子
    fn name(&self) -> &'static str;

    /// クロップ領域内の 17 キーポイントを推定
    fn infer(&mut self, frame: &RgbFrame, crop: &CropRegion) -> Result<Pose>;
}

/// 推定してフレーム全体の正規化座標に戻す
pub fn estimate_full_frame<E: PoseEstimator + ?Sized>(
    estimator: &mut E,
    frame: &RgbFrame,
    crop: &CropRegion,
) -> Result<Pose> {
    let local = estimator.infer(frame, crop)?;
    Ok(remap_pose(&local, crop))
}

#[cfg(feature = "onnx")]
pub use movenet::MoveNetEstimator;

#[cfg(feature = "onnx")]
mod movenet {
    use anyhow::{Context, Result};
    use ort::session::builder::GraphOptimizationLevel;
    use ort::session::Session;
    use ort::value::Tensor;
    use std::path::Path;

    use super::PoseEstimator;
    use crate::error::AnalysisError;
    use crate::pose::crop::CropRegion;
    use crate::pose::keypoint::{Keypoint, KeypointIndex, Pose};
    use crate::pose::preprocess::{crop_and_resize, RgbFrame};

    /// MoveNet (single pose) を使用した姿勢検出器
    pub struct MoveNetEstimator {
        session: Session,
        input_size: usize,
    }

    impl MoveNetEstimator {
        /// ONNXモデルを読み込んで初期化
        ///
        /// `input_size`: Lightning = 192, Thunder = 256
        pub fn new<P: AsRef<Path>>(model_path: P, input_size: usize) -> Result<Self> {
            let session = Session::builder()?
                .with_optimization_level(GraphOptimizationLevel::Level3)?
                .commit_from_file(model_path.as_ref())
                .context("Failed to load ONNX model")?;

            Ok(Self {
                session,
                input_size,
            })
        }
    }

    impl PoseEstimator for MoveNetEstimator {
        fn name(&self) -> &'static str {
            "movenet"
        }

        fn infer(&mut self, frame: &RgbFrame, crop: &CropRegion) -> Result<Pose> {
            let input = crop_and_resize(frame, crop, self.input_size);
            let input_tensor = Tensor::from_array(input)?;
            let outputs = self
                .session
                .run(ort::inputs!["serving_default_input_0" => input_tensor])
                .context("Inference failed")?;

            // MoveNet の出力は [1, 1, 17, 3] (y, x, confidence)
            let output: ndarray::ArrayViewD<f32> = outputs["StatefulPartitionedCall_0"]
                .try_extract_array()
                .context("Failed to extract output tensor")?;

            if output.shape() != &[1, 1, KeypointIndex::COUNT, 3][..] {
                return Err(AnalysisError::ModelOutput(format!(
                    "movenet output {:?}",
                    output.shape()
                ))
                .into());
            }

            let mut keypoints = [Keypoint::default(); KeypointIndex::COUNT];
            for (i, kp) in keypoints.iter_mut().enumerate() {
                let y = output[[0, 0, i, 0]];
                let x = output[[0, 0, i, 1]];
                let confidence = output[[0, 0, i, 2]];
                *kp = Keypoint::new(x, y, confidence);
            }

            Ok(Pose::new(keypoints))
        }
    }
}
