use crate::pose::keypoint::{Keypoint, Side};
use crate::pose::signal::Frame;

/// 打点（インパクト）フレーム検出
///
/// 返り値はスイング内のインデックスで、空でなければ必ず `[0, len)` に収まる。
pub trait ContactDetector {
    fn name(&self) -> &'static str;

    fn detect(&self, frames: &[Frame], image_height: u32, image_width: u32) -> usize;
}

/// 手首速度のピークを打点とみなす検出器
///
/// 左右どちらの手首を見るかは、区間内の平均信頼度が高い方で決める。
/// 速度がどこにも定義されていなければ区間の中央を返す。
#[derive(Debug, Clone)]
pub struct PeakWristSpeedDetector {
    min_confidence: f32,
}

impl PeakWristSpeedDetector {
    pub fn new(min_confidence: f32) -> Self {
        Self { min_confidence }
    }

    fn wrist_side(frames: &[Frame]) -> Side {
        let mean = |side: Side| {
            let wrist = side.joints().wrist;
            frames.iter().map(|f| f.joint(wrist).confidence).sum::<f32>() / frames.len() as f32
        };
        if mean(Side::Left) > mean(Side::Right) {
            Side::Left
        } else {
            Side::Right
        }
    }
}

impl Default for PeakWristSpeedDetector {
    fn default() -> Self {
        Self::new(0.2)
    }
}

impl ContactDetector for PeakWristSpeedDetector {
    fn name(&self) -> &'static str {
        "peak_wrist_speed"
    }

    fn detect(&self, frames: &[Frame], image_height: u32, image_width: u32) -> usize {
        if frames.is_empty() {
            return 0;
        }
        let wrist = Self::wrist_side(frames).joints().wrist;
        let pixel = |kp: Keypoint| kp.to_pixel(image_width, image_height);

        let mut best: Option<(usize, f32)> = None;
        for (i, frame) in frames.iter().enumerate() {
            let current = frame.joint(wrist);
            // 保存済みの速度が無ければ直前フレームから求め直す
            let speed = current.speed.or_else(|| {
                let prev = frames.get(i.checked_sub(1)?)?;
                let p0 = prev.visible(wrist, self.min_confidence)?;
                let p1 = frame.visible(wrist, self.min_confidence)?;
                let elapsed = frame.elapsed_since(prev)?;
                Some((pixel(p1.keypoint()) - pixel(p0.keypoint())).norm() / elapsed)
            });
            let Some(speed) = speed.filter(|s| s.is_finite()) else {
                continue;
            };
            // 同値なら先頭を優先
            if best.map_or(true, |(_, s)| speed > s) {
                best = Some((i, speed));
            }
        }

        best.map(|(i, _)| i).unwrap_or(frames.len() / 2)
    }
}
