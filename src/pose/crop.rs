use crate::config::TrackingConfig;
use crate::error::AnalysisError;

use super::keypoint::{Keypoint, KeypointIndex, Pose};

/// クロップ領域（元画像に対する正規化座標）
///
/// ピクセル空間で常に正方形。画像外にはみ出す部分は推定器入力でゼロ埋めされる。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropRegion {
    pub y_min: f32,
    pub x_min: f32,
    pub y_max: f32,
    pub x_max: f32,
    pub height: f32,
    pub width: f32,
}

impl CropRegion {
    /// フレーム中央の正方形（短辺いっぱい、長辺方向にアスペクト補正）
    pub fn initial(image_height: u32, image_width: u32) -> Self {
        let h = image_height as f32;
        let w = image_width as f32;
        let (y_min, x_min, box_height, box_width) = if w > h {
            ((h / 2.0 - w / 2.0) / h, 0.0, w / h, 1.0)
        } else {
            (0.0, (w / 2.0 - h / 2.0) / w, 1.0, h / w)
        };
        Self {
            y_min,
            x_min,
            y_max: y_min + box_height,
            x_max: x_min + box_width,
            height: box_height,
            width: box_width,
        }
    }

    /// ピクセル空間の中心と半辺長から構築
    fn from_center(
        center_y: f32,
        center_x: f32,
        half: f32,
        image_height: u32,
        image_width: u32,
    ) -> Self {
        let h = image_height as f32;
        let w = image_width as f32;
        let y_min = (center_y - half) / h;
        let x_min = (center_x - half) / w;
        let y_max = (center_y + half) / h;
        let x_max = (center_x + half) / w;
        Self {
            y_min,
            x_min,
            y_max,
            x_max,
            height: y_max - y_min,
            width: x_max - x_min,
        }
    }

    /// クロップ内の正規化座標を元画像の正規化座標へ
    pub fn to_image(&self, x: f32, y: f32) -> (f32, f32) {
        (self.x_min + x * self.width, self.y_min + y * self.height)
    }
}

/// 肩と腰が（左右どちらか）見えているか
pub fn torso_visible(pose: &Pose, threshold: f32) -> bool {
    let visible = |idx| pose.get(idx).is_valid(threshold);
    (visible(KeypointIndex::LeftHip) || visible(KeypointIndex::RightHip))
        && (visible(KeypointIndex::LeftShoulder) || visible(KeypointIndex::RightShoulder))
}

/// 前フレームの姿勢から次フレームのクロップ領域を決める
///
/// - 中心: 左右ヒップの中点
/// - 半辺長: max(胴体レンジ × torso_expand, 全身レンジ × body_expand)
/// - 中心から画像端までの最大距離で頭打ち
/// - それでも画像長辺の半分を超える場合は見失ったとみなしてデフォルト領域
pub fn determine_crop_region(
    pose: &Pose,
    image_height: u32,
    image_width: u32,
    config: &TrackingConfig,
) -> CropRegion {
    let h = image_height as f32;
    let w = image_width as f32;
    let threshold = config.min_crop_keypoint_score;

    if !torso_visible(pose, threshold) {
        return CropRegion::initial(image_height, image_width);
    }

    // ピクセル空間 (y, x)
    let to_px = |kp: &Keypoint| (kp.y * h, kp.x * w);

    let (lh_y, lh_x) = to_px(pose.get(KeypointIndex::LeftHip));
    let (rh_y, rh_x) = to_px(pose.get(KeypointIndex::RightHip));
    let center_y = (lh_y + rh_y) / 2.0;
    let center_x = (lh_x + rh_x) / 2.0;

    let mut torso_range = 0.0f32;
    for idx in KeypointIndex::TORSO {
        let (y, x) = to_px(pose.get(idx));
        torso_range = torso_range
            .max((center_y - y).abs())
            .max((center_x - x).abs());
    }

    let mut body_range = 0.0f32;
    for kp in pose.keypoints.iter().filter(|kp| kp.is_valid(threshold)) {
        let (y, x) = to_px(kp);
        body_range = body_range
            .max((center_y - y).abs())
            .max((center_x - x).abs());
    }

    let mut half = (torso_range * config.torso_expand).max(body_range * config.body_expand);

    let max_to_edge = center_x
        .max(w - center_x)
        .max(center_y)
        .max(h - center_y);
    half = half.min(max_to_edge);

    if !half.is_finite() || half <= 0.0 || half > w.max(h) / 2.0 {
        return CropRegion::initial(image_height, image_width);
    }

    CropRegion::from_center(center_y, center_x, half, image_height, image_width)
}

/// フレームごとにクロップ領域を更新するトラッカー
///
/// 領域は毎フレーム作り直す（前フレームの領域は書き換えない）。
pub struct RegionTracker {
    config: TrackingConfig,
    image_height: u32,
    image_width: u32,
    region: CropRegion,
}

impl RegionTracker {
    pub fn new(
        image_height: u32,
        image_width: u32,
        config: &TrackingConfig,
    ) -> Result<Self, AnalysisError> {
        if image_height == 0 || image_width == 0 {
            return Err(AnalysisError::InvalidImageSize {
                width: image_width,
                height: image_height,
            });
        }
        Ok(Self {
            config: config.clone(),
            image_height,
            image_width,
            region: CropRegion::initial(image_height, image_width),
        })
    }

    /// 次フレームで推定器に渡す領域
    pub fn current(&self) -> CropRegion {
        self.region
    }

    /// 今フレームの姿勢（元画像座標）から次の領域を決める
    pub fn update(&mut self, pose: &Pose) -> CropRegion {
        let next = determine_crop_region(pose, self.image_height, self.image_width, &self.config);
        let default = CropRegion::initial(self.image_height, self.image_width);
        if next == default && self.region != default {
            log::debug!("crop region reset to full frame");
        }
        self.region = next;
        next
    }

    /// 追跡を失った場合にデフォルト領域へ戻す
    pub fn reset(&mut self) {
        self.region = CropRegion::initial(self.image_height, self.image_width);
    }
}

/// 推定器出力座標（クロップ画像内の正規化座標）をフレーム全体の正規化座標に変換
pub fn remap_pose(pose: &Pose, crop: &CropRegion) -> Pose {
    let mut keypoints = [Keypoint::default(); KeypointIndex::COUNT];
    for (dst, kp) in keypoints.iter_mut().zip(pose.keypoints.iter()) {
        let (x, y) = crop.to_image(kp.x, kp.y);
        *dst = Keypoint::new(x, y, kp.confidence);
    }
    Pose::new(keypoints)
}
