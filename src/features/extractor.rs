use nalgebra::Vector2;

use crate::config::FeatureConfig;
use crate::error::AnalysisError;
use crate::pose::keypoint::{KeypointIndex, Side};
use crate::pose::signal::{Frame, JointAngle};

/// 特徴量の次元数
pub const FEATURE_COUNT: usize = 20;

/// 1フレーム分の特徴量（利き手正規化済み、有限値のみ）
pub type FeatureVector = [f32; FEATURE_COUNT];

/// 特徴量名（偏差レポート・プロファイルで使用）
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "dominant_wrist_speed",
    "non_dominant_wrist_speed",
    "dominant_elbow_speed",
    "non_dominant_elbow_speed",
    "dominant_shoulder_speed",
    "non_dominant_shoulder_speed",
    "dominant_elbow_angle",
    "non_dominant_elbow_angle",
    "dominant_shoulder_angle",
    "non_dominant_shoulder_angle",
    "hip_rotation",
    "hip_shoulder_separation",
    "wrist_lateral_offset",
    "wrist_vertical_offset",
    "elbow_lateral_offset",
    "elbow_vertical_offset",
    "arm_extension",
    "wrist_height",
    "elbow_forward_offset",
    "is_right_handed",
];

/// 特徴量インデックス
pub mod index {
    pub const DOMINANT_WRIST_SPEED: usize = 0;
    pub const DOMINANT_SHOULDER_SPEED: usize = 4;
    pub const DOMINANT_ELBOW_ANGLE: usize = 6;
    pub const HANDEDNESS: usize = 19;
}

/// 外部から受け取った特徴量を検証して取り込む
pub fn feature_vector_from_slice(values: &[f32]) -> Result<FeatureVector, AnalysisError> {
    values
        .try_into()
        .map_err(|_| AnalysisError::FeatureLength {
            expected: FEATURE_COUNT,
            actual: values.len(),
        })
}

/// 利き手ごとの関節割り当て
struct Roles {
    dominant: Side,
    non_dominant: Side,
    /// 右利き +1, 左利き -1。横方向の量に掛けて「打球方向」を揃える
    sign: f32,
}

impl Roles {
    fn new(is_right_handed: bool) -> Self {
        let dominant = Side::dominant(is_right_handed);
        Self {
            dominant,
            non_dominant: dominant.opposite(),
            sign: if is_right_handed { 1.0 } else { -1.0 },
        }
    }
}

/// 特徴量抽出器
///
/// 純関数。左右の役割は申告された利き手で固定し、フレームごとの信頼度では変えない。
/// 欠損は内部で NaN として扱い、返す直前に 0 に置き換えてからクランプする。
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    config: FeatureConfig,
}

impl FeatureExtractor {
    pub fn new(config: &FeatureConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// 1フレームの特徴量
    ///
    /// `prev` があれば速度はそのフレームからの変位を経過時間
    /// （フレーム番号の差 × dt）で割って求め、無ければフレームに保存済みの速度を使う。
    pub fn extract(&self, frame: &Frame, prev: Option<&Frame>, is_right_handed: bool) -> FeatureVector {
        let roles = Roles::new(is_right_handed);
        let d = roles.dominant.joints();
        let n = roles.non_dominant.joints();
        let s = roles.sign;
        let speeds = &self.config.max_speeds;

        let mut f = [f32::NAN; FEATURE_COUNT];

        // 速度
        f[0] = self.speed(frame, prev, d.wrist) / speeds.dominant_wrist;
        f[1] = self.speed(frame, prev, n.wrist) / speeds.non_dominant_wrist;
        f[2] = self.speed(frame, prev, d.elbow) / speeds.dominant_elbow;
        f[3] = self.speed(frame, prev, n.elbow) / speeds.non_dominant_elbow;
        f[4] = self.speed(frame, prev, d.shoulder) / speeds.dominant_shoulder;
        f[5] = self.speed(frame, prev, n.shoulder) / speeds.non_dominant_shoulder;

        // 関節角度
        let angle = |a: JointAngle| frame.angle(a).unwrap_or(f32::NAN) / self.config.limb_angle_norm;
        f[6] = angle(JointAngle::elbow(roles.dominant));
        f[7] = angle(JointAngle::elbow(roles.non_dominant));
        f[8] = angle(JointAngle::shoulder(roles.dominant));
        f[9] = angle(JointAngle::shoulder(roles.non_dominant));

        // 腰・肩ラインの傾き（左右反転で符号が変わるので s を掛ける）
        let hip_tilt = self.line_tilt(frame, KeypointIndex::LeftHip, KeypointIndex::RightHip);
        let shoulder_tilt =
            self.line_tilt(frame, KeypointIndex::LeftShoulder, KeypointIndex::RightShoulder);
        f[10] = s * hip_tilt / self.config.hip_angle_norm;
        f[11] = s * fold_angle(shoulder_tilt - hip_tilt) / self.config.separation_angle_norm;

        // 胴体基準の位置（正規化座標、胴体高さ単位）
        let shoulder_center =
            self.center(frame, KeypointIndex::LeftShoulder, KeypointIndex::RightShoulder);
        let hip_center = self.center(frame, KeypointIndex::LeftHip, KeypointIndex::RightHip);
        let torso = match (shoulder_center, hip_center) {
            (Some(sc), Some(hc)) => (hc.y - sc.y).abs().max(self.config.torso_floor),
            _ => f32::NAN,
        };

        let wrist = self.position(frame, d.wrist);
        let elbow = self.position(frame, d.elbow);
        let shoulder = self.position(frame, d.shoulder);

        if let (Some(w), Some(sc)) = (wrist, shoulder_center) {
            f[12] = s * (w.x - sc.x) / torso;
            f[13] = (w.y - sc.y) / torso;
        }
        if let (Some(e), Some(hc)) = (elbow, hip_center) {
            f[14] = s * (e.x - hc.x) / torso;
            f[15] = (e.y - hc.y) / torso;
        }

        // 腕の形
        f[16] = self.arm_extension(frame, d.shoulder, d.elbow, d.wrist);
        if let (Some(sh), Some(w)) = (shoulder, wrist) {
            f[17] = (sh.y - w.y) / torso;
        }
        if let (Some(e), Some(sh)) = (elbow, shoulder) {
            f[18] = s * (e.x - sh.x) / torso;
        }

        f[19] = if is_right_handed { 1.0 } else { 0.0 };

        let clamp = self.config.clamp;
        f.map(|v| if v.is_finite() { v.clamp(-clamp, clamp) } else { 0.0 })
    }

    /// スイング全体。各フレームの直前フレームを速度の参照にする
    pub fn extract_swing(&self, frames: &[Frame], is_right_handed: bool) -> Vec<FeatureVector> {
        frames
            .iter()
            .enumerate()
            .map(|(i, frame)| {
                let prev = i.checked_sub(1).map(|p| &frames[p]);
                self.extract(frame, prev, is_right_handed)
            })
            .collect()
    }

    fn position(&self, frame: &Frame, idx: KeypointIndex) -> Option<Vector2<f32>> {
        frame
            .visible(idx, self.config.min_confidence)
            .map(|j| Vector2::new(j.x, j.y))
    }

    fn center(&self, frame: &Frame, a: KeypointIndex, b: KeypointIndex) -> Option<Vector2<f32>> {
        match (self.position(frame, a), self.position(frame, b)) {
            (Some(pa), Some(pb)) => Some((pa + pb) / 2.0),
            (Some(p), None) | (None, Some(p)) => Some(p),
            (None, None) => None,
        }
    }

    fn speed(&self, frame: &Frame, prev: Option<&Frame>, idx: KeypointIndex) -> f32 {
        let threshold = self.config.min_confidence;
        let speed = match prev {
            Some(prev) => {
                let current = frame.visible(idx, threshold);
                let before = prev.visible(idx, threshold);
                // 間引かれたフレームがあっても実時間で割る
                match (current, before, frame.elapsed_since(prev)) {
                    (Some(_), Some(_), Some(elapsed)) => {
                        Some((frame.pixel(idx) - prev.pixel(idx)).norm() / elapsed)
                    }
                    _ => None,
                }
            }
            None => frame.joint(idx).speed,
        };
        speed.unwrap_or(f32::NAN)
    }

    /// 2点を結ぶ線の水平からの傾き（度、[-90, 90]）
    fn line_tilt(&self, frame: &Frame, a: KeypointIndex, b: KeypointIndex) -> f32 {
        let threshold = self.config.min_confidence;
        if frame.visible(a, threshold).is_none() || frame.visible(b, threshold).is_none() {
            return f32::NAN;
        }
        let v = frame.pixel(b) - frame.pixel(a);
        if v.norm() <= f32::EPSILON {
            return f32::NAN;
        }
        fold_angle(v.y.atan2(v.x).to_degrees())
    }

    /// 肩→手首の直線距離と、肩→肘→手首の経路長の比（伸び切ると 1）
    fn arm_extension(
        &self,
        frame: &Frame,
        shoulder: KeypointIndex,
        elbow: KeypointIndex,
        wrist: KeypointIndex,
    ) -> f32 {
        let threshold = self.config.min_confidence;
        if [shoulder, elbow, wrist]
            .iter()
            .any(|&idx| frame.visible(idx, threshold).is_none())
        {
            return f32::NAN;
        }
        let (s, e, w) = (frame.pixel(shoulder), frame.pixel(elbow), frame.pixel(wrist));
        let path = (e - s).norm() + (w - e).norm();
        if path <= f32::EPSILON {
            return f32::NAN;
        }
        (w - s).norm() / path
    }
}

/// 角度を [-90, 90] に畳み込む（線の向きを区別しない）
fn fold_angle(deg: f32) -> f32 {
    if deg > 90.0 {
        deg - 180.0
    } else if deg < -90.0 {
        deg + 180.0
    } else {
        deg
    }
}
