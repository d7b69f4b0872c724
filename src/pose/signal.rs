//! フレームごとの姿勢信号（ピクセル空間の運動量と関節角度）
//!
//! 欠損は `None` で表し、0 にはしない。信頼度の低い関節は速度を持たず、
//! 静止した関節（速度 0）とは区別される。

use nalgebra::Vector2;

use crate::config::SignalConfig;
use crate::error::AnalysisError;
use crate::swing::SwingPhase;

use super::keypoint::{Keypoint, KeypointIndex, Pose, Side};

/// 1フレーム中の1関節。運動量は直前のフレームから求める
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointObservation {
    pub joint: KeypointIndex,
    /// 正規化画像座標
    pub x: f32,
    pub y: f32,
    pub confidence: f32,
    /// ピクセル空間の速さ (px/s)
    pub speed: Option<f32>,
    /// ピクセル空間の加速度の大きさ (px/s^2)
    pub acceleration: Option<f32>,
}

impl JointObservation {
    pub fn keypoint(&self) -> Keypoint {
        Keypoint::new(self.x, self.y, self.confidence)
    }
}

/// 追跡する8つの関節角度（3点の中央の関節で測る）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JointAngle {
    LeftElbow,
    RightElbow,
    LeftShoulder,
    RightShoulder,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
}

impl JointAngle {
    pub const COUNT: usize = 8;

    pub const ALL: [JointAngle; JointAngle::COUNT] = [
        Self::LeftElbow,
        Self::RightElbow,
        Self::LeftShoulder,
        Self::RightShoulder,
        Self::LeftHip,
        Self::RightHip,
        Self::LeftKnee,
        Self::RightKnee,
    ];

    pub fn elbow(side: Side) -> Self {
        match side {
            Side::Left => Self::LeftElbow,
            Side::Right => Self::RightElbow,
        }
    }

    pub fn shoulder(side: Side) -> Self {
        match side {
            Side::Left => Self::LeftShoulder,
            Side::Right => Self::RightShoulder,
        }
    }

    fn side(self) -> Side {
        match self {
            Self::LeftElbow | Self::LeftShoulder | Self::LeftHip | Self::LeftKnee => Side::Left,
            _ => Side::Right,
        }
    }

    /// `(a, 頂点, c)`。角度は頂点で測る
    pub fn chain(self) -> (KeypointIndex, KeypointIndex, KeypointIndex) {
        let j = self.side().joints();
        match self {
            Self::LeftElbow | Self::RightElbow => (j.shoulder, j.elbow, j.wrist),
            Self::LeftShoulder | Self::RightShoulder => (j.elbow, j.shoulder, j.hip),
            Self::LeftHip | Self::RightHip => (j.shoulder, j.hip, j.knee),
            Self::LeftKnee | Self::RightKnee => (j.hip, j.knee, j.ankle),
        }
    }
}

/// 関節角度（度、`[0, 180]` または `None`）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct JointAngles([Option<f32>; JointAngle::COUNT]);

impl JointAngles {
    pub fn get(&self, angle: JointAngle) -> Option<f32> {
        self.0[angle as usize]
    }

    /// モデル入力用（欠損は NaN）
    pub fn to_nan_array(&self) -> [f32; JointAngle::COUNT] {
        self.0.map(|a| a.unwrap_or(f32::NAN))
    }
}

/// `b` における `a - b` と `c - b` のなす角（度）
pub fn angle_between(a: Vector2<f32>, b: Vector2<f32>, c: Vector2<f32>) -> Option<f32> {
    let v1 = a - b;
    let v2 = c - b;
    let n1 = v1.norm();
    let n2 = v2.norm();
    if n1 <= f32::EPSILON || n2 <= f32::EPSILON {
        return None;
    }
    let cos = (v1.dot(&v2) / (n1 * n2)).clamp(-1.0, 1.0);
    let deg = cos.acos().to_degrees();
    deg.is_finite().then(|| deg.clamp(0.0, 180.0))
}

/// フレームの時刻とピクセル空間を決めるメタデータ
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameMeta {
    /// 元動画のフレーム番号
    pub index: usize,
    /// 連続フレーム間の秒数
    pub dt: f32,
    pub width: u32,
    pub height: u32,
}

/// 処理済みの1フレーム。構築後は変更しない
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    meta: FrameMeta,
    joints: [JointObservation; KeypointIndex::COUNT],
    angles: JointAngles,
    phase: SwingPhase,
}

impl Frame {
    pub fn index(&self) -> usize {
        self.meta.index
    }

    pub fn meta(&self) -> &FrameMeta {
        &self.meta
    }

    pub fn joint(&self, idx: KeypointIndex) -> &JointObservation {
        &self.joints[idx as usize]
    }

    pub fn joints(&self) -> &[JointObservation; KeypointIndex::COUNT] {
        &self.joints
    }

    /// 信頼度が `threshold` 以上の場合のみ関節を返す
    pub fn visible(&self, idx: KeypointIndex, threshold: f32) -> Option<&JointObservation> {
        let joint = self.joint(idx);
        (joint.confidence >= threshold).then_some(joint)
    }

    pub fn pixel(&self, idx: KeypointIndex) -> Vector2<f32> {
        self.joint(idx).keypoint().to_pixel(self.meta.width, self.meta.height)
    }

    pub fn angle(&self, angle: JointAngle) -> Option<f32> {
        self.angles.get(angle)
    }

    pub fn angles(&self) -> &JointAngles {
        &self.angles
    }

    pub fn phase(&self) -> SwingPhase {
        self.phase
    }

    /// `earlier` からの経過秒数（フレーム番号の差 × dt）
    ///
    /// 可視ゲートで間引かれた区間でも実時間で速度を求めるために使う。
    /// 同じか後ろのフレームを渡すと `None`。
    pub fn elapsed_since(&self, earlier: &Frame) -> Option<f32> {
        let frames = self.index().checked_sub(earlier.index()).filter(|&n| n > 0)?;
        let elapsed = frames as f32 * self.meta.dt;
        (elapsed > 0.0).then_some(elapsed)
    }

    pub fn pose(&self) -> Pose {
        let mut keypoints = [Keypoint::default(); KeypointIndex::COUNT];
        for (kp, joint) in keypoints.iter_mut().zip(self.joints.iter()) {
            *kp = joint.keypoint();
        }
        Pose::new(keypoints)
    }

    /// 局面ラベルを付けたフレームを返す
    pub fn with_phase(mut self, phase: SwingPhase) -> Self {
        self.phase = phase;
        self
    }
}

/// 現在の姿勢と直前最大2フレームから [`Frame`] を作る
///
/// 速度は `(p - p1) / dt`、加速度は `(p - 2 p1 + p2) / dt^2`（いずれもピクセル）。
/// 速度は現在と直前の両方で、加速度は3フレームすべてで信頼度が閾値以上の関節のみ。
pub fn build_frame(
    pose: &Pose,
    prev: Option<&Frame>,
    prev2: Option<&Frame>,
    meta: FrameMeta,
    config: &SignalConfig,
) -> Frame {
    let threshold = config.min_confidence;
    let dt = meta.dt;
    let pixel = |kp: &Keypoint| kp.to_pixel(meta.width, meta.height);

    let joints: [JointObservation; KeypointIndex::COUNT] = std::array::from_fn(|i| {
        let idx = KeypointIndex::ALL[i];
        let kp = pose.keypoints[i];
        let current = pixel(&kp);
        let confident = kp.is_valid(threshold);

        let prev_px = prev
            .filter(|_| confident)
            .and_then(|f| f.visible(idx, threshold))
            .map(|j| pixel(&j.keypoint()));
        let prev2_px = prev2
            .and_then(|f| f.visible(idx, threshold))
            .map(|j| pixel(&j.keypoint()));

        let speed = prev_px.map(|p1| ((current - p1) / dt).norm());
        let acceleration = match (prev_px, prev2_px) {
            (Some(p1), Some(p2)) => Some(((current - p1 * 2.0 + p2) / (dt * dt)).norm()),
            _ => None,
        };

        JointObservation {
            joint: idx,
            x: kp.x,
            y: kp.y,
            confidence: kp.confidence,
            speed: speed.filter(|v| v.is_finite()),
            acceleration: acceleration.filter(|v| v.is_finite()),
        }
    });

    let mut angles = JointAngles::default();
    for angle in JointAngle::ALL {
        let (a, b, c) = angle.chain();
        let (ka, kb, kc) = (pose.get(a), pose.get(b), pose.get(c));
        if ka.is_valid(threshold) && kb.is_valid(threshold) && kc.is_valid(threshold) {
            angles.0[angle as usize] = angle_between(pixel(ka), pixel(kb), pixel(kc));
        }
    }

    Frame {
        meta,
        joints,
        angles,
        phase: SwingPhase::None,
    }
}

/// 直前2フレームを保持して順にフレームを作る
pub struct SignalBuilder {
    config: SignalConfig,
    width: u32,
    height: u32,
    dt: f32,
    prev: Option<Frame>,
    prev2: Option<Frame>,
    next_index: usize,
}

impl SignalBuilder {
    pub fn new(
        width: u32,
        height: u32,
        frame_rate: f32,
        config: &SignalConfig,
    ) -> Result<Self, AnalysisError> {
        if width == 0 || height == 0 {
            return Err(AnalysisError::InvalidImageSize { width, height });
        }
        if !frame_rate.is_finite() || frame_rate <= 0.0 {
            return Err(AnalysisError::InvalidFrameRate(frame_rate));
        }
        Ok(Self {
            config: config.clone(),
            width,
            height,
            dt: 1.0 / frame_rate,
            prev: None,
            prev2: None,
            next_index: 0,
        })
    }

    pub fn dt(&self) -> f32 {
        self.dt
    }

    /// 時系列順に次のフレームを作る
    pub fn push(&mut self, pose: &Pose) -> Frame {
        let meta = FrameMeta {
            index: self.next_index,
            dt: self.dt,
            width: self.width,
            height: self.height,
        };
        self.next_index += 1;

        let frame = build_frame(pose, self.prev.as_ref(), self.prev2.as_ref(), meta, &self.config);
        self.prev2 = self.prev.replace(frame.clone());
        frame
    }

    /// 運動履歴を捨てる（フレーム番号は継続）
    pub fn reset(&mut self) {
        self.prev = None;
        self.prev2 = None;
    }
}
