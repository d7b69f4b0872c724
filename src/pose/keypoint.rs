use nalgebra::Vector2;

use crate::error::AnalysisError;

/// MoveNet の 17 キーポイントインデックス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum KeypointIndex {
    Nose = 0,
    LeftEye = 1,
    RightEye = 2,
    LeftEar = 3,
    RightEar = 4,
    LeftShoulder = 5,
    RightShoulder = 6,
    LeftElbow = 7,
    RightElbow = 8,
    LeftWrist = 9,
    RightWrist = 10,
    LeftHip = 11,
    RightHip = 12,
    LeftKnee = 13,
    RightKnee = 14,
    LeftAnkle = 15,
    RightAnkle = 16,
}

impl KeypointIndex {
    pub const COUNT: usize = 17;

    pub const ALL: [KeypointIndex; KeypointIndex::COUNT] = [
        Self::Nose,
        Self::LeftEye,
        Self::RightEye,
        Self::LeftEar,
        Self::RightEar,
        Self::LeftShoulder,
        Self::RightShoulder,
        Self::LeftElbow,
        Self::RightElbow,
        Self::LeftWrist,
        Self::RightWrist,
        Self::LeftHip,
        Self::RightHip,
        Self::LeftKnee,
        Self::RightKnee,
        Self::LeftAnkle,
        Self::RightAnkle,
    ];

    pub const TORSO: [KeypointIndex; 4] = [
        Self::LeftShoulder,
        Self::RightShoulder,
        Self::LeftHip,
        Self::RightHip,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Nose => "nose",
            Self::LeftEye => "left_eye",
            Self::RightEye => "right_eye",
            Self::LeftEar => "left_ear",
            Self::RightEar => "right_ear",
            Self::LeftShoulder => "left_shoulder",
            Self::RightShoulder => "right_shoulder",
            Self::LeftElbow => "left_elbow",
            Self::RightElbow => "right_elbow",
            Self::LeftWrist => "left_wrist",
            Self::RightWrist => "right_wrist",
            Self::LeftHip => "left_hip",
            Self::RightHip => "right_hip",
            Self::LeftKnee => "left_knee",
            Self::RightKnee => "right_knee",
            Self::LeftAnkle => "left_ankle",
            Self::RightAnkle => "right_ankle",
        }
    }

    /// 左右反転したキーポイント（鼻はそのまま）
    pub fn mirrored(self) -> Self {
        match self {
            Self::Nose => Self::Nose,
            Self::LeftEye => Self::RightEye,
            Self::RightEye => Self::LeftEye,
            Self::LeftEar => Self::RightEar,
            Self::RightEar => Self::LeftEar,
            Self::LeftShoulder => Self::RightShoulder,
            Self::RightShoulder => Self::LeftShoulder,
            Self::LeftElbow => Self::RightElbow,
            Self::RightElbow => Self::LeftElbow,
            Self::LeftWrist => Self::RightWrist,
            Self::RightWrist => Self::LeftWrist,
            Self::LeftHip => Self::RightHip,
            Self::RightHip => Self::LeftHip,
            Self::LeftKnee => Self::RightKnee,
            Self::RightKnee => Self::LeftKnee,
            Self::LeftAnkle => Self::RightAnkle,
            Self::RightAnkle => Self::LeftAnkle,
        }
    }
}

/// 身体の左右
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// 片側の腕・脚のキーポイント
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SideJoints {
    pub shoulder: KeypointIndex,
    pub elbow: KeypointIndex,
    pub wrist: KeypointIndex,
    pub hip: KeypointIndex,
    pub knee: KeypointIndex,
    pub ankle: KeypointIndex,
}

const LEFT_JOINTS: SideJoints = SideJoints {
    shoulder: KeypointIndex::LeftShoulder,
    elbow: KeypointIndex::LeftElbow,
    wrist: KeypointIndex::LeftWrist,
    hip: KeypointIndex::LeftHip,
    knee: KeypointIndex::LeftKnee,
    ankle: KeypointIndex::LeftAnkle,
};

const RIGHT_JOINTS: SideJoints = SideJoints {
    shoulder: KeypointIndex::RightShoulder,
    elbow: KeypointIndex::RightElbow,
    wrist: KeypointIndex::RightWrist,
    hip: KeypointIndex::RightHip,
    knee: KeypointIndex::RightKnee,
    ankle: KeypointIndex::RightAnkle,
};

impl Side {
    /// 利き手フラグから利き側を決める
    pub fn dominant(is_right_handed: bool) -> Self {
        if is_right_handed {
            Side::Right
        } else {
            Side::Left
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    pub fn joints(self) -> SideJoints {
        match self {
            Side::Left => LEFT_JOINTS,
            Side::Right => RIGHT_JOINTS,
        }
    }
}

/// 単一キーポイント
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    /// 正規化されたX座標 (0.0〜1.0)
    pub x: f32,
    /// 正規化されたY座標 (0.0〜1.0)
    pub y: f32,
    /// 信頼度スコア (0.0〜1.0)
    pub confidence: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, confidence: f32) -> Self {
        Self { x, y, confidence }
    }

    /// 信頼度が閾値以上か
    pub fn is_valid(&self, threshold: f32) -> bool {
        self.confidence >= threshold
    }

    /// ピクセル座標（小数）に変換
    pub fn to_pixel(&self, width: u32, height: u32) -> Vector2<f32> {
        Vector2::new(self.x * width as f32, self.y * height as f32)
    }
}

impl Default for Keypoint {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            confidence: 0.0,
        }
    }
}

/// 17キーポイントからなる姿勢
#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    pub keypoints: [Keypoint; KeypointIndex::COUNT],
}

impl Pose {
    pub fn new(keypoints: [Keypoint; KeypointIndex::COUNT]) -> Self {
        Self { keypoints }
    }

    /// 推定器の生出力 `(x, y, confidence)` から構築
    ///
    /// 個数が17でなければ契約違反として拒否する。
    pub fn from_raw(raw: &[[f32; 3]]) -> Result<Self, AnalysisError> {
        if raw.len() != KeypointIndex::COUNT {
            return Err(AnalysisError::KeypointCount {
                expected: KeypointIndex::COUNT,
                actual: raw.len(),
            });
        }
        let mut keypoints = [Keypoint::default(); KeypointIndex::COUNT];
        for (kp, &[x, y, confidence]) in keypoints.iter_mut().zip(raw) {
            *kp = Keypoint::new(x, y, confidence);
        }
        Ok(Self { keypoints })
    }

    /// インデックスでキーポイントを取得
    pub fn get(&self, index: KeypointIndex) -> &Keypoint {
        &self.keypoints[index as usize]
    }

    /// 全キーポイントの平均信頼度
    pub fn average_confidence(&self) -> f32 {
        let sum: f32 = self.keypoints.iter().map(|k| k.confidence).sum();
        sum / KeypointIndex::COUNT as f32
    }

    /// 片腕（肩・肘・手首）の平均信頼度
    pub fn arm_confidence(&self, side: Side) -> f32 {
        let j = side.joints();
        (self.get(j.shoulder).confidence
            + self.get(j.elbow).confidence
            + self.get(j.wrist).confidence)
            / 3.0
    }

    /// 左右反転した姿勢（X座標を反転し、左右のキーポイントを入れ替える）
    pub fn mirrored(&self) -> Self {
        let mut keypoints = [Keypoint::default(); KeypointIndex::COUNT];
        for idx in KeypointIndex::ALL {
            let kp = self.get(idx);
            keypoints[idx.mirrored() as usize] = Keypoint::new(1.0 - kp.x, kp.y, kp.confidence);
        }
        Self { keypoints }
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            keypoints: [Keypoint::default(); KeypointIndex::COUNT],
        }
    }
}
