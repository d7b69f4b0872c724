use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::BTreeMap;

use crate::config::SegmenterConfig;
use crate::pose::keypoint::{KeypointIndex, Side};
use crate::pose::signal::{Frame, JointObservation};

/// スイングの局面
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SwingPhase {
    #[default]
    None,
    Preparation,
    Backswing,
    Contact,
    FollowThrough,
}

impl SwingPhase {
    pub const COUNT: usize = 5;

    pub const ALL: [SwingPhase; SwingPhase::COUNT] = [
        Self::None,
        Self::Preparation,
        Self::Backswing,
        Self::Contact,
        Self::FollowThrough,
    ];

    /// 品質スコアの対象となる局面
    pub const SCORED: [SwingPhase; 3] = [Self::Backswing, Self::Contact, Self::FollowThrough];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Preparation => "preparation",
            Self::Backswing => "backswing",
            Self::Contact => "contact",
            Self::FollowThrough => "follow_through",
        }
    }

    pub fn is_scored(self) -> bool {
        Self::SCORED.contains(&self)
    }
}

/// 局面をキーとする固定長テーブル
///
/// ハッシュマップの代わりに局面の序数で引く。欠けている局面は `None`。
/// シリアライズ時は局面名をキーにしたマップになる。
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseMap<T>([Option<T>; SwingPhase::COUNT]);

impl<T> PhaseMap<T> {
    pub fn new() -> Self {
        Self(std::array::from_fn(|_| None))
    }

    pub fn get(&self, phase: SwingPhase) -> Option<&T> {
        self.0[phase.index()].as_ref()
    }

    pub fn get_mut(&mut self, phase: SwingPhase) -> Option<&mut T> {
        self.0[phase.index()].as_mut()
    }

    pub fn insert(&mut self, phase: SwingPhase, value: T) -> Option<T> {
        self.0[phase.index()].replace(value)
    }

    pub fn remove(&mut self, phase: SwingPhase) -> Option<T> {
        self.0[phase.index()].take()
    }

    pub fn contains(&self, phase: SwingPhase) -> bool {
        self.0[phase.index()].is_some()
    }

    pub fn len(&self) -> usize {
        self.0.iter().filter(|v| v.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 存在する局面を序数順に
    pub fn iter(&self) -> impl Iterator<Item = (SwingPhase, &T)> + '_ {
        SwingPhase::ALL
            .iter()
            .zip(self.0.iter())
            .filter_map(|(phase, v)| v.as_ref().map(|v| (*phase, v)))
    }

    pub fn map<U, F: FnMut(SwingPhase, &T) -> U>(&self, mut f: F) -> PhaseMap<U> {
        let mut out = PhaseMap::new();
        for (phase, v) in self.iter() {
            out.insert(phase, f(phase, v));
        }
        out
    }
}

impl<T> Default for PhaseMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromIterator<(SwingPhase, T)> for PhaseMap<T> {
    fn from_iter<I: IntoIterator<Item = (SwingPhase, T)>>(iter: I) -> Self {
        let mut map = PhaseMap::new();
        for (phase, v) in iter {
            map.insert(phase, v);
        }
        map
    }
}

impl<T: Serialize> Serialize for PhaseMap<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (phase, v) in self.iter() {
            map.serialize_entry(&phase, v)?;
        }
        map.end()
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for PhaseMap<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = BTreeMap::<SwingPhase, T>::deserialize(deserializer)?;
        Ok(entries.into_iter().collect())
    }
}

/// セグメンタ用の可視判定。信頼度が閾値を「超える」関節だけを見えているとみなす
///
/// [`is_qualifying`] と [`heuristic_phase`] で同じ判定を使う。
fn gate_visible(frame: &Frame, idx: KeypointIndex, threshold: f32) -> Option<&JointObservation> {
    let joint = frame.joint(idx);
    (joint.confidence > threshold).then_some(joint)
}

/// 上半身（片側の肩・肘・手首）と腰のどちらかが見えていて、上体が起きているか
pub fn is_qualifying(frame: &Frame, threshold: f32) -> bool {
    let seen = |idx: KeypointIndex| gate_visible(frame, idx, threshold).is_some();

    let arm_visible = [Side::Left, Side::Right].iter().any(|side| {
        let j = side.joints();
        seen(j.shoulder) && seen(j.elbow) && seen(j.wrist)
    });
    if !arm_visible {
        return false;
    }

    let hips: Vec<f32> = [KeypointIndex::LeftHip, KeypointIndex::RightHip]
        .into_iter()
        .filter(|&idx| seen(idx))
        .map(|idx| frame.joint(idx).y)
        .collect();
    if hips.is_empty() {
        return false;
    }

    // 構え: 肩が腰より上（画像Yは下向き）
    let shoulders: Vec<f32> = [KeypointIndex::LeftShoulder, KeypointIndex::RightShoulder]
        .into_iter()
        .filter(|&idx| seen(idx))
        .map(|idx| frame.joint(idx).y)
        .collect();
    let mean = |v: &[f32]| v.iter().sum::<f32>() / v.len() as f32;
    mean(&shoulders) < mean(&hips)
}

/// トラッキング用の粗い局面推定
///
/// 腕の左右は利き手の申告ではなく、そのフレームで信頼度の高い側を使う。
/// - 手首が体中心を越えて反対側に大きく振り抜かれている → FollowThrough
/// - 手首が肩より外側（後方）にある → Backswing
/// - それ以外 → Preparation
pub fn heuristic_phase(frame: &Frame, config: &SegmenterConfig) -> SwingPhase {
    let threshold = config.visibility_confidence;
    let pose = frame.pose();
    let side = if pose.arm_confidence(Side::Left) > pose.arm_confidence(Side::Right) {
        Side::Left
    } else {
        Side::Right
    };
    let j = side.joints();

    let seen = |idx: KeypointIndex| gate_visible(frame, idx, threshold).map(|o| o.x);
    let (Some(wrist_x), Some(shoulder_x)) = (seen(j.wrist), seen(j.shoulder)) else {
        return SwingPhase::Preparation;
    };

    let torso: Vec<f32> = KeypointIndex::TORSO
        .iter()
        .filter_map(|&idx| seen(idx))
        .collect();
    let center_x = torso.iter().sum::<f32>() / torso.len() as f32;

    let other_shoulder = seen(side.opposite().joints().shoulder);
    let shoulder_width = other_shoulder
        .map(|x| (x - shoulder_x).abs())
        .unwrap_or(0.1)
        .max(0.05);

    // 利き側が体中心のどちら側にあるか
    let outward = shoulder_x - center_x;
    let sign = if outward.abs() > 1e-6 {
        outward.signum()
    } else {
        // カメラ正面: 右半身は画像の左側に映る
        match side {
            Side::Right => -1.0,
            Side::Left => 1.0,
        }
    };

    let across = (wrist_x - center_x) * sign;
    if across < -config.follow_through_offset * shoulder_width {
        return SwingPhase::FollowThrough;
    }
    let behind = (wrist_x - shoulder_x) * sign;
    if behind > config.backswing_offset * shoulder_width {
        return SwingPhase::Backswing;
    }
    SwingPhase::Preparation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SignalConfig;
    use crate::pose::keypoint::{Keypoint, Pose};
    use crate::pose::signal::{build_frame, FrameMeta};

    fn frame_with_wrist(wrist_x: f32, confidence: f32) -> Frame {
        let mut keypoints = [Keypoint::new(0.5, 0.3, confidence); KeypointIndex::COUNT];
        let mut set = |idx: KeypointIndex, x: f32, y: f32| {
            keypoints[idx as usize] = Keypoint::new(x, y, confidence);
        };
        // カメラ正面の右利き: 右肩が画像左
        set(KeypointIndex::RightShoulder, 0.45, 0.35);
        set(KeypointIndex::LeftShoulder, 0.55, 0.35);
        set(KeypointIndex::RightElbow, 0.44, 0.45);
        set(KeypointIndex::LeftElbow, 0.56, 0.45);
        set(KeypointIndex::RightHip, 0.46, 0.55);
        set(KeypointIndex::LeftHip, 0.54, 0.55);
        set(KeypointIndex::RightWrist, wrist_x, 0.5);
        set(KeypointIndex::LeftWrist, 0.55, 0.5);
        let meta = FrameMeta {
            index: 0,
            dt: 1.0 / 30.0,
            width: 640,
            height: 480,
        };
        build_frame(&Pose::new(keypoints), None, None, meta, &SignalConfig::default())
    }

    #[test]
    fn test_phase_index_roundtrip() {
        for (i, phase) in SwingPhase::ALL.iter().enumerate() {
            assert_eq!(phase.index(), i);
            assert_eq!(SwingPhase::from_index(i), Some(*phase));
        }
        assert_eq!(SwingPhase::from_index(5), None);
        assert!(!SwingPhase::Preparation.is_scored());
        assert!(SwingPhase::Contact.is_scored());
    }

    #[test]
    fn test_phase_map_basics() {
        let mut map = PhaseMap::new();
        assert!(map.is_empty());
        map.insert(SwingPhase::Contact, 2.0f32);
        map.insert(SwingPhase::Backswing, 1.0f32);
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(SwingPhase::Contact), Some(&2.0));
        assert_eq!(map.get(SwingPhase::Preparation), None);
        let order: Vec<SwingPhase> = map.iter().map(|(p, _)| p).collect();
        assert_eq!(order, vec![SwingPhase::Backswing, SwingPhase::Contact]);
        assert_eq!(map.remove(SwingPhase::Contact), Some(2.0));
        assert!(!map.contains(SwingPhase::Contact));
    }

    #[test]
    fn test_phase_map_serializes_by_name() {
        let mut map = PhaseMap::new();
        map.insert(SwingPhase::FollowThrough, vec![1.0f32, 2.0]);
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"follow_through":[1.0,2.0]}"#);
        let back: PhaseMap<Vec<f32>> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn test_qualifying_gate() {
        assert!(is_qualifying(&frame_with_wrist(0.47, 0.9), 0.3));
        // 閾値ちょうどは不可
        assert!(!is_qualifying(&frame_with_wrist(0.47, 0.3), 0.3));
    }

    #[test]
    fn test_heuristic_phases() {
        let config = SegmenterConfig::default();
        assert_eq!(heuristic_phase(&frame_with_wrist(0.47, 0.9), &config), SwingPhase::Preparation);
        assert_eq!(heuristic_phase(&frame_with_wrist(0.35, 0.9), &config), SwingPhase::Backswing);
        assert_eq!(heuristic_phase(&frame_with_wrist(0.60, 0.9), &config), SwingPhase::FollowThrough);
    }

    #[test]
    fn test_gate_and_phase_share_threshold() {
        let config = SegmenterConfig::default();
        let threshold = config.visibility_confidence;

        // 閾値ちょうど: ゲートも局面推定も関節を見ない
        let at = frame_with_wrist(0.35, threshold);
        assert!(!is_qualifying(&at, threshold));
        assert_eq!(heuristic_phase(&at, &config), SwingPhase::Preparation);

        let above = frame_with_wrist(0.35, threshold + 0.01);
        assert!(is_qualifying(&above, threshold));
        assert_eq!(heuristic_phase(&above, &config), SwingPhase::Backswing);
    }
}
