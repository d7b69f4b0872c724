//! ユニットテスト共通の合成ポーズ列

use crate::pose::keypoint::{Keypoint, KeypointIndex, Pose};

/// 構え：手首は両肩の間
pub const PREP: (f32, f32) = (0.47, 0.5);
/// テイクバック：手首が利き肩の後方
pub const BACK: (f32, f32) = (0.35, 0.3);
/// フォロー：手首が体の反対側
pub const FOLLOW: (f32, f32) = (0.6, 0.5);

/// カメラ正面を向いた右利きの選手。動くのは右手首だけ
pub fn body(wrist: (f32, f32), confidence: f32) -> Pose {
    let mut keypoints = [Keypoint::new(0.5, 0.2, confidence); KeypointIndex::COUNT];
    let mut set = |idx: KeypointIndex, x: f32, y: f32| {
        keypoints[idx as usize] = Keypoint::new(x, y, confidence);
    };
    set(KeypointIndex::RightShoulder, 0.45, 0.35);
    set(KeypointIndex::LeftShoulder, 0.55, 0.35);
    set(KeypointIndex::RightElbow, 0.44, 0.45);
    set(KeypointIndex::LeftElbow, 0.56, 0.45);
    set(KeypointIndex::LeftWrist, 0.55, 0.5);
    set(KeypointIndex::RightHip, 0.46, 0.55);
    set(KeypointIndex::LeftHip, 0.54, 0.55);
    set(KeypointIndex::RightKnee, 0.46, 0.75);
    set(KeypointIndex::LeftKnee, 0.54, 0.75);
    set(KeypointIndex::RightAnkle, 0.46, 0.95);
    set(KeypointIndex::LeftAnkle, 0.54, 0.95);
    set(KeypointIndex::RightWrist, wrist.0, wrist.1);
    Pose::new(keypoints)
}

/// 640x480・30fps の53フレームのスイング1本
///
/// 構え20、ゆっくりしたテイクバック15、インパクト前後の速い10（手首速度の
/// ピークはスイング内インデックス39）、体を横切る8。最後の5フレームは反対側に留まる。
pub fn swing_poses() -> Vec<Pose> {
    let mut poses = vec![body(PREP, 0.9); 20];

    for k in 0..15 {
        let k = k as f32;
        poses.push(body((0.42 - 0.005 * k, 0.5 - 0.013 * k), 0.9));
    }

    let steps = [0.02, 0.04, 0.06, 0.09, 0.12, 0.09, 0.06, 0.04, 0.02, 0.01];
    let mut y = 0.318;
    for step in steps {
        y += step;
        poses.push(body((0.40, y), 0.9));
    }

    for x in [0.44, 0.48, 0.52, 0.58, 0.60, 0.60, 0.60, 0.60] {
        poses.push(body((x, y), 0.9));
    }

    poses
}
