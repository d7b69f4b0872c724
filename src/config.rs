use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// 解析パイプライン全体の設定
///
/// 各コンポーネントは構築時に自分のセクションを参照で受け取る。
/// 実行中に書き換えることはない。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub signal: SignalConfig,
    #[serde(default)]
    pub segmenter: SegmenterConfig,
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub smoothing: SmoothingConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub profile: ProfileConfig,
}

/// クロップ領域トラッキング
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// 胴体・全身レンジ計算に使う最低信頼度
    #[serde(default = "default_min_crop_keypoint_score")]
    pub min_crop_keypoint_score: f32,
    /// 胴体レンジに掛ける倍率
    #[serde(default = "default_torso_expand")]
    pub torso_expand: f32,
    /// 全身レンジに掛ける倍率
    #[serde(default = "default_body_expand")]
    pub body_expand: f32,
}

fn default_min_crop_keypoint_score() -> f32 { 0.2 }
fn default_torso_expand() -> f32 { 1.9 }
fn default_body_expand() -> f32 { 1.2 }

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            min_crop_keypoint_score: default_min_crop_keypoint_score(),
            torso_expand: default_torso_expand(),
            body_expand: default_body_expand(),
        }
    }
}

/// 速度・加速度・関節角度の導出
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConfig {
    /// 導出値を計算する最低信頼度
    #[serde(default = "default_signal_min_confidence")]
    pub min_confidence: f32,
    /// 動画メタデータにフレームレートが無い場合の値
    #[serde(default = "default_frame_rate")]
    pub default_frame_rate: f32,
}

fn default_signal_min_confidence() -> f32 { 0.2 }
fn default_frame_rate() -> f32 { 30.0 }

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_signal_min_confidence(),
            default_frame_rate: default_frame_rate(),
        }
    }
}

/// スイング区間検出ステートマシン
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmenterConfig {
    /// 上半身・腰の可視判定に使う信頼度（これを超えること）
    #[serde(default = "default_visibility_confidence")]
    pub visibility_confidence: f32,
    /// これ未満のバッファは破棄
    #[serde(default = "default_min_swing_frames")]
    pub min_swing_frames: usize,
    /// バッファ長の上限。これを超えたら強制終了
    #[serde(default = "default_max_swing_frames")]
    pub max_swing_frames: usize,
    /// 有効性を満たさないバッファでもこの長さで打ち切る
    #[serde(default = "default_soft_limit_frames")]
    pub soft_limit_frames: usize,
    /// 末尾に連続するフォロースルーフレーム数
    #[serde(default = "default_stable_follow_through_frames")]
    pub stable_follow_through_frames: usize,
    /// 構え戻り判定を行う最小バッファ長（これを超えること）
    #[serde(default = "default_return_to_prep_min_frames")]
    pub return_to_prep_min_frames: usize,
    /// 構え戻り判定の末尾ウィンドウ
    #[serde(default = "default_return_to_prep_window")]
    pub return_to_prep_window: usize,
    /// 可視ゲート失敗がこれを超えて連続したら強制終了
    #[serde(default = "default_max_missing_frames")]
    pub max_missing_frames: usize,
    /// フォロースルー判定: 体中心から反対側への手首距離（肩幅単位）
    #[serde(default = "default_follow_through_offset")]
    pub follow_through_offset: f32,
    /// バックスイング判定: 肩より後方への手首距離（肩幅単位）
    #[serde(default = "default_backswing_offset")]
    pub backswing_offset: f32,
}

fn default_visibility_confidence() -> f32 { 0.3 }
fn default_min_swing_frames() -> usize { 10 }
fn default_max_swing_frames() -> usize { 120 }
fn default_soft_limit_frames() -> usize { 60 }
fn default_stable_follow_through_frames() -> usize { 5 }
fn default_return_to_prep_min_frames() -> usize { 20 }
fn default_return_to_prep_window() -> usize { 10 }
fn default_max_missing_frames() -> usize { 10 }
fn default_follow_through_offset() -> f32 { 0.5 }
fn default_backswing_offset() -> f32 { 0.25 }

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            visibility_confidence: default_visibility_confidence(),
            min_swing_frames: default_min_swing_frames(),
            max_swing_frames: default_max_swing_frames(),
            soft_limit_frames: default_soft_limit_frames(),
            stable_follow_through_frames: default_stable_follow_through_frames(),
            return_to_prep_min_frames: default_return_to_prep_min_frames(),
            return_to_prep_window: default_return_to_prep_window(),
            max_missing_frames: default_max_missing_frames(),
            follow_through_offset: default_follow_through_offset(),
            backswing_offset: default_backswing_offset(),
        }
    }
}

/// 特徴量抽出の正規化定数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    #[serde(default = "default_feature_min_confidence")]
    pub min_confidence: f32,
    /// 全特徴量を [-clamp, clamp] に収める
    #[serde(default = "default_clamp")]
    pub clamp: f32,
    /// 胴体高さの下限（正規化座標）
    #[serde(default = "default_torso_floor")]
    pub torso_floor: f32,
    /// 速度正規化 (px/s)
    #[serde(default = "default_max_speeds")]
    pub max_speeds: MaxSpeeds,
    #[serde(default = "default_limb_angle_norm")]
    pub limb_angle_norm: f32,
    #[serde(default = "default_hip_angle_norm")]
    pub hip_angle_norm: f32,
    #[serde(default = "default_separation_angle_norm")]
    pub separation_angle_norm: f32,
}

/// 関節ごとの最大速度 (px/s)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MaxSpeeds {
    pub dominant_wrist: f32,
    pub non_dominant_wrist: f32,
    pub dominant_elbow: f32,
    pub non_dominant_elbow: f32,
    pub dominant_shoulder: f32,
    pub non_dominant_shoulder: f32,
}

fn default_feature_min_confidence() -> f32 { 0.2 }
fn default_clamp() -> f32 { 3.0 }
fn default_torso_floor() -> f32 { 0.1 }
fn default_limb_angle_norm() -> f32 { 180.0 }
fn default_hip_angle_norm() -> f32 { 90.0 }
fn default_separation_angle_norm() -> f32 { 45.0 }

fn default_max_speeds() -> MaxSpeeds {
    MaxSpeeds {
        dominant_wrist: 800.0,
        non_dominant_wrist: 600.0,
        dominant_elbow: 500.0,
        non_dominant_elbow: 400.0,
        dominant_shoulder: 400.0,
        non_dominant_shoulder: 400.0,
    }
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_feature_min_confidence(),
            clamp: default_clamp(),
            torso_floor: default_torso_floor(),
            max_speeds: default_max_speeds(),
            limb_angle_norm: default_limb_angle_norm(),
            hip_angle_norm: default_hip_angle_norm(),
            separation_angle_norm: default_separation_angle_norm(),
        }
    }
}

/// フェーズラベルの時間平滑化
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmoothingConfig {
    #[serde(default = "default_min_phase_duration")]
    pub min_phase_duration: usize,
    /// 代替分類で Backswing 開始とみなす、手首速度ピークに対する割合
    #[serde(default = "default_backswing_fraction")]
    pub backswing_fraction: f32,
}

fn default_min_phase_duration() -> usize { 3 }
fn default_backswing_fraction() -> f32 { 0.25 }

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            min_phase_duration: default_min_phase_duration(),
            backswing_fraction: default_backswing_fraction(),
        }
    }
}

/// 品質スコアと偏差レポート
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_backswing_weight")]
    pub backswing_weight: f32,
    #[serde(default = "default_contact_weight")]
    pub contact_weight: f32,
    #[serde(default = "default_follow_through_weight")]
    pub follow_through_weight: f32,
    /// |z| がこれを超える偏差のみ報告
    #[serde(default = "default_min_report_z")]
    pub min_report_z: f32,
    /// 参照標準偏差の下限
    #[serde(default = "default_std_floor")]
    pub std_floor: f32,
    #[serde(default = "default_moderate_z")]
    pub moderate_z: f32,
    #[serde(default = "default_major_z")]
    pub major_z: f32,
    /// モデルが無い場合のヒューリスティック重み
    #[serde(default)]
    pub heuristic: HeuristicWeights,
}

/// 経験的に決めた代替スコアの重み（モデルの代用品であり仕様ではない）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HeuristicWeights {
    #[serde(default = "default_heuristic_base")]
    pub base: f32,
    #[serde(default = "default_heuristic_wrist_speed")]
    pub wrist_speed: f32,
    #[serde(default = "default_heuristic_shoulder_speed")]
    pub shoulder_speed: f32,
    #[serde(default = "default_heuristic_elbow_angle")]
    pub elbow_angle: f32,
}

fn default_backswing_weight() -> f32 { 0.30 }
fn default_contact_weight() -> f32 { 0.40 }
fn default_follow_through_weight() -> f32 { 0.30 }
fn default_min_report_z() -> f32 { 0.5 }
fn default_std_floor() -> f32 { 0.001 }
fn default_moderate_z() -> f32 { 1.0 }
fn default_major_z() -> f32 { 2.0 }
fn default_heuristic_base() -> f32 { 50.0 }
fn default_heuristic_wrist_speed() -> f32 { 20.0 }
fn default_heuristic_shoulder_speed() -> f32 { 15.0 }
fn default_heuristic_elbow_angle() -> f32 { 10.0 }

impl Default for HeuristicWeights {
    fn default() -> Self {
        Self {
            base: default_heuristic_base(),
            wrist_speed: default_heuristic_wrist_speed(),
            shoulder_speed: default_heuristic_shoulder_speed(),
            elbow_angle: default_heuristic_elbow_angle(),
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            backswing_weight: default_backswing_weight(),
            contact_weight: default_contact_weight(),
            follow_through_weight: default_follow_through_weight(),
            min_report_z: default_min_report_z(),
            std_floor: default_std_floor(),
            moderate_z: default_moderate_z(),
            major_z: default_major_z(),
            heuristic: HeuristicWeights::default(),
        }
    }
}

/// 参照プロファイル生成
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: f32,
    #[serde(default = "default_fallback_quality_threshold")]
    pub fallback_quality_threshold: f32,
    #[serde(default = "default_min_source_videos")]
    pub min_source_videos: usize,
}

fn default_quality_threshold() -> f32 { 90.0 }
fn default_fallback_quality_threshold() -> f32 { 80.0 }
fn default_min_source_videos() -> usize { 3 }

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            quality_threshold: default_quality_threshold(),
            fallback_quality_threshold: default_fallback_quality_threshold(),
            min_source_videos: default_min_source_videos(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        Ok(config)
    }

    /// 読めなければデフォルト
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path.as_ref()) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("{:#}; using default configuration", e);
                Self::default()
            }
        }
    }
}
