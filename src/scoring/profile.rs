use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::ProfileConfig;
use crate::error::AnalysisError;
use crate::features::aggregate::FeatureStats;
use crate::features::{FeatureVector, FEATURE_COUNT};
use crate::swing::{PhaseMap, SwingPhase};

/// ストロークの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrokeType {
    Forehand,
    Backhand,
    Serve,
}

impl StrokeType {
    pub fn name(self) -> &'static str {
        match self {
            Self::Forehand => "forehand",
            Self::Backhand => "backhand",
            Self::Serve => "serve",
        }
    }
}

impl FromStr for StrokeType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "forehand" => Ok(Self::Forehand),
            "backhand" => Ok(Self::Backhand),
            "serve" => Ok(Self::Serve),
            other => Err(format!("unknown stroke type '{}'", other)),
        }
    }
}

/// 1局面分の参照統計
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseProfile {
    pub frame_count: usize,
    pub means: Vec<f32>,
    /// 母標準偏差
    pub std_devs: Vec<f32>,
    pub mins: Vec<f32>,
    pub maxs: Vec<f32>,
}

impl PhaseProfile {
    /// 全フレームの有限値を特徴量ごとにプールして統計を取る
    pub fn from_features(features: &[FeatureVector]) -> Self {
        let stats = FeatureStats::from_features(features);
        Self {
            frame_count: stats.frame_count,
            means: stats.mean.to_vec(),
            std_devs: stats.std_dev.to_vec(),
            mins: stats.min.to_vec(),
            maxs: stats.max.to_vec(),
        }
    }

    fn validate(&self, phase: SwingPhase) -> Result<(), AnalysisError> {
        for stat in [&self.means, &self.std_devs, &self.mins, &self.maxs] {
            if stat.len() != FEATURE_COUNT {
                return Err(AnalysisError::ProfileShape {
                    phase: phase.name(),
                    expected: FEATURE_COUNT,
                    actual: stat.len(),
                });
            }
        }
        Ok(())
    }
}

/// ストローク種別ごとの参照プロファイル
///
/// 推論時は読み取り専用。JSON（局面名がキー）で保存し、差分を取れる形にしておく。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceProfile {
    pub stroke_type: StrokeType,
    /// 採用した品質スコアの閾値
    pub quality_threshold: f32,
    pub source_videos: usize,
    pub source_swings: usize,
    pub phases: PhaseMap<PhaseProfile>,
}

impl ReferenceProfile {
    pub fn phase(&self, phase: SwingPhase) -> Option<&PhaseProfile> {
        self.phases.get(phase)
    }

    /// 各局面の配列長を検証
    pub fn validate(&self) -> Result<(), AnalysisError> {
        for (phase, profile) in self.phases.iter() {
            profile.validate(phase)?;
        }
        Ok(())
    }

    /// プロファイルディレクトリ内のファイル名
    pub fn file_name(stroke: StrokeType) -> String {
        format!("{}_profile.json", stroke.name())
    }

    pub fn path_in(dir: &Path, stroke: StrokeType) -> PathBuf {
        dir.join(Self::file_name(stroke))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read profile {}", path.display()))?;
        let profile: ReferenceProfile = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse profile {}", path.display()))?;
        profile
            .validate()
            .with_context(|| format!("invalid profile {}", path.display()))?;
        Ok(profile)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("failed to write profile {}", path.display()))?;
        Ok(())
    }
}

/// プロファイル生成用の1スイング（局面ごとのフレーム特徴量）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceSwing {
    pub video_id: String,
    pub stroke_type: StrokeType,
    pub quality_score: f32,
    pub phases: PhaseMap<Vec<FeatureVector>>,
}

impl ReferenceSwing {
    /// フレーム特徴量とラベルから組み立てる
    pub fn from_labelled(
        video_id: impl Into<String>,
        stroke_type: StrokeType,
        quality_score: f32,
        features: &[FeatureVector],
        labels: &[SwingPhase],
    ) -> Result<Self, AnalysisError> {
        if features.len() != labels.len() {
            return Err(AnalysisError::LabelCount {
                expected: features.len(),
                actual: labels.len(),
            });
        }
        let mut phases: PhaseMap<Vec<FeatureVector>> = PhaseMap::new();
        for (f, &phase) in features.iter().zip(labels) {
            if phase == SwingPhase::None {
                continue;
            }
            match phases.get_mut(phase) {
                Some(frames) => frames.push(*f),
                None => {
                    phases.insert(phase, vec![*f]);
                }
            }
        }
        Ok(Self {
            video_id: video_id.into(),
            stroke_type,
            quality_score,
            phases,
        })
    }
}

/// 高品質スイングから参照プロファイルを作る（オフライン）
pub struct ProfileBuilder {
    config: ProfileConfig,
}

impl ProfileBuilder {
    pub fn new(config: &ProfileConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// 品質 `quality_threshold` 以上のスイングを使う。
    /// 動画数が足りなければ `fallback_quality_threshold` で再選抜し、
    /// それでも足りなければエラー。
    pub fn build(
        &self,
        stroke: StrokeType,
        swings: &[ReferenceSwing],
    ) -> Result<ReferenceProfile, AnalysisError> {
        let required = self.config.min_source_videos;
        let candidates: Vec<&ReferenceSwing> =
            swings.iter().filter(|s| s.stroke_type == stroke).collect();

        let select = |threshold: f32| {
            let selected: Vec<&ReferenceSwing> = candidates
                .iter()
                .copied()
                .filter(|s| s.quality_score >= threshold)
                .collect();
            let videos: BTreeSet<&str> = selected.iter().map(|s| s.video_id.as_str()).collect();
            (selected, videos.len())
        };

        let mut threshold = self.config.quality_threshold;
        let (mut selected, mut videos) = select(threshold);
        if videos < required {
            log::warn!(
                "{}: only {} videos with quality >= {}, retrying with >= {}",
                stroke.name(),
                videos,
                threshold,
                self.config.fallback_quality_threshold
            );
            threshold = self.config.fallback_quality_threshold;
            (selected, videos) = select(threshold);
        }
        if videos < required {
            return Err(AnalysisError::InsufficientReferences {
                found: videos,
                required,
            });
        }

        let mut phases = PhaseMap::new();
        for phase in SwingPhase::ALL {
            let pooled: Vec<FeatureVector> = selected
                .iter()
                .filter_map(|s| s.phases.get(phase))
                .flatten()
                .copied()
                .collect();
            if !pooled.is_empty() {
                phases.insert(phase, PhaseProfile::from_features(&pooled));
            }
        }

        log::info!(
            "{} profile: {} swings from {} videos (quality >= {})",
            stroke.name(),
            selected.len(),
            videos,
            threshold
        );

        Ok(ReferenceProfile {
            stroke_type: stroke,
            quality_threshold: threshold,
            source_videos: videos,
            source_swings: selected.len(),
            phases,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn swing(video: &str, quality: f32, value: f32) -> ReferenceSwing {
        let mut phases = PhaseMap::new();
        phases.insert(SwingPhase::Contact, vec![[value; FEATURE_COUNT]; 2]);
        ReferenceSwing {
            video_id: video.to_string(),
            stroke_type: StrokeType::Forehand,
            quality_score: quality,
            phases,
        }
    }

    #[test]
    fn test_build_from_high_quality() {
        let swings = vec![
            swing("a", 95.0, 1.0),
            swing("b", 92.0, 2.0),
            swing("c", 91.0, 3.0),
            swing("d", 50.0, 100.0),
        ];
        let profile = ProfileBuilder::new(&ProfileConfig::default())
            .build(StrokeType::Forehand, &swings)
            .unwrap();
        assert_eq!(profile.quality_threshold, 90.0);
        assert_eq!(profile.source_videos, 3);
        let contact = profile.phase(SwingPhase::Contact).unwrap();
        assert_eq!(contact.frame_count, 6);
        assert!((contact.means[0] - 2.0).abs() < 1e-6);
        assert!((contact.std_devs[0] - (2.0f32 / 3.0).sqrt()).abs() < 1e-6);
        assert_eq!(contact.mins[0], 1.0);
        assert_eq!(contact.maxs[0], 3.0);
        assert!(profile.phase(SwingPhase::Backswing).is_none());
    }

    #[test]
    fn test_fallback_threshold() {
        let swings = vec![
            swing("a", 95.0, 1.0),
            swing("b", 85.0, 2.0),
            swing("c", 81.0, 3.0),
        ];
        let profile = ProfileBuilder::new(&ProfileConfig::default())
            .build(StrokeType::Forehand, &swings)
            .unwrap();
        assert_eq!(profile.quality_threshold, 80.0);
        assert_eq!(profile.source_swings, 3);
    }

    #[test]
    fn test_distinct_videos_required() {
        let swings = vec![
            swing("a", 95.0, 1.0),
            swing("a", 96.0, 1.0),
            swing("b", 97.0, 2.0),
        ];
        let err = ProfileBuilder::new(&ProfileConfig::default())
            .build(StrokeType::Forehand, &swings)
            .unwrap_err();
        assert_eq!(
            err,
            AnalysisError::InsufficientReferences {
                found: 2,
                required: 3
            }
        );
        // 別ストロークは対象外
        assert!(ProfileBuilder::new(&ProfileConfig::default())
            .build(StrokeType::Serve, &swings)
            .is_err());
    }

    #[test]
    fn test_profile_file_round_trip() {
        let swings = vec![swing("a", 95.0, 1.0), swing("b", 95.0, 2.0), swing("c", 95.0, 3.0)];
        let profile = ProfileBuilder::new(&ProfileConfig::default())
            .build(StrokeType::Forehand, &swings)
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = ReferenceProfile::path_in(dir.path(), StrokeType::Forehand);
        profile.save(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"contact\""));
        assert!(text.contains("\"std_devs\""));

        let loaded = ReferenceProfile::load(&path).unwrap();
        assert_eq!(loaded, profile);
    }

    #[test]
    fn test_load_rejects_wrong_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(
            &path,
            r#"{"stroke_type":"forehand","quality_threshold":90.0,"source_videos":3,"source_swings":3,
               "phases":{"contact":{"frame_count":1,"means":[0.0],"std_devs":[0.0],"mins":[0.0],"maxs":[0.0]}}}"#,
        )
        .unwrap();
        assert!(ReferenceProfile::load(&path).is_err());
    }

    #[test]
    fn test_reference_swing_from_labels() {
        let features = vec![[0.0; FEATURE_COUNT]; 4];
        let labels = [
            SwingPhase::Preparation,
            SwingPhase::Backswing,
            SwingPhase::Backswing,
            SwingPhase::None,
        ];
        let swing =
            ReferenceSwing::from_labelled("v1", StrokeType::Backhand, 90.0, &features, &labels)
                .unwrap();
        assert_eq!(swing.phases.get(SwingPhase::Backswing).map(Vec::len), Some(2));
        assert!(!swing.phases.contains(SwingPhase::None));
    }

    #[test]
    fn test_stroke_from_str() {
        assert_eq!("Forehand".parse::<StrokeType>(), Ok(StrokeType::Forehand));
        assert!("lob".parse::<StrokeType>().is_err());
    }

    #[test]
    fn test_phase_profile_shares_aggregate_stats() {
        let mut features = vec![[0.25; FEATURE_COUNT]; 3];
        features[0][0] = 1.0;
        features[1][0] = f32::NAN;
        features[2][0] = 4.0;

        let profile = PhaseProfile::from_features(&features);
        let agg = crate::features::PhaseAggregate::from_features(&features, 10.0);
        assert_eq!(profile.frame_count, agg.frame_count);
        assert_eq!(profile.means[0], 2.5);
        assert_eq!(profile.means[0], agg.mean[0]);
        assert_eq!(profile.std_devs[0], agg.std_dev[0]);
        assert_eq!(profile.maxs[0] - profile.mins[0], agg.range[0]);
        assert_eq!(profile.mins[1], 0.25);
    }
}
