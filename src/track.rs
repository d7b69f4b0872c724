use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::AnalysisError;

/// 動画メタデータ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    /// 不明な場合は省略可
    #[serde(default)]
    pub frame_rate: Option<f32>,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub total_frames: usize,
}

impl VideoInfo {
    /// 有効なフレームレート、無ければ `default`
    pub fn frame_rate_or(&self, default: f32) -> f32 {
        self.frame_rate
            .filter(|r| r.is_finite() && *r > 0.0)
            .unwrap_or(default)
    }
}

/// 姿勢推定済みのキーポイント列
///
/// 各フレームは `[x, y, confidence]` × 17（フレーム全体の正規化座標）。
/// キーポイント数はフレーム投入時に検証する。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeypointTrack {
    pub info: VideoInfo,
    pub frames: Vec<Vec<[f32; 3]>>,
}

impl KeypointTrack {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read keypoint track {}", path.display()))?;
        let track: KeypointTrack = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse keypoint track {}", path.display()))?;
        if track.info.width == 0 || track.info.height == 0 {
            return Err(AnalysisError::InvalidImageSize {
                width: track.info.width,
                height: track.info.height,
            })
            .with_context(|| format!("invalid keypoint track {}", path.display()));
        }
        Ok(track)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, serde_json::to_string(self)?)
            .with_context(|| format!("failed to write keypoint track {}", path.display()))?;
        Ok(())
    }
}
