use serde::Serialize;
use std::cmp::Ordering;

use crate::config::ScoringConfig;
use crate::features::extractor::index;
use crate::features::{FeatureVector, FEATURE_NAMES};

use super::profile::PhaseProfile;

/// 偏差の大きさ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Minor,
    Moderate,
    Major,
}

/// 参照平均に対する向き
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    #[serde(rename = "too high")]
    TooHigh,
    #[serde(rename = "too low")]
    TooLow,
}

/// 1特徴量の参照プロファイルからのずれ
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureDeviation {
    pub feature_index: usize,
    pub feature_name: &'static str,
    pub actual_value: f32,
    pub reference_mean: f32,
    pub reference_std_dev: f32,
    pub z_score: f32,
    pub direction: Direction,
    pub severity: Severity,
}

/// 標準偏差は `std_floor` を下限にする
pub fn z_score(actual: f32, mean: f32, std_dev: f32, std_floor: f32) -> f32 {
    (actual - mean) / std_dev.max(std_floor)
}

pub fn severity(z: f32, config: &ScoringConfig) -> Severity {
    let magnitude = z.abs();
    if magnitude >= config.major_z {
        Severity::Major
    } else if magnitude >= config.moderate_z {
        Severity::Moderate
    } else {
        Severity::Minor
    }
}

/// 局面平均と参照プロファイルを比べ、|z| が閾値を超えるものを |z| の降順で返す
///
/// 利き手フラグは比較しない。
pub fn compute_deviations(
    actual_means: &FeatureVector,
    reference: &PhaseProfile,
    config: &ScoringConfig,
) -> Vec<FeatureDeviation> {
    let mut deviations: Vec<FeatureDeviation> = (0..index::HANDEDNESS)
        .filter_map(|k| {
            let actual = actual_means[k];
            let mean = *reference.means.get(k)?;
            let std_dev = *reference.std_devs.get(k)?;
            let z = z_score(actual, mean, std_dev, config.std_floor);
            if !z.is_finite() || z.abs() <= config.min_report_z {
                return None;
            }
            Some(FeatureDeviation {
                feature_index: k,
                feature_name: FEATURE_NAMES[k],
                actual_value: actual,
                reference_mean: mean,
                reference_std_dev: std_dev,
                z_score: z,
                direction: if z > 0.0 {
                    Direction::TooHigh
                } else {
                    Direction::TooLow
                },
                severity: severity(z, config),
            })
        })
        .collect();

    deviations.sort_by(|a, b| {
        match b.z_score.abs().total_cmp(&a.z_score.abs()) {
            Ordering::Equal => a.feature_index.cmp(&b.feature_index),
            other => other,
        }
    });
    deviations
}
