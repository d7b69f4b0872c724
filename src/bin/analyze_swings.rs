use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use swing_coach::config::Config;
use swing_coach::pipeline::{SwingReport, SwingScorer, VideoAnalyzer};
use swing_coach::scoring::{ReferenceProfile, ReferenceSwing, StrokeType};
use swing_coach::swing::{SegmenterStats, Swing};
use swing_coach::track::{KeypointTrack, VideoInfo};

/// キーポイント列からスイングを検出して採点する
#[derive(Parser, Debug)]
#[command(name = "analyze_swings", version = env!("GIT_VERSION"), about)]
struct Args {
    /// キーポイント列（JSON）
    #[arg(long)]
    input: PathBuf,

    /// 設定ファイル（TOML）。省略時はデフォルト
    #[arg(long)]
    config: Option<PathBuf>,

    /// 参照プロファイルのディレクトリ
    #[arg(long)]
    profile_dir: Option<PathBuf>,

    #[arg(long, default_value = "forehand")]
    stroke: StrokeType,

    #[arg(long)]
    left_handed: bool,

    /// ONNXモデルのディレクトリ（`onnx` feature 有効時のみ使用）
    #[arg(long)]
    models_dir: Option<PathBuf>,

    /// 出力先。省略時は標準出力
    #[arg(long)]
    output: Option<PathBuf>,

    /// 参照スイングとして書き出す（build_profiles の入力）
    #[arg(long)]
    reference_out: Option<PathBuf>,
}

#[derive(Serialize)]
struct AnalysisOutput {
    input: String,
    video: VideoInfo,
    stroke_type: StrokeType,
    is_right_handed: bool,
    segmenter: SegmenterStats,
    swings: Vec<SwingReport>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let is_right_handed = !args.left_handed;

    let track = KeypointTrack::load(&args.input)?;
    let frame_rate = track.info.frame_rate_or(config.signal.default_frame_rate);
    log::info!(
        "{}: {}x{} @ {:.1} fps, {} frames",
        args.input.display(),
        track.info.width,
        track.info.height,
        frame_rate,
        track.frames.len()
    );

    let (swings, stats) = detect_swings(&config, &track, frame_rate)?;
    log::info!(
        "{} swings detected ({} too short, {} invalid)",
        swings.len(),
        stats.dropped_too_short,
        stats.dropped_invalid
    );

    let profile = match &args.profile_dir {
        Some(dir) => load_profile(dir, args.stroke),
        None => None,
    };

    let mut scorer = build_scorer(&config, args.models_dir.as_deref());
    let video_id = args
        .input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut reports = Vec::with_capacity(swings.len());
    let mut references = Vec::new();
    for swing in &swings {
        let analysis = scorer.analyze(swing, is_right_handed)?;
        let features = analysis.features.clone();
        let labels = analysis.labels.labels.clone();
        let report = scorer.report(swing, analysis, profile.as_ref());

        if args.reference_out.is_some() {
            if let Some(quality) = report.overall_score {
                references.push(ReferenceSwing::from_labelled(
                    video_id.as_str(),
                    args.stroke,
                    quality,
                    &features,
                    &labels,
                )?);
            }
        }

        match report.overall_score {
            Some(score) => log::info!(
                "swing {}-{}: {:.1} ({:?})",
                report.start_frame,
                report.end_frame,
                score,
                report.completion
            ),
            None => log::info!(
                "swing {}-{}: no scored phase ({:?})",
                report.start_frame,
                report.end_frame,
                report.completion
            ),
        }
        reports.push(report);
    }

    let output = AnalysisOutput {
        input: args.input.display().to_string(),
        video: track.info.clone(),
        stroke_type: args.stroke,
        is_right_handed,
        segmenter: stats,
        swings: reports,
    };
    let json = serde_json::to_string_pretty(&output)?;
    match &args.output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
            log::info!("report written to {}", path.display());
        }
        None => println!("{}", json),
    }

    if let Some(path) = &args.reference_out {
        fs::write(path, serde_json::to_string_pretty(&references)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        log::info!("{} reference swings written to {}", references.len(), path.display());
    }

    Ok(())
}

fn detect_swings(
    config: &Config,
    track: &KeypointTrack,
    frame_rate: f32,
) -> Result<(Vec<Swing>, SegmenterStats)> {
    let mut analyzer = VideoAnalyzer::new(config, track.info.width, track.info.height, frame_rate)?;
    let mut swings = Vec::new();
    for (i, raw) in track.frames.iter().enumerate() {
        let swing = analyzer
            .push_keypoints(raw)
            .with_context(|| format!("frame {}", i))?;
        swings.extend(swing);
    }
    let stats = analyzer.stats();
    swings.extend(analyzer.finish()?);
    Ok((swings, stats))
}

/// 読めなければ偏差なしで続行
fn load_profile(dir: &Path, stroke: StrokeType) -> Option<ReferenceProfile> {
    let path = ReferenceProfile::path_in(dir, stroke);
    match ReferenceProfile::load(&path) {
        Ok(profile) => {
            log::info!(
                "reference profile {} ({} swings from {} videos)",
                path.display(),
                profile.source_swings,
                profile.source_videos
            );
            Some(profile)
        }
        Err(e) => {
            log::warn!("{:#}; deviations are not reported", e);
            None
        }
    }
}

#[cfg(feature = "onnx")]
fn build_scorer(config: &Config, models_dir: Option<&Path>) -> SwingScorer {
    use swing_coach::classify::OnnxPhaseClassifier;
    use swing_coach::scoring::QualityScorer;

    let scorer = SwingScorer::new(config);
    let Some(dir) = models_dir else {
        return scorer;
    };

    let quality = QualityScorer::new(&config.scoring, &config.features).load_models(dir);
    let scorer = scorer.with_quality(quality);

    let path = dir.join("phase_classifier.onnx");
    if !path.exists() {
        log::warn!("{} not found; using heuristic phase labels", path.display());
        return scorer;
    }
    match OnnxPhaseClassifier::new(&path) {
        Ok(classifier) => scorer.with_classifier(Box::new(classifier), config),
        Err(e) => {
            log::warn!("{:#}; using heuristic phase labels", e);
            scorer
        }
    }
}

#[cfg(not(feature = "onnx"))]
fn build_scorer(config: &Config, models_dir: Option<&Path>) -> SwingScorer {
    if let Some(dir) = models_dir {
        log::warn!(
            "built without the onnx feature; ignoring models in {}",
            dir.display()
        );
    }
    SwingScorer::new(config)
}
