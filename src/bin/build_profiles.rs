use anyhow::{bail, Context, Result};
use clap::Parser;
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use swing_coach::config::Config;
use swing_coach::scoring::{ProfileBuilder, ReferenceProfile, ReferenceSwing, StrokeType};

/// 高品質スイングからストローク別の参照プロファイルを作る
#[derive(Parser, Debug)]
#[command(name = "build_profiles", version = env!("GIT_VERSION"), about)]
struct Args {
    /// 参照スイング（JSON配列。analyze_swings --reference-out の出力を連結したもの）
    #[arg(long, num_args = 1.., required = true)]
    input: Vec<PathBuf>,

    #[arg(long)]
    output_dir: PathBuf,

    /// 設定ファイル（TOML）。省略時はデフォルト
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let mut swings: Vec<ReferenceSwing> = Vec::new();
    for path in &args.input {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let loaded: Vec<ReferenceSwing> = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        log::info!("{}: {} reference swings", path.display(), loaded.len());
        swings.extend(loaded);
    }

    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("failed to create {}", args.output_dir.display()))?;

    let strokes: BTreeSet<&'static str> = swings.iter().map(|s| s.stroke_type.name()).collect();
    let builder = ProfileBuilder::new(&config.profile);
    let mut built = 0;
    for stroke in [StrokeType::Forehand, StrokeType::Backhand, StrokeType::Serve] {
        if !strokes.contains(stroke.name()) {
            continue;
        }
        match builder.build(stroke, &swings) {
            Ok(profile) => {
                let path = ReferenceProfile::path_in(&args.output_dir, stroke);
                profile.save(&path)?;
                log::info!(
                    "{}: {} swings from {} videos (quality >= {}) -> {}",
                    stroke.name(),
                    profile.source_swings,
                    profile.source_videos,
                    profile.quality_threshold,
                    path.display()
                );
                built += 1;
            }
            Err(e) => log::warn!("{}: {}", stroke.name(), e),
        }
    }

    if built == 0 {
        bail!("no reference profile could be built");
    }
    Ok(())
}
