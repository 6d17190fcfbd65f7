use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use gamepilot_cli::ImageFileSource;
use gamepilot_core_types::SceneId;
use scene_detector::{DetectionResult, DetectorStats};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::context::CliContext;
use super::output::emit;

#[derive(Args, Clone, Debug)]
pub struct DetectArgs {
    /// Frame image or directory of frames, served in name order
    pub frames: PathBuf,

    /// Number of polls (defaults to one pass over the frames)
    #[arg(short, long)]
    pub polls: Option<usize>,

    /// Poll in the background until this scene is confirmed
    #[arg(short, long)]
    pub wait: Option<String>,

    /// Give up waiting after this long (e.g. `10s`)
    #[arg(long, value_parser = humantime::parse_duration, default_value = "30s")]
    pub timeout: Duration,
}

#[derive(Debug, Serialize)]
struct DetectReport {
    current_scene: SceneId,
    #[serde(skip_serializing_if = "Option::is_none")]
    reached: Option<bool>,
    results: Vec<DetectionResult>,
    stats: DetectorStats,
}

pub async fn cmd_detect(args: DetectArgs, ctx: &CliContext) -> Result<()> {
    let source = Arc::new(ImageFileSource::open(&args.frames)?);
    let frames = source.len();
    let pilot = ctx.pilot(source, |config| {
        config.templates.watch = false;
        config.detection.auto_detection = false;
    })?;
    let detector = pilot.detector();

    let reached = match args.wait {
        Some(target) => {
            let target = SceneId::new(target);
            let cancel = CancellationToken::new();
            let interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    interrupt.cancel();
                }
            });
            detector.start_detection()?;
            info!(scene = %target, timeout = %humantime::format_duration(args.timeout), "waiting for scene");
            let reached = detector
                .wait_for_scene_until(&target, args.timeout, &cancel)
                .await;
            detector.stop_detection();
            Some(reached)
        }
        None => {
            for _ in 0..args.polls.unwrap_or(frames) {
                detector.detect_current_scene().await;
            }
            None
        }
    };

    let report = DetectReport {
        current_scene: detector.current_scene(),
        reached,
        results: detector.history(),
        stats: detector.stats(),
    };
    pilot.shutdown().await;

    emit(ctx.output(), &report, |report| {
        for result in &report.results {
            println!(
                "{} {:<16} confidence {:.3}  matched [{}]  {}ms",
                result.timestamp.format("%H:%M:%S%.3f"),
                result.scene.to_string(),
                result.confidence,
                result.matched_templates.join(", "),
                result.detection_time_ms
            );
        }
        println!("current scene: {}", report.current_scene);
        if let Some(reached) = report.reached {
            println!("target reached: {reached}");
        }
    })
}
