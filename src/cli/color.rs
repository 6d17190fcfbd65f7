use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use gamepilot_cli::ImageFileSource;
use gamepilot_core_types::Rect;
use match_engine::{ColorMatch, ColorRange};
use serde::Serialize;

use super::context::{parse_region, parse_rgb, CliContext};
use super::output::emit;

#[derive(Args, Clone, Debug)]
pub struct ColorArgs {
    /// Frame image to inspect
    pub frame: PathBuf,

    /// Lower bound as `r,g,b`
    #[arg(long, value_parser = parse_rgb)]
    pub min: [u8; 3],

    /// Upper bound as `r,g,b`
    #[arg(long, value_parser = parse_rgb)]
    pub max: [u8; 3],

    /// Share of matching pixels required to report a detection
    #[arg(long, default_value_t = 0.0)]
    pub min_ratio: f64,

    /// Inspect only `x,y,width,height`
    #[arg(short, long, value_parser = parse_region)]
    pub region: Option<Rect>,
}

#[derive(Debug, Serialize)]
struct ColorReport {
    #[serde(flatten)]
    detection: ColorMatch,
    ratio: f64,
}

pub async fn cmd_color(args: ColorArgs, ctx: &CliContext) -> Result<()> {
    let source = ImageFileSource::open(&args.frame)?;
    let frame = source.first().context("frame source is empty")?;
    let range = ColorRange::new(args.min, args.max).with_min_ratio(args.min_ratio);

    let engine = match_engine::MatchEngine::new(ctx.config().engine_config());
    let detection = engine.detect_color(frame, &range, args.region);
    let report = ColorReport {
        ratio: detection.ratio(),
        detection,
    };

    emit(ctx.output(), &report, |report| {
        println!(
            "{}: {}/{} pixels in range ({:.2}%)",
            if report.detection.found { "found" } else { "not found" },
            report.detection.matching_pixels,
            report.detection.total_pixels,
            report.ratio * 100.0
        )
    })
}
