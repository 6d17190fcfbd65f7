use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use gamepilot_cli::ImageFileSource;
use gamepilot_core_types::Rect;

use super::context::{parse_region, CliContext};
use super::output::emit;

#[derive(Args, Clone, Debug)]
pub struct LocateArgs {
    /// Template reference as `<type>/<name>`
    pub template: String,

    /// Frame image to search
    pub frame: PathBuf,

    /// Minimum confidence for a match
    #[arg(short, long, default_value_t = 0.8)]
    pub threshold: f64,

    /// Search only inside `x,y,width,height`
    #[arg(short, long, value_parser = parse_region)]
    pub region: Option<Rect>,
}

pub async fn cmd_locate(args: LocateArgs, ctx: &CliContext) -> Result<()> {
    let (kind, name) = args
        .template
        .split_once('/')
        .with_context(|| format!("template must be <type>/<name>, got '{}'", args.template))?;
    let pilot = ctx.offline_pilot()?;
    let template = pilot
        .store()
        .get(kind, name)
        .with_context(|| format!("template '{}' not found", args.template))?;
    let source = ImageFileSource::open(&args.frame)?;

    let result = pilot
        .engine()
        .locate(&source, template, args.threshold, args.region)
        .await?;

    emit(ctx.output(), &result, |result| match result.position {
        Some(position) if result.found => println!(
            "{} found at {} (confidence {:.3})",
            result.template, position, result.confidence
        ),
        _ => println!(
            "{} not found (best confidence {:.3})",
            result.template, result.confidence
        ),
    })
}
