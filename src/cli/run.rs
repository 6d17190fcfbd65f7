use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Args;
use gamepilot_cli::{ImageFileSource, StaticProbe};
use task_runner::{GameRunningCheck, ScriptedTask, TaskEvent};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use super::context::CliContext;
use super::output::emit;

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Task script (YAML)
    pub script: PathBuf,

    /// Frame image or directory of frames standing in for the screen
    #[arg(short, long)]
    pub frames: PathBuf,

    /// Only run while one of these game processes is running
    #[arg(long = "require-process", value_name = "NAME")]
    pub require_process: Vec<String>,

    /// Process names the offline probe reports as running
    #[arg(long = "running", value_name = "NAME")]
    pub running: Vec<String>,
}

pub async fn cmd_run(args: RunArgs, ctx: &CliContext) -> Result<()> {
    let mut task = ScriptedTask::from_path(&args.script)?;
    if !args.require_process.is_empty() {
        let probe = args
            .running
            .iter()
            .enumerate()
            .fold(StaticProbe::default(), |probe, (idx, name)| {
                probe.with_process(idx as u32 + 1, name.clone())
            });
        let check = args
            .require_process
            .iter()
            .fold(GameRunningCheck::new(Arc::new(probe)), |check, name| {
                check.with_process(name.clone())
            });
        task = task.with_precondition(Arc::new(check));
    }
    let task = Arc::new(task);
    let source = Arc::new(ImageFileSource::open(&args.frames)?);
    let pilot = ctx.pilot(source, |config| {
        config.detection.auto_detection = true;
    })?;

    let runner = pilot.register_task(task);
    info!(
        task = runner.name(),
        estimated = %humantime::format_duration(runner.estimated_time()),
        "running task script"
    );

    let mut events = runner.subscribe();
    let progress = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(TaskEvent::StepStarted { step, index, .. }) => info!(index, step = %step, "step started"),
                Ok(TaskEvent::Error { attempt, error, .. }) => warn!(attempt, "attempt failed: {error}"),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "task events lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let interrupt = Arc::clone(&runner);
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling task");
            interrupt.cancel();
        }
    });

    let outcome = runner.execute().await;
    ctrl_c.abort();
    progress.abort();
    pilot.shutdown().await;

    let result = outcome?;
    emit(ctx.output(), &result, |result| {
        println!(
            "{} in {}ms: {}",
            if result.success { "succeeded" } else { "failed" },
            result.execution_time_ms,
            result.message
        );
        for error in &result.errors {
            println!("  - {error}");
        }
    })?;
    if !result.success {
        bail!("task '{}' did not complete", runner.name());
    }
    Ok(())
}
