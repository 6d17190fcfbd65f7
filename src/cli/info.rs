use anyhow::Result;
use serde::Serialize;

use super::context::CliContext;
use super::output::emit;

#[derive(Debug, Serialize)]
struct SystemInfo {
    version: &'static str,
    build_date: &'static str,
    git_commit: &'static str,
    git_branch: &'static str,
    config_path: String,
    template_root: String,
    templates: usize,
    template_kinds: Vec<String>,
    scenes: Vec<String>,
    confidence_threshold: f64,
    confirmation_count: u32,
    detection_interval_ms: u64,
    max_concurrent_tasks: usize,
}

pub async fn cmd_info(ctx: &CliContext) -> Result<()> {
    let config = ctx.config();
    let pilot = ctx.offline_pilot()?;
    let index = pilot.store().snapshot();

    let mut template_kinds: Vec<String> = index.kinds().map(str::to_string).collect();
    template_kinds.sort();
    let mut scenes: Vec<String> = index.scenes().map(|s| s.to_string()).collect();
    scenes.sort();

    let info = SystemInfo {
        version: env!("CARGO_PKG_VERSION"),
        build_date: env!("BUILD_DATE"),
        git_commit: env!("GIT_HASH"),
        git_branch: env!("GIT_BRANCH"),
        config_path: ctx.config_path().display().to_string(),
        template_root: config.templates.root.display().to_string(),
        templates: index.len(),
        template_kinds,
        scenes,
        confidence_threshold: config.detection.confidence_threshold,
        confirmation_count: config.detection.confirmation_count,
        detection_interval_ms: config.detection.detection_interval_ms,
        max_concurrent_tasks: config.tasks.max_concurrent_tasks,
    };

    emit(ctx.output(), &info, |info| {
        println!("GamePilot System Information");
        println!("============================");
        println!("Version: {}", info.version);
        println!("Build Date: {}", info.build_date);
        println!("Git Commit: {} ({})", info.git_commit, info.git_branch);
        println!();

        println!("Configuration:");
        println!("- Config File: {}", info.config_path);
        println!("- Template Root: {}", info.template_root);
        println!(
            "- Templates: {} across [{}]",
            info.templates,
            info.template_kinds.join(", ")
        );
        if info.scenes.is_empty() {
            println!("- Scenes: (none)");
        } else {
            println!("- Scenes: {}", info.scenes.join(", "));
        }
        println!(
            "- Detection: threshold {:.2}, {} confirmation(s), every {}ms",
            info.confidence_threshold, info.confirmation_count, info.detection_interval_ms
        );
        println!("- Max Concurrent Tasks: {}", info.max_concurrent_tasks);
    })
}
