use super::color::cmd_color;
use super::detect::cmd_detect;
use super::env::CliArgs;
use super::info::cmd_info;
use super::locate::cmd_locate;
use super::run::cmd_run;
use super::templates::cmd_templates;
use crate::cli::commands::Commands;
use crate::cli::context::CliContext;
use anyhow::Result;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::Templates(args) => cmd_templates(args, ctx).await,
        Commands::Locate(args) => cmd_locate(args, ctx).await,
        Commands::Color(args) => cmd_color(args, ctx).await,
        Commands::Detect(args) => cmd_detect(args, ctx).await,
        Commands::Run(args) => cmd_run(args, ctx).await,
        Commands::Info => cmd_info(ctx).await,
    }
}
