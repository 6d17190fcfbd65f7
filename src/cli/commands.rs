use clap::Subcommand;

use super::color::ColorArgs;
use super::detect::DetectArgs;
use super::locate::LocateArgs;
use super::run::RunArgs;
use super::templates::TemplatesArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// List the templates found under the template root
    Templates(TemplatesArgs),

    /// Look for one template in a frame image
    #[command(name = "match")]
    Locate(LocateArgs),

    /// Count pixels of a frame inside an RGB range
    Color(ColorArgs),

    /// Run scene detection over frame images
    Detect(DetectArgs),

    /// Execute a YAML task script against frame images (input is dry-run)
    Run(RunArgs),

    /// Show version, build and configuration information
    #[command(alias = "version")]
    Info,
}
