use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use gamepilot_cli::PilotConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global subscriber: stderr always, plus `file` when set.
/// The returned guard flushes the file sink and must outlive the command.
pub fn init_logging(level: &str, debug: bool, file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };

    let (file_layer, guard) = match file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let name = path
                .file_name()
                .with_context(|| format!("Log file path has no file name: {}", path.display()))?;
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string())))
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

pub struct LoadedConfig {
    pub config: PilotConfig,
    pub path: PathBuf,
    /// `false` when no file existed at `path` and defaults are in use.
    pub found: bool,
}

/// Resolves and parses the configuration. Runs before logging is set up, so
/// reporting what was loaded is left to the caller.
pub fn load_config(config_path: Option<&PathBuf>) -> Result<LoadedConfig> {
    let config_path = match config_path {
        Some(path) => {
            if !path.exists() {
                bail!("Config file not found: {}", path.display());
            }
            path.clone()
        }
        None => {
            // Priority: ./config/gamepilot.yaml > ~/.config/gamepilot/config.yaml
            let local_config = PathBuf::from("config/gamepilot.yaml");
            if local_config.exists() {
                local_config
            } else {
                let mut path = dirs::config_dir().context("Failed to get config directory")?;
                path.push("gamepilot");
                path.push("config.yaml");
                path
            }
        }
    };

    if config_path.exists() {
        let config = PilotConfig::from_path(&config_path)
            .with_context(|| format!("Failed to load config file {}", config_path.display()))?;
        Ok(LoadedConfig {
            config,
            path: config_path,
            found: true,
        })
    } else {
        Ok(LoadedConfig {
            config: PilotConfig::default(),
            path: config_path,
            found: false,
        })
    }
}
