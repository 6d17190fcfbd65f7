use std::path::{Path, PathBuf};
use std::sync::Arc;

use action_dispatcher::InputInjector;
use anyhow::{Context, Result};
use gamepilot_cli::{PilotConfig, PilotContext, TracingInjector};
use match_engine::{FrameSequence, FrameSource};

use super::output::OutputFormat;

pub struct CliContext {
    config: Arc<PilotConfig>,
    config_path: PathBuf,
    output: OutputFormat,
}

impl CliContext {
    pub fn new(config: PilotConfig, config_path: PathBuf, output: OutputFormat) -> Self {
        Self {
            config: Arc::new(config),
            config_path,
            output,
        }
    }

    pub fn config(&self) -> &PilotConfig {
        self.config.as_ref()
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn output(&self) -> OutputFormat {
        self.output
    }

    /// Builds a pilot context over `source` with the dry-run injector.
    /// `adjust` tweaks a copy of the configuration for this command only.
    pub fn pilot(
        &self,
        source: Arc<dyn FrameSource>,
        adjust: impl FnOnce(&mut PilotConfig),
    ) -> Result<PilotContext> {
        let mut config = self.config().clone();
        adjust(&mut config);
        let injector: Arc<dyn InputInjector> = Arc::new(TracingInjector::new());
        PilotContext::new(config, source, injector).context("Failed to initialise pilot context")
    }

    /// Pilot context without frames, for commands that only need templates.
    pub fn offline_pilot(&self) -> Result<PilotContext> {
        self.pilot(Arc::new(FrameSequence::new(Vec::new())), |config| {
            config.templates.watch = false;
            config.detection.auto_detection = false;
        })
    }
}

/// Parses `x,y,width,height`.
pub fn parse_region(raw: &str) -> Result<gamepilot_core_types::Rect, String> {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    let [x, y, w, h] = parts.as_slice() else {
        return Err(format!("expected x,y,width,height, got '{raw}'"));
    };
    let num = |s: &str| s.parse::<i64>().map_err(|e| format!("'{s}': {e}"));
    let (x, y, w, h) = (num(x)?, num(y)?, num(w)?, num(h)?);
    if w <= 0 || h <= 0 {
        return Err("region width and height must be positive".to_string());
    }
    Ok(gamepilot_core_types::Rect::new(
        i32::try_from(x).map_err(|e| e.to_string())?,
        i32::try_from(y).map_err(|e| e.to_string())?,
        u32::try_from(w).map_err(|e| e.to_string())?,
        u32::try_from(h).map_err(|e| e.to_string())?,
    ))
}

/// Parses `r,g,b`.
pub fn parse_rgb(raw: &str) -> Result<[u8; 3], String> {
    let parts = raw
        .split(',')
        .map(|s| s.trim().parse::<u8>().map_err(|e| format!("'{s}': {e}")))
        .collect::<Result<Vec<_>, _>>()?;
    <[u8; 3]>::try_from(parts).map_err(|_| format!("expected r,g,b, got '{raw}'"))
}
