//! Configuration management module
//!
//! One YAML document with a section per component. Every key has a default,
//! so an empty file (or no file at all) yields a runnable configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use action_dispatcher::{DispatcherConfig, Easing, SmoothMoveOptions};
use gamepilot_core_types::Rect;
use match_engine::MatchEngineConfig;
use scene_detector::DetectorConfig;
use serde::{Deserialize, Serialize};
use task_runner::RunnerConfig;
use template_store::{SceneKeyword, StoreOptions};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PilotConfig {
    pub templates: TemplatesConfig,
    pub detection: DetectionConfig,
    pub input: InputConfig,
    pub tasks: TasksConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplatesConfig {
    pub root: PathBuf,
    /// Reload the index when files under `root` change.
    pub watch: bool,
    pub scene_kind: String,
    pub extensions: Vec<String>,
    pub scene_keywords: Vec<SceneKeyword>,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        let store = StoreOptions::default();
        Self {
            root: PathBuf::from("templates"),
            watch: false,
            scene_kind: store.scene_kind,
            extensions: store.extensions,
            scene_keywords: store.scene_keywords,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub detection_interval_ms: u64,
    pub confidence_threshold: f64,
    pub confirmation_count: u32,
    pub auto_detection: bool,
    pub detection_timeout_ms: u64,
    pub corroboration_bonus: f64,
    pub history_size: usize,
    pub max_search_dim: u32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            detection_interval_ms: 1000,
            confidence_threshold: 0.8,
            confirmation_count: 2,
            auto_detection: false,
            detection_timeout_ms: 5000,
            corroboration_bonus: 0.05,
            history_size: 50,
            max_search_dim: 640,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothMoveConfig {
    pub duration_ms: u64,
    pub steps: u32,
    pub easing: Easing,
}

impl Default for SmoothMoveConfig {
    fn default() -> Self {
        Self {
            duration_ms: 300,
            steps: 15,
            easing: Easing::EaseInOut,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// `None` leaves coordinates unrestricted.
    pub safe_area: Option<Rect>,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub action_delay_ms: u64,
    pub smooth_move: SmoothMoveConfig,
    pub adaptive_pacing: bool,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            safe_area: None,
            max_retries: 2,
            retry_delay_ms: 100,
            action_delay_ms: 50,
            smooth_move: SmoothMoveConfig::default(),
            adaptive_pacing: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TasksConfig {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub timeout_ms: u64,
    pub max_concurrent_tasks: usize,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_delay_ms: 1000,
            timeout_ms: 300_000,
            max_concurrent_tasks: 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Also write logs to this file.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl PilotConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: PilotConfig = if text.trim().is_empty() {
            PilotConfig::default()
        } else {
            serde_yaml::from_str(text)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));
        let d = &self.detection;
        if !(0.0..=1.0).contains(&d.confidence_threshold) {
            return invalid("detection.confidence_threshold must be within [0, 1]");
        }
        if d.confirmation_count == 0 {
            return invalid("detection.confirmation_count must be at least 1");
        }
        if d.detection_interval_ms == 0 || d.detection_timeout_ms == 0 {
            return invalid("detection intervals and timeouts must be positive");
        }
        if !(0.0..=1.0).contains(&d.corroboration_bonus) {
            return invalid("detection.corroboration_bonus must be within [0, 1]");
        }
        if self.input.smooth_move.steps == 0 {
            return invalid("input.smooth_move.steps must be at least 1");
        }
        if self.input.safe_area.is_some_and(|area| area.is_empty()) {
            return invalid("input.safe_area must have a positive width and height");
        }
        if self.tasks.timeout_ms == 0 {
            return invalid("tasks.timeout_ms must be positive");
        }
        if self.tasks.max_concurrent_tasks == 0 {
            return invalid("tasks.max_concurrent_tasks must be at least 1");
        }
        if self.templates.extensions.is_empty() {
            return invalid("templates.extensions must list at least one extension");
        }
        Ok(())
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            scene_kind: self.templates.scene_kind.clone(),
            extensions: self.templates.extensions.clone(),
            scene_keywords: self.templates.scene_keywords.clone(),
        }
    }

    pub fn engine_config(&self) -> MatchEngineConfig {
        MatchEngineConfig {
            max_search_dim: self.detection.max_search_dim,
            ..MatchEngineConfig::default()
        }
    }

    pub fn detector_config(&self) -> DetectorConfig {
        let d = &self.detection;
        DetectorConfig {
            detection_interval: Duration::from_millis(d.detection_interval_ms),
            confidence_threshold: d.confidence_threshold,
            confirmation_count: d.confirmation_count,
            auto_detection: d.auto_detection,
            detection_timeout: Duration::from_millis(d.detection_timeout_ms),
            corroboration_bonus: d.corroboration_bonus,
            history_size: d.history_size,
        }
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        let input = &self.input;
        DispatcherConfig {
            safe_area: input.safe_area,
            max_retries: input.max_retries,
            retry_delay: Duration::from_millis(input.retry_delay_ms),
            action_delay: Duration::from_millis(input.action_delay_ms),
            smooth: SmoothMoveOptions {
                duration: Duration::from_millis(input.smooth_move.duration_ms),
                steps: input.smooth_move.steps,
                easing: input.smooth_move.easing,
            },
            adaptive_pacing: input.adaptive_pacing,
        }
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            max_retries: self.tasks.max_retries,
            retry_delay: Duration::from_millis(self.tasks.retry_delay_ms),
            timeout: Duration::from_millis(self.tasks.timeout_ms),
        }
    }
}
