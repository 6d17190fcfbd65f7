use std::time::Duration;

use chrono::{DateTime, Utc};
use gamepilot_core_types::SceneId;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq)]
pub struct DetectorConfig {
    /// Time between polls when auto-detection runs.
    pub detection_interval: Duration,
    /// Minimum confidence for a scene template to count as seen.
    pub confidence_threshold: f64,
    /// Consecutive agreeing polls before a scene becomes current.
    pub confirmation_count: u32,
    /// Start ticking as soon as the detector is built.
    pub auto_detection: bool,
    /// Budget for one capture and match pass.
    pub detection_timeout: Duration,
    /// Added per corroborating template found for the best scene.
    pub corroboration_bonus: f64,
    /// Raw results kept for inspection.
    pub history_size: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            detection_interval: Duration::from_millis(1000),
            confidence_threshold: 0.8,
            confirmation_count: 2,
            auto_detection: false,
            detection_timeout: Duration::from_millis(5000),
            corroboration_bonus: 0.05,
            history_size: 50,
        }
    }
}

/// Raw outcome of a single poll. Never mutated after creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub scene: SceneId,
    pub confidence: f64,
    pub matched_templates: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub detection_time_ms: u64,
}

impl DetectionResult {
    pub fn unknown() -> Self {
        Self {
            scene: SceneId::unknown(),
            confidence: 0.0,
            matched_templates: Vec::new(),
            timestamp: Utc::now(),
            detection_time_ms: 0,
        }
    }

    /// Result recorded for a manual override.
    pub fn manual(scene: SceneId) -> Self {
        Self {
            scene,
            confidence: 1.0,
            matched_templates: Vec::new(),
            timestamp: Utc::now(),
            detection_time_ms: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneChangeEvent {
    pub previous_scene: SceneId,
    pub current_scene: SceneId,
    pub detection_result: DetectionResult,
    pub timestamp: DateTime<Utc>,
}

/// The authoritative scene, as seen by waiters.
#[derive(Clone, Debug, PartialEq)]
pub struct ConfirmedScene {
    pub scene: SceneId,
    pub confidence: f64,
    pub since: DateTime<Utc>,
}

impl Default for ConfirmedScene {
    fn default() -> Self {
        Self {
            scene: SceneId::unknown(),
            confidence: 0.0,
            since: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectorStats {
    pub polls: u64,
    pub detection_errors: u64,
    pub scene_changes: u64,
    pub avg_detection_ms: f64,
    pub current_scene: SceneId,
    pub running: bool,
}
