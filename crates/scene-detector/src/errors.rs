use std::time::Duration;

use gamepilot_core_types::PilotError;
use match_engine::MatchError;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum DetectorError {
    /// Capture capability failed for this poll.
    #[error("capture failed: {0}")]
    Capture(#[from] PilotError),

    #[error("matching failed: {0}")]
    Match(#[from] MatchError),

    #[error("detection exceeded {0:?}")]
    Timeout(Duration),

    /// The detector was destroyed and cannot be restarted.
    #[error("scene detector destroyed")]
    Destroyed,
}
