use gamepilot_core_types::PilotError;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum MatchError {
    /// The capture capability itself failed (as opposed to "nothing to capture").
    #[error("frame capture failed: {0}")]
    Capture(#[from] PilotError),

    #[error("frame decode failed: {0}")]
    Decode(String),

    /// A blocking matching job panicked or was cancelled.
    #[error("matching worker failed: {0}")]
    Worker(String),
}

impl MatchError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, MatchError::Capture(_) | MatchError::Worker(_))
    }
}
