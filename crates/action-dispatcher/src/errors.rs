use gamepilot_core_types::{PilotError, Point, Rect};
use gamepilot_scheduler::Retryable;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DispatchError {
    /// Coordinate outside the permitted envelope; the action is dropped.
    #[error("coordinate {point} outside safe area {area}")]
    SafetyRejection { point: Point, area: Rect },

    /// Dispatch is switched off.
    #[error("dispatcher disabled")]
    Disabled,

    /// Emergency stop is active or fired mid-action.
    #[error("emergency stop active")]
    EmergencyStopped,

    /// The OS-level injection capability failed.
    #[error("input injection failed: {0}")]
    Injection(#[from] PilotError),

    /// Malformed action parameters.
    #[error("invalid action: {0}")]
    InvalidAction(String),

    /// The action left the queue without running (removed, cleared or the
    /// dispatcher shut down).
    #[error("action dropped before dispatch")]
    Dropped,
}

impl DispatchError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, DispatchError::Injection(_))
    }

    /// Get error severity level (0=low, 1=medium, 2=high, 3=critical)
    pub fn severity(&self) -> u8 {
        match self {
            DispatchError::EmergencyStopped => 3,
            DispatchError::SafetyRejection { .. } | DispatchError::Injection(_) => 2,
            DispatchError::InvalidAction(_) | DispatchError::Disabled => 1,
            DispatchError::Dropped => 0,
        }
    }
}

impl Retryable for DispatchError {
    fn is_retryable(&self) -> bool {
        DispatchError::is_retryable(self)
    }
}
