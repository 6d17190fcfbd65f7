//! Task execution error types

use gamepilot_scheduler::Retryable;
use thiserror::Error;

use crate::types::TaskStatus;

/// Task execution errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TaskError {
    /// `execute()` called while the same instance is running
    #[error("任务已在运行中")]
    AlreadyRunning,

    /// The instance already reached a terminal status
    #[error("task already finished ({0})")]
    AlreadyFinished(TaskStatus),

    /// `can_execute()` returned false
    #[error("任务执行条件不满足")]
    PreconditionFailed,

    /// A step did not reach its expected state
    #[error("step '{step}' failed: {reason}")]
    StepFailed { step: String, reason: String },

    /// One attempt exceeded its time budget
    #[error("任务执行超时 ({0}ms)")]
    Timeout(u64),

    /// An action targeted a coordinate outside the safe area
    #[error("action rejected by safe area: {0}")]
    SafetyRejected(String),

    /// Dispatch was halted underneath the task
    #[error("input dispatch unavailable: {0}")]
    DispatchHalted(String),

    #[error("任务已取消")]
    Cancelled,

    /// Manager lookup for a name nobody registered
    #[error("no task executor registered as '{0}'")]
    NotRegistered(String),

    /// The task needs a collaborator its context does not carry
    #[error("missing capability: {0}")]
    MissingCapability(&'static str),

    #[error("template not found: {0}")]
    TemplateMissing(String),

    /// Script could not be parsed or failed validation
    #[error("invalid script: {0}")]
    InvalidScript(String),

    /// The manager no longer accepts work
    #[error("task manager is shut down")]
    ManagerClosed,

    /// Free-form failure raised by a task body
    #[error("{0}")]
    Body(String),
}

impl TaskError {
    pub fn body(message: impl Into<String>) -> Self {
        TaskError::Body(message.into())
    }

    pub fn step(step: impl Into<String>, reason: impl Into<String>) -> Self {
        TaskError::StepFailed {
            step: step.into(),
            reason: reason.into(),
        }
    }

    /// Only body and step failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TaskError::Body(_) | TaskError::StepFailed { .. })
    }
}

impl Retryable for TaskError {
    fn is_retryable(&self) -> bool {
        TaskError::is_retryable(self)
    }
}

impl From<action_dispatcher::DispatchError> for TaskError {
    fn from(err: action_dispatcher::DispatchError) -> Self {
        use action_dispatcher::DispatchError;
        match err {
            DispatchError::SafetyRejection { .. } => TaskError::SafetyRejected(err.to_string()),
            DispatchError::EmergencyStopped | DispatchError::Disabled => {
                TaskError::DispatchHalted(err.to_string())
            }
            other => TaskError::Body(other.to_string()),
        }
    }
}
