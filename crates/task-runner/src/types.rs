use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use gamepilot_core_types::TaskId;
use serde::{Deserialize, Serialize};

/// Lifecycle of one runner. `Completed`, `Failed` and `Cancelled` are final.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of one `execute()` call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub success: bool,
    pub message: String,
    pub execution_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Error text of every failed attempt, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl TaskResult {
    pub fn completed(execution_time_ms: u64, data: Option<serde_json::Value>) -> Self {
        Self {
            success: true,
            message: "任务执行成功".to_string(),
            execution_time_ms,
            data,
            errors: Vec::new(),
        }
    }

    pub fn failed(message: impl Into<String>, execution_time_ms: u64, errors: Vec<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            execution_time_ms,
            data: None,
            errors,
        }
    }

    pub fn cancelled(execution_time_ms: u64, errors: Vec<String>) -> Self {
        Self::failed("任务已取消", execution_time_ms, errors)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TaskEvent {
    Started {
        task_id: TaskId,
        task: String,
        at: DateTime<Utc>,
    },
    StepStarted {
        task_id: TaskId,
        step: String,
        index: usize,
    },
    StepCompleted {
        task_id: TaskId,
        step: String,
        index: usize,
    },
    Completed {
        task_id: TaskId,
        result: TaskResult,
    },
    Failed {
        task_id: TaskId,
        result: TaskResult,
    },
    Cancelled {
        task_id: TaskId,
        task: String,
    },
    /// A single attempt failed; the task may still retry.
    Error {
        task_id: TaskId,
        attempt: u32,
        error: String,
    },
}

impl TaskEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TaskEvent::Started { .. } => "started",
            TaskEvent::StepStarted { .. } => "stepStarted",
            TaskEvent::StepCompleted { .. } => "stepCompleted",
            TaskEvent::Completed { .. } => "completed",
            TaskEvent::Failed { .. } => "failed",
            TaskEvent::Cancelled { .. } => "cancelled",
            TaskEvent::Error { .. } => "error",
        }
    }
}

/// Retry and timeout policy for one runner.
#[derive(Clone, Debug, PartialEq)]
pub struct RunnerConfig {
    /// Extra attempts after the first; `2` allows three body invocations.
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Budget for a single attempt.
    pub timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_delay: Duration::from_millis(1000),
            timeout: Duration::from_millis(300_000),
        }
    }
}
