use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use gamepilot_core_types::TaskId;
use gamepilot_event_bus::{EventBus, InMemoryBus};
use gamepilot_scheduler::{retry_with_backoff, RetryError, RetryOpt};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::errors::TaskError;
use crate::task::{Capabilities, Task, TaskContext};
use crate::types::{RunnerConfig, TaskEvent, TaskResult, TaskStatus};

const EVENT_CAPACITY: usize = 128;

#[derive(Default)]
struct RunState {
    status: TaskStatus,
    cancel: Option<CancellationToken>,
    result: Option<TaskResult>,
}

enum Outcome {
    Completed(Option<serde_json::Value>),
    Failed { message: String },
    Cancelled,
}

/// Drives one [`Task`] through `pending → running → terminal`.
///
/// A runner executes at most once: after a terminal status every further
/// `execute()` is rejected.
pub struct TaskRunner {
    id: TaskId,
    task: Arc<dyn Task>,
    config: RunnerConfig,
    capabilities: Capabilities,
    state: Mutex<RunState>,
    events: Arc<InMemoryBus<TaskEvent>>,
}

impl TaskRunner {
    pub fn new(task: Arc<dyn Task>, config: RunnerConfig, capabilities: Capabilities) -> Self {
        Self {
            id: TaskId::new(),
            task,
            config,
            capabilities,
            state: Mutex::new(RunState::default()),
            events: InMemoryBus::new(EVENT_CAPACITY),
        }
    }

    /// Shares an existing bus, e.g. one the manager fans in.
    pub fn with_events(mut self, events: Arc<InMemoryBus<TaskEvent>>) -> Self {
        self.events = events;
        self
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn name(&self) -> &str {
        self.task.name()
    }

    pub fn estimated_time(&self) -> Duration {
        self.task.estimated_time()
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn status(&self) -> TaskStatus {
        self.state.lock().status
    }

    pub fn last_result(&self) -> Option<TaskResult> {
        self.state.lock().result.clone()
    }

    pub fn events(&self) -> Arc<InMemoryBus<TaskEvent>> {
        Arc::clone(&self.events)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.events.subscribe()
    }

    /// Runs the task to a terminal status.
    ///
    /// Failures, timeouts and cancellation all resolve to `Ok(TaskResult)`
    /// with `success == false`; `Err` is reserved for calls that were
    /// rejected without touching the running execution.
    pub async fn execute(&self) -> Result<TaskResult, TaskError> {
        let token = {
            let mut state = self.state.lock();
            match state.status {
                TaskStatus::Running => return Err(TaskError::AlreadyRunning),
                status if status.is_terminal() => return Err(TaskError::AlreadyFinished(status)),
                _ => {}
            }
            let token = CancellationToken::new();
            state.status = TaskStatus::Running;
            state.cancel = Some(token.clone());
            token
        };

        info!(task = self.name(), task_id = %self.id.0, "task started");
        self.events.publish(TaskEvent::Started {
            task_id: self.id.clone(),
            task: self.name().to_string(),
            at: Utc::now(),
        });

        let started = Instant::now();
        let errors = Mutex::new(Vec::new());
        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => Outcome::Cancelled,
            outcome = self.run(&token, &errors) => outcome,
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;
        Ok(self.finish(outcome, elapsed_ms, errors.into_inner()))
    }

    async fn run(&self, token: &CancellationToken, errors: &Mutex<Vec<String>>) -> Outcome {
        let ctx = TaskContext::new(
            self.id.clone(),
            token.clone(),
            self.capabilities.clone(),
            Arc::clone(&self.events),
        );

        if !self.task.can_execute(&ctx).await {
            let err = TaskError::PreconditionFailed;
            errors.lock().push(err.to_string());
            return Outcome::Failed {
                message: err.to_string(),
            };
        }

        let opt = RetryOpt::fixed(self.config.max_retries, self.config.retry_delay);
        let timeout = self.config.timeout;
        let ctx = &ctx;
        let outcome = retry_with_backoff(&opt, token, |attempt| async move {
            let result = self.attempt(ctx.for_attempt(attempt), timeout).await;
            if let Err(err) = &result {
                warn!(task = self.name(), attempt, error = %err, "task attempt failed");
                errors.lock().push(err.to_string());
                self.events.publish(TaskEvent::Error {
                    task_id: self.id.clone(),
                    attempt,
                    error: err.to_string(),
                });
            }
            result
        })
        .await;

        match outcome {
            Ok(data) => Outcome::Completed(data),
            Err(RetryError::Cancelled { .. }) => Outcome::Cancelled,
            Err(RetryError::Exhausted { last: err, .. }) | Err(RetryError::Fatal { error: err, .. }) => {
                let message = match err {
                    TaskError::Timeout(_) | TaskError::PreconditionFailed => err.to_string(),
                    TaskError::Cancelled => return Outcome::Cancelled,
                    other => format!("任务执行失败: {other}"),
                };
                Outcome::Failed { message }
            }
        }
    }

    /// One body invocation on its own Tokio task. On timeout the body is
    /// left running detached rather than aborted.
    async fn attempt(
        &self,
        ctx: TaskContext,
        timeout: Duration,
    ) -> Result<Option<serde_json::Value>, TaskError> {
        let task = Arc::clone(&self.task);
        let body = tokio::spawn(async move { task.execute_body(&ctx).await });
        match tokio::time::timeout(timeout, body).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(TaskError::body(format!("task body aborted: {join}"))),
            Err(_) => Err(TaskError::Timeout(timeout.as_millis() as u64)),
        }
    }

    fn finish(&self, outcome: Outcome, elapsed_ms: u64, errors: Vec<String>) -> TaskResult {
        let mut state = self.state.lock();
        state.cancel = None;

        // cancel() already moved the status and announced it.
        if state.status == TaskStatus::Cancelled {
            let result = TaskResult::cancelled(elapsed_ms, errors);
            state.result = Some(result.clone());
            return result;
        }

        let (status, result) = match outcome {
            Outcome::Completed(data) => (TaskStatus::Completed, TaskResult::completed(elapsed_ms, data)),
            Outcome::Failed { message } => (
                TaskStatus::Failed,
                TaskResult::failed(message, elapsed_ms, errors),
            ),
            Outcome::Cancelled => (TaskStatus::Cancelled, TaskResult::cancelled(elapsed_ms, errors)),
        };
        state.status = status;
        state.result = Some(result.clone());
        drop(state);

        let event = match status {
            TaskStatus::Completed => {
                info!(task = self.name(), elapsed_ms, "task completed");
                TaskEvent::Completed {
                    task_id: self.id.clone(),
                    result: result.clone(),
                }
            }
            TaskStatus::Cancelled => TaskEvent::Cancelled {
                task_id: self.id.clone(),
                task: self.name().to_string(),
            },
            _ => {
                warn!(task = self.name(), elapsed_ms, message = %result.message, "task failed");
                TaskEvent::Failed {
                    task_id: self.id.clone(),
                    result: result.clone(),
                }
            }
        };
        self.events.publish(event);
        result
    }

    /// Moves a running task to `Cancelled` at once; the pending `execute()`
    /// resolves without waiting for the body. No-op (`false`) otherwise.
    pub fn cancel(&self) -> bool {
        let mut state = self.state.lock();
        if state.status != TaskStatus::Running {
            return false;
        }
        state.status = TaskStatus::Cancelled;
        if let Some(token) = state.cancel.take() {
            token.cancel();
        }
        drop(state);

        info!(task = self.name(), task_id = %self.id.0, "task cancelled");
        self.events.publish(TaskEvent::Cancelled {
            task_id: self.id.clone(),
            task: self.name().to_string(),
        });
        true
    }
}
