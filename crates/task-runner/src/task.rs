use std::sync::Arc;
use std::time::Duration;

use action_dispatcher::ActionDispatcher;
use async_trait::async_trait;
use gamepilot_core_types::TaskId;
use gamepilot_event_bus::{EventBus, InMemoryBus};
use match_engine::{FrameSource, MatchEngine};
use scene_detector::SceneDetector;
use template_store::TemplateStore;
use tokio_util::sync::CancellationToken;

use crate::errors::TaskError;
use crate::types::TaskEvent;

/// A unit of work the runner can drive.
///
/// `execute_body` may be invoked several times (one call per attempt) and
/// may be abandoned mid-flight on timeout or cancellation; bodies that want
/// to stop early should watch [`TaskContext::cancel`].
#[async_trait]
pub trait Task: Send + Sync {
    fn name(&self) -> &str;

    /// Precondition gate evaluated once per `execute()`; `false` fails the
    /// task without retrying.
    async fn can_execute(&self, _ctx: &TaskContext) -> bool {
        true
    }

    fn estimated_time(&self) -> Duration;

    async fn execute_body(&self, ctx: &TaskContext) -> Result<Option<serde_json::Value>, TaskError>;
}

/// Collaborators a task may reach for. Every field is optional so plain
/// tasks can run without a perception stack.
#[derive(Clone, Default)]
pub struct Capabilities {
    pub detector: Option<Arc<SceneDetector>>,
    pub dispatcher: Option<Arc<ActionDispatcher>>,
    pub store: Option<Arc<TemplateStore>>,
    pub source: Option<Arc<dyn FrameSource>>,
    pub engine: MatchEngine,
}

impl Capabilities {
    pub fn with_detector(mut self, detector: Arc<SceneDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<ActionDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn with_store(mut self, store: Arc<TemplateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_source(mut self, source: Arc<dyn FrameSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_engine(mut self, engine: MatchEngine) -> Self {
        self.engine = engine;
        self
    }
}

/// Per-attempt view handed to a task body.
#[derive(Clone)]
pub struct TaskContext {
    pub task_id: TaskId,
    pub attempt: u32,
    pub cancel: CancellationToken,
    capabilities: Capabilities,
    events: Arc<InMemoryBus<TaskEvent>>,
}

impl TaskContext {
    pub(crate) fn new(
        task_id: TaskId,
        cancel: CancellationToken,
        capabilities: Capabilities,
        events: Arc<InMemoryBus<TaskEvent>>,
    ) -> Self {
        Self {
            task_id,
            attempt: 0,
            cancel,
            capabilities,
            events,
        }
    }

    pub(crate) fn for_attempt(&self, attempt: u32) -> Self {
        Self {
            attempt,
            ..self.clone()
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn detector(&self) -> Result<&Arc<SceneDetector>, TaskError> {
        self.capabilities
            .detector
            .as_ref()
            .ok_or(TaskError::MissingCapability("scene detector"))
    }

    pub fn dispatcher(&self) -> Result<&Arc<ActionDispatcher>, TaskError> {
        self.capabilities
            .dispatcher
            .as_ref()
            .ok_or(TaskError::MissingCapability("action dispatcher"))
    }

    pub fn store(&self) -> Result<&Arc<TemplateStore>, TaskError> {
        self.capabilities
            .store
            .as_ref()
            .ok_or(TaskError::MissingCapability("template store"))
    }

    pub fn frame_source(&self) -> Result<&Arc<dyn FrameSource>, TaskError> {
        self.capabilities
            .source
            .as_ref()
            .ok_or(TaskError::MissingCapability("frame source"))
    }

    pub fn engine(&self) -> &MatchEngine {
        &self.capabilities.engine
    }

    pub fn step_started(&self, step: &str, index: usize) {
        self.events.publish(TaskEvent::StepStarted {
            task_id: self.task_id.clone(),
            step: step.to_string(),
            index,
        });
    }

    pub fn step_completed(&self, step: &str, index: usize) {
        self.events.publish(TaskEvent::StepCompleted {
            task_id: self.task_id.clone(),
            step: step.to_string(),
            index,
        });
    }
}
