//! Data-driven step sequences.
//!
//! A script is a list of steps. Each step may wait for a scene, resolve a
//! target (a template located on a fresh capture, or a fixed point), perform
//! one action through the dispatcher and then wait for the scene the action
//! should lead to. Steps retry on their own budget before the failure
//! reaches the runner.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use action_dispatcher::{ActionKind, ActionRequest, MouseButton, Priority};
use async_trait::async_trait;
use gamepilot_core_types::{Point, Rect, SceneId};
use gamepilot_scheduler::{retry_with_backoff, RetryError, RetryOpt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::TaskError;
use crate::probe::Precondition;
use crate::task::{Task, TaskContext};

const DEFAULT_THRESHOLD: f64 = 0.8;

fn default_attempts() -> u32 {
    1
}

fn default_scene_timeout_ms() -> u64 {
    5_000
}

fn default_retry_delay_ms() -> u64 {
    500
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub estimated_time_ms: Option<u64>,
    pub steps: Vec<ScriptStep>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScriptStep {
    pub name: String,
    /// Scene that must be current before the step acts.
    #[serde(default)]
    pub require_scene: Option<SceneId>,
    #[serde(default)]
    pub target: Option<StepTarget>,
    pub action: StepAction,
    /// Scene the action is expected to lead to.
    #[serde(default)]
    pub expect_scene: Option<SceneId>,
    #[serde(default = "default_scene_timeout_ms")]
    pub scene_timeout_ms: u64,
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

/// Where a pointer action lands.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepTarget {
    /// `template` is `"<type>/<name>"`, e.g. `buttons/start`.
    Template {
        template: String,
        #[serde(default)]
        threshold: Option<f64>,
        #[serde(default)]
        region: Option<Rect>,
    },
    Point(Point),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepAction {
    Click {
        #[serde(default)]
        button: MouseButton,
    },
    Move {
        #[serde(default)]
        smooth: bool,
    },
    Scroll {
        delta: i32,
    },
    Key {
        code: String,
    },
    Type {
        text: String,
    },
    Wait {
        ms: u64,
    },
}

impl StepAction {
    fn needs_position(&self) -> bool {
        matches!(
            self,
            StepAction::Click { .. } | StepAction::Move { .. } | StepAction::Scroll { .. }
        )
    }

    fn to_kind(&self, at: Option<Point>) -> Option<ActionKind> {
        match (self, at) {
            (StepAction::Click { button }, Some(at)) => Some(ActionKind::Click { at, button: *button }),
            (StepAction::Move { smooth }, Some(to)) => Some(ActionKind::Move { to, smooth: *smooth }),
            (StepAction::Scroll { delta }, Some(at)) => Some(ActionKind::Scroll { at, delta: *delta }),
            (StepAction::Key { code }, _) => Some(ActionKind::Key { code: code.clone() }),
            (StepAction::Type { text }, _) => Some(ActionKind::Type { text: text.clone() }),
            _ => None,
        }
    }
}

fn split_template_ref(reference: &str) -> Option<(&str, &str)> {
    reference
        .split_once('/')
        .filter(|(kind, name)| !kind.is_empty() && !name.is_empty())
}

impl Script {
    pub fn from_yaml_str(text: &str) -> Result<Self, TaskError> {
        let script: Script =
            serde_yaml::from_str(text).map_err(|e| TaskError::InvalidScript(e.to_string()))?;
        script.validate()?;
        Ok(script)
    }

    pub fn validate(&self) -> Result<(), TaskError> {
        if self.steps.is_empty() {
            return Err(TaskError::InvalidScript(format!(
                "script '{}' has no steps",
                self.name
            )));
        }
        for step in &self.steps {
            let invalid = |reason: &str| {
                Err(TaskError::InvalidScript(format!(
                    "step '{}': {reason}",
                    step.name
                )))
            };
            if step.attempts == 0 {
                return invalid("attempts must be at least 1");
            }
            if step.action.needs_position() && step.target.is_none() {
                return invalid("action needs a target");
            }
            if let Some(StepTarget::Template {
                template, threshold, ..
            }) = &step.target
            {
                if split_template_ref(template).is_none() {
                    return invalid("template must be '<type>/<name>'");
                }
                if threshold.is_some_and(|t| !(0.0..=1.0).contains(&t)) {
                    return invalid("threshold must be within [0, 1]");
                }
            }
        }
        Ok(())
    }
}

/// A [`Task`] backed by a [`Script`].
pub struct ScriptedTask {
    script: Script,
    preconditions: Vec<Arc<dyn Precondition>>,
}

impl ScriptedTask {
    pub fn new(script: Script) -> Result<Self, TaskError> {
        script.validate()?;
        Ok(Self {
            script,
            preconditions: Vec::new(),
        })
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, TaskError> {
        Self::new(Script::from_yaml_str(text)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, TaskError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| TaskError::InvalidScript(format!("{}: {e}", path.display())))?;
        Self::from_yaml_str(&text)
    }

    pub fn with_precondition(mut self, precondition: Arc<dyn Precondition>) -> Self {
        self.preconditions.push(precondition);
        self
    }

    pub fn script(&self) -> &Script {
        &self.script
    }

    async fn run_step(&self, ctx: &TaskContext, step: &ScriptStep) -> Result<(), TaskError> {
        if let Some(scene) = &step.require_scene {
            self.await_scene(ctx, step, scene, "required").await?;
        }

        let at = match &step.target {
            Some(target) => Some(self.resolve(ctx, step, target).await?),
            None => None,
        };

        match (&step.action, step.action.to_kind(at)) {
            (StepAction::Wait { ms }, _) => {
                tokio::select! {
                    _ = ctx.cancel.cancelled() => return Err(TaskError::Cancelled),
                    _ = tokio::time::sleep(Duration::from_millis(*ms)) => {}
                }
            }
            (_, Some(kind)) => {
                let dispatcher = ctx.dispatcher()?;
                let request = ActionRequest::new(kind)
                    .with_priority(Priority::High)
                    .with_retries(0);
                let report = dispatcher.submit_and_wait(request).await?;
                debug!(step = %step.name, action_id = %report.action_id, latency_ms = report.latency_ms, "step action dispatched");
            }
            (_, None) => return Err(TaskError::step(&step.name, "action has no target position")),
        }

        if let Some(scene) = &step.expect_scene {
            self.await_scene(ctx, step, scene, "expected").await?;
        }
        Ok(())
    }

    async fn await_scene(
        &self,
        ctx: &TaskContext,
        step: &ScriptStep,
        scene: &SceneId,
        role: &str,
    ) -> Result<(), TaskError> {
        let detector = ctx.detector()?;
        let timeout = Duration::from_millis(step.scene_timeout_ms);
        if detector.wait_for_scene_until(scene, timeout, &ctx.cancel).await {
            return Ok(());
        }
        if ctx.is_cancelled() {
            return Err(TaskError::Cancelled);
        }
        Err(TaskError::step(
            &step.name,
            format!(
                "{role} scene '{scene}' not reached within {}ms (current '{}')",
                step.scene_timeout_ms,
                detector.current_scene()
            ),
        ))
    }

    async fn resolve(
        &self,
        ctx: &TaskContext,
        step: &ScriptStep,
        target: &StepTarget,
    ) -> Result<Point, TaskError> {
        let (reference, threshold, region) = match target {
            StepTarget::Point(point) => return Ok(*point),
            StepTarget::Template {
                template,
                threshold,
                region,
            } => (template, threshold.unwrap_or(DEFAULT_THRESHOLD), *region),
        };
        let (kind, name) = split_template_ref(reference)
            .ok_or_else(|| TaskError::TemplateMissing(reference.clone()))?;
        let template = ctx
            .store()?
            .get(kind, name)
            .ok_or_else(|| TaskError::TemplateMissing(reference.clone()))?;
        let source = ctx.frame_source()?;

        let found = ctx
            .engine()
            .locate(&**source, template, threshold, region)
            .await
            .map_err(|e| TaskError::step(&step.name, e.to_string()))?;
        match found.position {
            Some(position) if found.found => Ok(position),
            _ => Err(TaskError::step(
                &step.name,
                format!(
                    "template '{reference}' not found (confidence {:.3})",
                    found.confidence
                ),
            )),
        }
    }
}

#[async_trait]
impl Task for ScriptedTask {
    fn name(&self) -> &str {
        &self.script.name
    }

    async fn can_execute(&self, ctx: &TaskContext) -> bool {
        for precondition in &self.preconditions {
            if !precondition.check(ctx).await {
                info!(task = %self.script.name, check = %precondition.describe(), "precondition not met");
                return false;
            }
        }
        true
    }

    fn estimated_time(&self) -> Duration {
        let ms = self.script.estimated_time_ms.unwrap_or_else(|| {
            self.script
                .steps
                .iter()
                .map(|step| match step.action {
                    StepAction::Wait { ms } => ms,
                    _ => 1_000,
                })
                .sum()
        });
        Duration::from_millis(ms)
    }

    async fn execute_body(&self, ctx: &TaskContext) -> Result<Option<serde_json::Value>, TaskError> {
        for (index, step) in self.script.steps.iter().enumerate() {
            ctx.step_started(&step.name, index);
            let opt = RetryOpt::fixed(
                step.attempts.saturating_sub(1),
                Duration::from_millis(step.retry_delay_ms),
            );
            retry_with_backoff(&opt, &ctx.cancel, |_| self.run_step(ctx, step))
                .await
                .map_err(|err| match err {
                    RetryError::Cancelled { .. } => TaskError::Cancelled,
                    other => other.into_inner().unwrap_or(TaskError::Cancelled),
                })?;
            ctx.step_completed(&step.name, index);
        }
        Ok(Some(serde_json::json!({
            "script": self.script.name,
            "steps": self.script.steps.len(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use action_dispatcher::{ActionDispatcher, DispatcherConfig, MemoryInjector, PointerAction};
    use gamepilot_core_types::{PilotError, TaskId};
    use gamepilot_event_bus::InMemoryBus;
    use image::{GrayImage, Luma, Rgba, RgbaImage};
    use match_engine::{Frame, FrameSequence, FrameSource, MatchEngine};
    use scene_detector::{DetectorConfig, SceneDetector};
    use template_store::TemplateStore;
    use tokio_util::sync::CancellationToken;

    use crate::runner::TaskRunner;
    use crate::task::Capabilities;
    use crate::types::{RunnerConfig, TaskStatus};

    const SCRIPT: &str = r#"
name: daily-commission
steps:
  - name: open-menu
    action: { type: key, code: Escape }
    expect_scene: main_menu
  - name: press-start
    require_scene: main_menu
    target: { template: buttons/start, threshold: 0.9 }
    action: { type: click }
    attempts: 3
  - name: settle
    action: { type: wait, ms: 250 }
  - name: confirm
    target: { x: 400, y: 300 }
    action: { type: click, button: right }
"#;

    #[test]
    fn parses_targets_and_defaults() {
        let script = Script::from_yaml_str(SCRIPT).unwrap();
        assert_eq!(script.steps.len(), 4);
        assert_eq!(script.steps[0].attempts, 1);
        assert_eq!(script.steps[0].expect_scene, Some(SceneId::from("main_menu")));
        assert_eq!(
            script.steps[1].target,
            Some(StepTarget::Template {
                template: "buttons/start".into(),
                threshold: Some(0.9),
                region: None,
            })
        );
        assert_eq!(script.steps[3].target, Some(StepTarget::Point(Point::new(400, 300))));
        assert_eq!(
            script.steps[3].action,
            StepAction::Click {
                button: MouseButton::Right
            }
        );
    }

    #[test]
    fn rejects_pointer_actions_without_target() {
        let err = Script::from_yaml_str(
            "name: bad\nsteps:\n  - name: click\n    action: { type: click }\n",
        )
        .unwrap_err();
        assert!(matches!(err, TaskError::InvalidScript(msg) if msg.contains("needs a target")));

        let err = Script::from_yaml_str("name: empty\nsteps: []\n").unwrap_err();
        assert!(matches!(err, TaskError::InvalidScript(_)));
    }

    #[test]
    fn estimated_time_sums_steps() {
        let task = ScriptedTask::from_yaml_str(SCRIPT).unwrap();
        assert_eq!(task.estimated_time(), Duration::from_millis(3_250));
    }

    const BUTTON: u32 = 24;

    fn checker(x: u32, y: u32) -> u8 {
        if (x / 4 + y / 4) % 2 == 0 { 255 } else { 0 }
    }

    fn blank_frame() -> Frame {
        Frame::from_rgba(RgbaImage::from_pixel(160, 120, Rgba([128, 128, 128, 255])))
    }

    fn button_frame() -> Frame {
        let mut img = RgbaImage::from_pixel(160, 120, Rgba([128, 128, 128, 255]));
        for y in 0..BUTTON {
            for x in 0..BUTTON {
                let v = checker(x, y);
                img.put_pixel(40 + x, 30 + y, Rgba([v, v, v, 255]));
            }
        }
        Frame::from_rgba(img)
    }

    /// Counts captures so step attempts can be observed.
    struct CountingSource {
        frames: FrameSequence,
        captures: AtomicU32,
    }

    #[async_trait]
    impl FrameSource for CountingSource {
        async fn capture_frame(&self) -> Result<Option<Frame>, PilotError> {
            self.captures.fetch_add(1, Ordering::SeqCst);
            self.frames.capture_frame().await
        }
    }

    struct Rig {
        _dir: tempfile::TempDir,
        source: Arc<CountingSource>,
        injector: Arc<MemoryInjector>,
        capabilities: Capabilities,
    }

    fn rig(frames: Vec<Frame>) -> Rig {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buttons/start.png");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        GrayImage::from_fn(BUTTON, BUTTON, |x, y| Luma([checker(x, y)]))
            .save(&path)
            .unwrap();
        let store = Arc::new(TemplateStore::default());
        store.load(dir.path()).unwrap();

        let source = Arc::new(CountingSource {
            frames: FrameSequence::new(frames),
            captures: AtomicU32::new(0),
        });
        let injector = Arc::new(MemoryInjector::new());
        let dispatcher = ActionDispatcher::new(
            injector.clone(),
            DispatcherConfig {
                action_delay: Duration::ZERO,
                ..DispatcherConfig::default()
            },
        );
        let frame_source: Arc<dyn FrameSource> = source.clone();
        let detector = SceneDetector::new(
            store.clone(),
            MatchEngine::default(),
            frame_source.clone(),
            DetectorConfig::default(),
        );
        let capabilities = Capabilities::default()
            .with_store(store)
            .with_source(frame_source)
            .with_dispatcher(dispatcher)
            .with_detector(detector);
        Rig {
            _dir: dir,
            source,
            injector,
            capabilities,
        }
    }

    fn single_attempt_runner(task: ScriptedTask, capabilities: Capabilities) -> TaskRunner {
        let config = RunnerConfig {
            max_retries: 0,
            retry_delay: Duration::from_millis(1),
            timeout: Duration::from_secs(10),
        };
        TaskRunner::new(Arc::new(task), config, capabilities)
    }

    const PRESS_START: &str = r#"
name: press-start
steps:
  - name: press
    target: { template: buttons/start }
    action: { type: click }
    attempts: 3
    retry_delay_ms: 5
"#;

    #[tokio::test]
    async fn step_retries_lookup_until_the_button_appears() {
        let rig = rig(vec![blank_frame(), blank_frame(), button_frame()]);
        let runner = single_attempt_runner(
            ScriptedTask::from_yaml_str(PRESS_START).unwrap(),
            rig.capabilities.clone(),
        );

        let result = runner.execute().await.unwrap();
        assert!(result.success, "{:?}", result.errors);
        assert_eq!(rig.source.captures.load(Ordering::SeqCst), 3);
        let clicks: Vec<Point> = rig
            .injector
            .pointer_events()
            .iter()
            .filter(|event| matches!(event.action, PointerAction::Click(_)))
            .map(|event| event.position)
            .collect();
        assert_eq!(clicks, vec![Point::new(52, 42)]);
    }

    #[tokio::test]
    async fn step_gives_up_after_its_own_attempts() {
        let rig = rig(vec![blank_frame()]);
        let runner = single_attempt_runner(
            ScriptedTask::from_yaml_str(PRESS_START).unwrap(),
            rig.capabilities.clone(),
        );

        let result = runner.execute().await.unwrap();
        assert!(!result.success);
        assert_eq!(runner.status(), TaskStatus::Failed);
        assert_eq!(rig.source.captures.load(Ordering::SeqCst), 3);
        assert!(result.message.contains("not found"), "{}", result.message);
        assert!(rig.injector.pointer_events().is_empty());
    }

    #[tokio::test]
    async fn cancellation_ends_a_scene_wait() {
        let rig = rig(vec![blank_frame()]);
        let task = Arc::new(
            ScriptedTask::from_yaml_str(
                r#"
name: wait-for-battle
steps:
  - name: enter
    require_scene: battle
    scene_timeout_ms: 30000
    action: { type: key, code: Space }
"#,
            )
            .unwrap(),
        );
        let cancel = CancellationToken::new();
        let ctx = TaskContext::new(
            TaskId::new(),
            cancel.clone(),
            rig.capabilities.clone(),
            InMemoryBus::new(8),
        );
        let body = {
            let task = task.clone();
            tokio::spawn(async move { task.execute_body(&ctx).await })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!body.is_finished());
        cancel.cancel();
        let outcome = tokio::time::timeout(Duration::from_secs(2), body)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, Err(TaskError::Cancelled));
        assert!(rig.injector.key_events().is_empty());
    }

    #[tokio::test]
    async fn halted_dispatch_fails_the_step_at_once() {
        let rig = rig(vec![blank_frame()]);
        rig.capabilities.dispatcher.as_ref().unwrap().emergency_stop();
        let runner = single_attempt_runner(
            ScriptedTask::from_yaml_str(
                "name: escape\nsteps:\n  - name: press\n    action: { type: key, code: Escape }\n",
            )
            .unwrap(),
            rig.capabilities.clone(),
        );

        let result = tokio::time::timeout(Duration::from_secs(2), runner.execute())
            .await
            .unwrap()
            .unwrap();
        assert!(!result.success);
        assert!(result.message.contains("input dispatch unavailable"), "{}", result.message);
        assert!(rig.injector.key_events().is_empty());
    }
}
