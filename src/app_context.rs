//! Application context and shared components
//!
//! Builds the perception-action stack once from a [`PilotConfig`] and hands
//! out the shared pieces: template store, detector, dispatcher and the task
//! manager.

use std::sync::Arc;

use action_dispatcher::{ActionDispatcher, InputInjector};
use match_engine::{FrameSource, MatchEngine};
use scene_detector::SceneDetector;
use task_runner::{Capabilities, Task, TaskExecutorManager, TaskRunner};
use template_store::{TemplateError, TemplateStore, TemplateWatcher};
use tracing::info;

use crate::config::PilotConfig;

pub struct PilotContext {
    config: Arc<PilotConfig>,
    store: Arc<TemplateStore>,
    engine: MatchEngine,
    source: Arc<dyn FrameSource>,
    detector: Arc<SceneDetector>,
    dispatcher: Arc<ActionDispatcher>,
    manager: Arc<TaskExecutorManager>,
    _watcher: Option<TemplateWatcher>,
}

impl PilotContext {
    /// Loads templates and wires every component. Hot reload and auto
    /// detection start here when configured, which needs a Tokio runtime.
    pub fn new(
        config: PilotConfig,
        source: Arc<dyn FrameSource>,
        injector: Arc<dyn InputInjector>,
    ) -> Result<Self, TemplateError> {
        let store = Arc::new(TemplateStore::new(config.store_options()));
        let loaded = store.load(&config.templates.root)?;
        let watcher = if config.templates.watch {
            Some(store.watch()?)
        } else {
            None
        };

        let engine = MatchEngine::new(config.engine_config());
        let detector = SceneDetector::new(
            Arc::clone(&store),
            engine.clone(),
            Arc::clone(&source),
            config.detector_config(),
        );
        let dispatcher = ActionDispatcher::new(injector, config.dispatcher_config());
        let manager = Arc::new(TaskExecutorManager::new(config.tasks.max_concurrent_tasks));

        info!(
            templates = loaded,
            auto_detection = config.detection.auto_detection,
            "pilot context ready"
        );
        Ok(Self {
            config: Arc::new(config),
            store,
            engine,
            source,
            detector,
            dispatcher,
            manager,
            _watcher: watcher,
        })
    }

    pub fn config(&self) -> &PilotConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<TemplateStore> {
        &self.store
    }

    pub fn engine(&self) -> &MatchEngine {
        &self.engine
    }

    pub fn source(&self) -> &Arc<dyn FrameSource> {
        &self.source
    }

    pub fn detector(&self) -> &Arc<SceneDetector> {
        &self.detector
    }

    pub fn dispatcher(&self) -> &Arc<ActionDispatcher> {
        &self.dispatcher
    }

    pub fn manager(&self) -> &Arc<TaskExecutorManager> {
        &self.manager
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities::default()
            .with_detector(Arc::clone(&self.detector))
            .with_dispatcher(Arc::clone(&self.dispatcher))
            .with_store(Arc::clone(&self.store))
            .with_source(Arc::clone(&self.source))
            .with_engine(self.engine.clone())
    }

    /// Wraps `task` in a runner configured from the `tasks` section and
    /// registers it with the manager under the task's name.
    pub fn register_task(&self, task: Arc<dyn Task>) -> Arc<TaskRunner> {
        let name = task.name().to_string();
        let runner = Arc::new(TaskRunner::new(
            task,
            self.config.runner_config(),
            self.capabilities(),
        ));
        self.manager.register_executor(name, Arc::clone(&runner));
        runner
    }

    /// Stops background work: detection, dispatch worker, running tasks.
    pub async fn shutdown(&self) {
        self.manager.shutdown();
        self.detector.shutdown().await;
        self.dispatcher.shutdown().await;
    }
}
