use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use gamepilot_core_types::{ActionId, Point};
use gamepilot_event_bus::{EventBus, InMemoryBus};
use gamepilot_scheduler::{retry_with_backoff, PriorityLane, RetryError, RetryOpt};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::easing::waypoints;
use crate::errors::DispatchError;
use crate::injector::{InputInjector, KeyEvent, PointerAction, PointerEvent};
use crate::metrics::{PerformanceCounters, PerformanceSnapshot};
use crate::models::{
    ActionKind, ActionReport, ActionRequest, DispatchEvent, DispatcherConfig, MouseButton,
    QueuedAction, RecordedAction, SmoothMoveOptions, SmoothMoveReport,
};
use crate::recorder::Recorder;
use crate::safety;

const EVENT_CAPACITY: usize = 256;
/// Upper bound on how long an idle worker sleeps before re-checking state.
const IDLE_RECHECK: Duration = Duration::from_millis(250);

type Waiter = oneshot::Sender<Result<ActionReport, DispatchError>>;

struct Worker {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Prioritized input dispatcher.
///
/// Only one action touches the injector at a time; queued actions, direct
/// executions, smooth moves and replays all serialize on the same lock.
pub struct ActionDispatcher {
    injector: Arc<dyn InputInjector>,
    config: RwLock<DispatcherConfig>,
    queue: Mutex<PriorityLane<QueuedAction>>,
    waiters: Mutex<HashMap<ActionId, Waiter>>,
    enabled: AtomicBool,
    paused: AtomicBool,
    stopped: AtomicBool,
    emergency: Mutex<CancellationToken>,
    wake: Arc<Notify>,
    worker: Mutex<Option<Worker>>,
    dispatch_lock: tokio::sync::Mutex<()>,
    pointer: Mutex<Option<Point>>,
    recorder: Mutex<Recorder>,
    counters: Mutex<PerformanceCounters>,
    events: Arc<InMemoryBus<DispatchEvent>>,
}

impl ActionDispatcher {
    pub fn new(injector: Arc<dyn InputInjector>, config: DispatcherConfig) -> Arc<Self> {
        Arc::new(Self {
            injector,
            config: RwLock::new(config),
            queue: Mutex::new(PriorityLane::new()),
            waiters: Mutex::new(HashMap::new()),
            enabled: AtomicBool::new(true),
            paused: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            emergency: Mutex::new(CancellationToken::new()),
            wake: Arc::new(Notify::new()),
            worker: Mutex::new(None),
            dispatch_lock: tokio::sync::Mutex::new(()),
            pointer: Mutex::new(None),
            recorder: Mutex::new(Recorder::default()),
            counters: Mutex::new(PerformanceCounters::default()),
            events: InMemoryBus::new(EVENT_CAPACITY),
        })
    }

    pub fn config(&self) -> DispatcherConfig {
        self.config.read().clone()
    }

    pub fn update_config(&self, config: DispatcherConfig) {
        *self.config.write() = config;
    }

    pub fn events(&self) -> Arc<InMemoryBus<DispatchEvent>> {
        Arc::clone(&self.events)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.events.subscribe()
    }

    // ---- queue --------------------------------------------------------

    /// Enqueues an action and returns its id. Allowed while paused.
    pub fn add_to_queue(&self, request: impl Into<ActionRequest>) -> Result<ActionId, DispatchError> {
        self.enqueue(request.into(), None)
    }

    fn enqueue(&self, request: ActionRequest, waiter: Option<Waiter>) -> Result<ActionId, DispatchError> {
        validate_params(&request.kind)?;
        let config = self.config.read().clone();
        let action = QueuedAction {
            id: ActionId::new(),
            kind: request.kind,
            priority: request.priority,
            timestamp: Utc::now(),
            max_retries: request.max_retries.unwrap_or(config.max_retries),
            retry_delay: request.retry_delay.unwrap_or(config.retry_delay),
            attempts: 0,
        };
        let id = action.id.clone();
        let priority = action.priority;
        if let Some(waiter) = waiter {
            // Checked under the waiter lock so a concurrent halt either sees
            // this waiter or this call sees the halt.
            let mut waiters = self.waiters.lock();
            self.gate()?;
            waiters.insert(id.clone(), waiter);
        }
        self.queue.lock().push(priority, action);
        debug!(action_id = %id, priority = %priority, "action queued");
        self.events.publish(DispatchEvent::Queued {
            id: id.clone(),
            priority,
        });
        self.wake.notify_one();
        Ok(id)
    }

    /// Drops a queued action. Returns `false` if it already left the queue.
    pub fn remove_from_queue(&self, id: &ActionId) -> bool {
        let removed = self.queue.lock().remove_where(|action| &action.id == id);
        // Dropping the waiter resolves `submit_and_wait` with `Dropped`.
        self.waiters.lock().remove(id);
        removed.is_some()
    }

    /// Empties the queue and returns how many actions were dropped.
    pub fn clear_queue(&self) -> usize {
        let dropped = self.queue.lock().clear();
        let mut waiters = self.waiters.lock();
        for entry in &dropped {
            waiters.remove(&entry.item.id);
        }
        dropped.len()
    }

    pub fn pause_queue(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume_queue(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.wake.notify_one();
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Queued actions in dispatch order.
    pub fn queued(&self) -> Vec<QueuedAction> {
        self.queue.lock().iter().map(|entry| entry.item.clone()).collect()
    }

    /// Disabling resolves pending `submit_and_wait` calls with `Disabled`;
    /// their actions stay queued.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        if enabled {
            self.wake.notify_one();
        } else {
            self.fail_waiters(DispatchError::Disabled);
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn gate(&self) -> Result<(), DispatchError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(DispatchError::EmergencyStopped);
        }
        if !self.is_enabled() {
            return Err(DispatchError::Disabled);
        }
        Ok(())
    }

    fn fail_waiters(&self, err: DispatchError) {
        let pending: Vec<Waiter> = self.waiters.lock().drain().map(|(_, waiter)| waiter).collect();
        if !pending.is_empty() {
            debug!(waiters = pending.len(), error = %err, "releasing pending submissions");
        }
        for waiter in pending {
            let _ = waiter.send(Err(err.clone()));
        }
    }

    fn can_drain(&self) -> bool {
        self.gate().is_ok() && !self.is_paused()
    }

    /// Pops and executes the head of the queue. Returns `None` when the queue
    /// is empty, paused, disabled or emergency-stopped.
    pub async fn process_next(&self) -> Option<ActionReport> {
        let _guard = self.dispatch_lock.lock().await;
        if !self.can_drain() {
            return None;
        }
        let entry = self.queue.lock().pop()?;
        let waiter = self.waiters.lock().remove(&entry.item.id);
        let (report, outcome) = self.dispatch(entry.item).await;
        if let Some(waiter) = waiter {
            let _ = waiter.send(outcome.map(|_| report.clone()));
        }
        Some(report)
    }

    // ---- direct execution --------------------------------------------

    /// Runs an action immediately, bypassing the queue.
    pub async fn execute_now(&self, kind: ActionKind) -> Result<ActionReport, DispatchError> {
        validate_params(&kind)?;
        self.gate()?;
        let _guard = self.dispatch_lock.lock().await;
        let config = self.config.read().clone();
        let action = QueuedAction {
            id: ActionId::new(),
            kind,
            priority: Default::default(),
            timestamp: Utc::now(),
            max_retries: config.max_retries,
            retry_delay: config.retry_delay,
            attempts: 0,
        };
        let (report, outcome) = self.dispatch(action).await;
        outcome.map(|_| report)
    }

    /// Enqueues the action and waits for its report. Starts the background
    /// worker if it is not running.
    pub async fn submit_and_wait(
        self: &Arc<Self>,
        request: impl Into<ActionRequest>,
    ) -> Result<ActionReport, DispatchError> {
        self.gate()?;
        self.start();
        let (tx, rx) = oneshot::channel();
        self.enqueue(request.into(), Some(tx))?;
        rx.await.map_err(|_| DispatchError::Dropped)?
    }

    /// Glides the pointer from its current position to `target`.
    pub async fn smooth_move_to(
        &self,
        target: Point,
        options: Option<SmoothMoveOptions>,
    ) -> Result<SmoothMoveReport, DispatchError> {
        self.gate()?;
        let config = self.config.read().clone();
        safety::check_point(config.safe_area, target)?;
        let options = options.unwrap_or(config.smooth);
        let _guard = self.dispatch_lock.lock().await;
        let cancel = self.emergency_token();
        let started = Instant::now();
        let report = self.glide(self.current_pointer(), target, &options, &cancel).await?;
        self.counters.lock().record(started.elapsed());
        Ok(report)
    }

    fn current_pointer(&self) -> Point {
        self.injector
            .cursor_position()
            .or_else(|| *self.pointer.lock())
            .unwrap_or_default()
    }

    async fn dispatch(&self, mut action: QueuedAction) -> (ActionReport, Result<(), DispatchError>) {
        let started = Instant::now();
        let config = self.config.read().clone();

        if let Err(err) = safety::check_action(config.safe_area, &action.kind) {
            warn!(action_id = %action.id, kind = action.kind.name(), error = %err, "action rejected");
            self.events.publish(DispatchEvent::Rejected {
                id: action.id.clone(),
                reason: err.to_string(),
            });
            let report = build_report(&action, 0, started, Some(&err));
            return (report, Err(err));
        }

        let cancel = self.emergency_token();
        let opt = RetryOpt::fixed(action.max_retries, action.retry_delay);
        let kind = &action.kind;
        let cancel_ref = &cancel;
        let mut attempts = 0u32;
        let attempts_ref = &mut attempts;
        let outcome = retry_with_backoff(&opt, &cancel, |attempt| {
            *attempts_ref = attempt;
            self.perform(kind, cancel_ref)
        })
        .await
        .map_err(|err| match err {
            RetryError::Cancelled { .. } => DispatchError::EmergencyStopped,
            other => other.into_inner().unwrap_or(DispatchError::EmergencyStopped),
        });

        action.attempts = attempts;
        let report = build_report(&action, attempts, started, outcome.as_ref().err());
        match &outcome {
            Ok(()) => {
                self.counters.lock().record(started.elapsed());
                self.recorder.lock().record(&action);
                info!(
                    action_id = %action.id,
                    kind = action.kind.name(),
                    attempts,
                    latency_ms = report.latency_ms,
                    "action executed"
                );
                self.events.publish(DispatchEvent::Executed(report.clone()));
            }
            Err(err) => {
                warn!(
                    action_id = %action.id,
                    kind = action.kind.name(),
                    attempts,
                    error = %err,
                    "action failed"
                );
                self.events.publish(DispatchEvent::Failed(report.clone()));
            }
        }
        (report, outcome)
    }

    async fn perform(&self, kind: &ActionKind, cancel: &CancellationToken) -> Result<(), DispatchError> {
        if cancel.is_cancelled() {
            return Err(DispatchError::EmergencyStopped);
        }
        match kind {
            ActionKind::Click { at, button } => {
                self.pointer_event(*at, PointerAction::Click(*button)).await
            }
            ActionKind::Move { to, smooth: false } => {
                self.pointer_event(*to, PointerAction::Move).await
            }
            ActionKind::Move { to, smooth: true } => {
                let options = self.config.read().smooth.clone();
                self.glide(self.current_pointer(), *to, &options, cancel)
                    .await
                    .map(|_| ())
            }
            ActionKind::Drag { from, to, button } => self.drag(*from, *to, *button, cancel).await,
            ActionKind::Scroll { at, delta } => {
                self.pointer_event(*at, PointerAction::Scroll(*delta)).await
            }
            ActionKind::Key { code } => Ok(self.injector.inject_key(KeyEvent::Tap(code.clone())).await?),
            ActionKind::Type { text } => Ok(self.injector.inject_key(KeyEvent::Text(text.clone())).await?),
        }
    }

    async fn pointer_event(&self, position: Point, action: PointerAction) -> Result<(), DispatchError> {
        self.injector
            .inject_pointer(PointerEvent::new(position, action))
            .await?;
        *self.pointer.lock() = Some(position);
        Ok(())
    }

    async fn drag(
        &self,
        from: Point,
        to: Point,
        button: MouseButton,
        cancel: &CancellationToken,
    ) -> Result<(), DispatchError> {
        let options = self.config.read().smooth.clone();
        self.pointer_event(from, PointerAction::Move).await?;
        self.pointer_event(from, PointerAction::Down(button)).await?;
        let glided = self.glide(from, to, &options, cancel).await;
        // Always release the button, even when the glide was interrupted.
        let released = self.pointer_event(to, PointerAction::Up(button)).await;
        glided?;
        released
    }

    /// Emits eased waypoints on absolute deadlines so the whole glide takes
    /// `options.duration` regardless of per-event injection cost.
    async fn glide(
        &self,
        from: Point,
        to: Point,
        options: &SmoothMoveOptions,
        cancel: &CancellationToken,
    ) -> Result<SmoothMoveReport, DispatchError> {
        let path = waypoints(from, to, options.steps, &options.easing);
        let step = options.duration / path.len().max(1) as u32;
        let started = Instant::now();
        for (idx, point) in path.iter().enumerate() {
            let deadline = started + step * (idx as u32 + 1);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DispatchError::EmergencyStopped),
                _ = tokio::time::sleep_until(deadline) => {}
            }
            self.pointer_event(*point, PointerAction::Move).await?;
        }
        debug!(from = %from, to = %to, steps = path.len(), "glide finished");
        Ok(SmoothMoveReport {
            waypoints: path,
            elapsed: started.elapsed(),
        })
    }

    // ---- emergency stop -----------------------------------------------

    fn emergency_token(&self) -> CancellationToken {
        self.emergency.lock().clone()
    }

    /// Halts dispatch at once and interrupts any glide or retry wait. Events
    /// already handed to the injector are not recalled; the queue is kept,
    /// and pending `submit_and_wait` calls resolve with `EmergencyStopped`.
    pub fn emergency_stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.emergency.lock().cancel();
        self.fail_waiters(DispatchError::EmergencyStopped);
        warn!(queued = self.queue_len(), "emergency stop engaged");
        self.events.publish(DispatchEvent::EmergencyStop);
    }

    pub fn reset_emergency_stop(&self) {
        *self.emergency.lock() = CancellationToken::new();
        if self.stopped.swap(false, Ordering::SeqCst) {
            info!("emergency stop reset");
        }
        self.wake.notify_one();
    }

    pub fn is_emergency_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    // ---- recording ----------------------------------------------------

    /// Returns `false` if a recording is already in progress.
    pub fn start_recording(&self) -> bool {
        self.recorder.lock().start()
    }

    pub fn stop_recording(&self) -> Vec<RecordedAction> {
        self.recorder.lock().stop()
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.lock().is_recording()
    }

    /// Re-executes a recording, preserving relative timing scaled by `speed`
    /// (2.0 plays twice as fast). Failed actions are reported and skipped; an
    /// emergency stop aborts the replay.
    pub async fn replay(
        &self,
        recorded: &[RecordedAction],
        speed: f64,
    ) -> Result<Vec<ActionReport>, DispatchError> {
        if !(speed.is_finite() && speed > 0.0) {
            return Err(DispatchError::InvalidAction(format!(
                "replay speed must be positive, got {speed}"
            )));
        }
        self.gate()?;
        let cancel = self.emergency_token();
        let started = Instant::now();
        let mut reports = Vec::with_capacity(recorded.len());
        for entry in recorded {
            let deadline = started + entry.offset.div_f64(speed);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DispatchError::EmergencyStopped),
                _ = tokio::time::sleep_until(deadline) => {}
            }
            let action = QueuedAction {
                id: ActionId::new(),
                attempts: 0,
                timestamp: Utc::now(),
                ..entry.action.clone()
            };
            let _guard = self.dispatch_lock.lock().await;
            let (report, outcome) = self.dispatch(action).await;
            if matches!(outcome, Err(DispatchError::EmergencyStopped)) {
                return Err(DispatchError::EmergencyStopped);
            }
            reports.push(report);
        }
        Ok(reports)
    }

    // ---- pacing and worker ---------------------------------------------

    pub fn performance(&self) -> PerformanceSnapshot {
        let floor = self.config.read().action_delay;
        self.counters.lock().snapshot(floor)
    }

    fn pacing_delay(&self) -> Duration {
        let config = self.config.read();
        if config.adaptive_pacing {
            self.counters.lock().recommended_delay(config.action_delay)
        } else {
            config.action_delay
        }
    }

    /// Starts the background worker that drains the queue. Returns `false`
    /// if it is already running. Must be called inside a Tokio runtime.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut worker = self.worker.lock();
        if worker.as_ref().is_some_and(|w| !w.handle.is_finished()) {
            return false;
        }
        let token = CancellationToken::new();
        let handle = tokio::spawn(drain_loop(
            Arc::downgrade(self),
            Arc::clone(&self.wake),
            token.clone(),
        ));
        *worker = Some(Worker { token, handle });
        info!("action dispatcher worker started");
        true
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }

    /// Stops the worker after the action in flight, if any.
    pub async fn shutdown(&self) {
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            worker.token.cancel();
            if let Err(err) = worker.handle.await {
                warn!(error = %err, "dispatcher worker ended abnormally");
            }
            info!("action dispatcher worker stopped");
        }
    }
}

impl Drop for ActionDispatcher {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            worker.token.cancel();
        }
    }
}

async fn drain_loop(dispatcher: Weak<ActionDispatcher>, wake: Arc<Notify>, token: CancellationToken) {
    loop {
        if token.is_cancelled() {
            break;
        }
        let pause = {
            let Some(this) = dispatcher.upgrade() else {
                break;
            };
            match this.process_next().await {
                Some(_) => Some(this.pacing_delay()),
                None => None,
            }
        };
        match pause {
            Some(pause) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(pause) => {}
                }
            }
            None => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = wake.notified() => {}
                    _ = tokio::time::sleep(IDLE_RECHECK) => {}
                }
            }
        }
    }
    debug!("dispatcher drain loop exited");
}

fn validate_params(kind: &ActionKind) -> Result<(), DispatchError> {
    match kind {
        ActionKind::Key { code } if code.trim().is_empty() => {
            Err(DispatchError::InvalidAction("empty key code".into()))
        }
        ActionKind::Type { text } if text.is_empty() => {
            Err(DispatchError::InvalidAction("empty text".into()))
        }
        ActionKind::Scroll { delta: 0, .. } => {
            Err(DispatchError::InvalidAction("zero scroll delta".into()))
        }
        _ => Ok(()),
    }
}

fn build_report(
    action: &QueuedAction,
    attempts: u32,
    started: Instant,
    error: Option<&DispatchError>,
) -> ActionReport {
    ActionReport {
        action_id: action.id.clone(),
        kind: action.kind.name().to_string(),
        ok: error.is_none(),
        attempts,
        latency_ms: started.elapsed().as_millis() as u64,
        error: error.map(ToString::to_string),
        finished_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::easing::Easing;
    use crate::injector::MemoryInjector;
    use gamepilot_core_types::Rect;
    use gamepilot_scheduler::Priority;

    fn fast_config() -> DispatcherConfig {
        DispatcherConfig {
            retry_delay: Duration::from_millis(1),
            action_delay: Duration::from_millis(1),
            smooth: SmoothMoveOptions {
                duration: Duration::from_millis(20),
                steps: 4,
                easing: Easing::Linear,
            },
            ..DispatcherConfig::default()
        }
    }

    fn setup(config: DispatcherConfig) -> (Arc<MemoryInjector>, Arc<ActionDispatcher>) {
        let injector = Arc::new(MemoryInjector::new());
        let dispatcher = ActionDispatcher::new(injector.clone(), config);
        (injector, dispatcher)
    }

    fn key(code: &str) -> ActionRequest {
        ActionRequest::new(ActionKind::key(code))
    }

    #[tokio::test]
    async fn drains_by_priority_then_fifo() {
        let (injector, dispatcher) = setup(fast_config());
        dispatcher.pause_queue();
        dispatcher.add_to_queue(key("low").with_priority(Priority::Low)).unwrap();
        dispatcher.add_to_queue(key("medium")).unwrap();
        dispatcher.add_to_queue(key("high-1").with_priority(Priority::High)).unwrap();
        dispatcher.add_to_queue(key("high-2").with_priority(Priority::High)).unwrap();

        assert!(dispatcher.process_next().await.is_none(), "paused queue must not drain");
        assert_eq!(dispatcher.queue_len(), 4);

        dispatcher.resume_queue();
        while dispatcher.process_next().await.is_some() {}

        let order: Vec<_> = injector
            .key_events()
            .into_iter()
            .map(|event| match event {
                KeyEvent::Tap(code) => code,
                KeyEvent::Text(text) => text,
            })
            .collect();
        assert_eq!(order, vec!["high-1", "high-2", "medium", "low"]);
    }

    #[tokio::test]
    async fn out_of_bounds_action_is_rejected_without_injection() {
        let config = DispatcherConfig {
            safe_area: Some(Rect::new(0, 0, 100, 100)),
            ..fast_config()
        };
        let (injector, dispatcher) = setup(config);
        let mut events = dispatcher.subscribe();

        dispatcher
            .add_to_queue(ActionKind::click(Point::new(500, 5)))
            .unwrap();
        dispatcher
            .add_to_queue(ActionKind::click(Point::new(50, 50)))
            .unwrap();

        let rejected = dispatcher.process_next().await.unwrap();
        assert!(!rejected.ok);
        assert_eq!(rejected.attempts, 0);
        assert!(injector.pointer_events().is_empty());

        let accepted = dispatcher.process_next().await.unwrap();
        assert!(accepted.ok);
        assert_eq!(injector.pointer_events().len(), 1);

        let mut saw_rejection = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, DispatchEvent::Rejected { .. }) {
                saw_rejection = true;
            }
        }
        assert!(saw_rejection);
    }

    #[tokio::test]
    async fn failed_injection_is_retried_in_place() {
        let (injector, dispatcher) = setup(fast_config());
        injector.fail_next(2);
        dispatcher.add_to_queue(key("a").with_retries(2)).unwrap();
        dispatcher.add_to_queue(key("b")).unwrap();

        let first = dispatcher.process_next().await.unwrap();
        assert!(first.ok);
        assert_eq!(first.attempts, 3);
        assert_eq!(injector.key_events(), vec![KeyEvent::Tap("a".into())]);

        injector.fail_next(10);
        let second = dispatcher.process_next().await.unwrap();
        assert!(!second.ok);
        assert_eq!(second.attempts, 3);
        assert!(second.error.is_some());
    }

    #[tokio::test]
    async fn invalid_parameters_are_refused_at_enqueue() {
        let (_, dispatcher) = setup(fast_config());
        assert!(matches!(
            dispatcher.add_to_queue(ActionKind::Type { text: String::new() }),
            Err(DispatchError::InvalidAction(_))
        ));
        assert_eq!(dispatcher.queue_len(), 0);
    }

    #[tokio::test]
    async fn smooth_move_spans_duration_and_lands_on_target() {
        let (injector, dispatcher) = setup(fast_config());
        let options = SmoothMoveOptions {
            duration: Duration::from_millis(100),
            steps: 5,
            easing: Easing::Linear,
        };
        let report = dispatcher
            .smooth_move_to(Point::new(100, 0), Some(options))
            .await
            .unwrap();

        assert_eq!(report.waypoints.len(), 5);
        assert_eq!(report.waypoints.last(), Some(&Point::new(100, 0)));
        assert!(report.elapsed >= Duration::from_millis(100));
        assert!(report.elapsed < Duration::from_millis(600));
        let xs: Vec<_> = injector.pointer_events().iter().map(|e| e.position.x).collect();
        assert_eq!(xs, vec![20, 40, 60, 80, 100]);
    }

    #[tokio::test]
    async fn emergency_stop_interrupts_a_glide() {
        let (injector, dispatcher) = setup(fast_config());
        let options = SmoothMoveOptions {
            duration: Duration::from_millis(400),
            steps: 20,
            easing: Easing::Linear,
        };
        let mover = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                dispatcher
                    .smooth_move_to(Point::new(400, 400), Some(options))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(60)).await;
        dispatcher.emergency_stop();

        let outcome = mover.await.unwrap();
        assert_eq!(outcome, Err(DispatchError::EmergencyStopped));
        assert!(injector.pointer_events().len() < 20);

        dispatcher.add_to_queue(key("after")).unwrap();
        assert!(dispatcher.process_next().await.is_none());
        assert_eq!(dispatcher.queue_len(), 1, "queue survives the stop");

        dispatcher.reset_emergency_stop();
        assert!(dispatcher.process_next().await.unwrap().ok);
    }

    #[tokio::test]
    async fn records_and_replays_executed_actions() {
        let (injector, dispatcher) = setup(fast_config());
        assert!(dispatcher.start_recording());
        assert!(!dispatcher.start_recording());

        dispatcher.execute_now(ActionKind::key("F1")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        dispatcher
            .execute_now(ActionKind::click(Point::new(5, 5)))
            .await
            .unwrap();

        let recorded = dispatcher.stop_recording();
        assert_eq!(recorded.len(), 2);
        assert!(recorded[1].offset >= recorded[0].offset);
        assert!(dispatcher.stop_recording().is_empty());

        injector.clear();
        let reports = dispatcher.replay(&recorded, 4.0).await.unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.ok));
        assert_eq!(injector.key_events(), vec![KeyEvent::Tap("F1".into())]);
        assert_eq!(injector.pointer_events().len(), 1);
    }

    #[tokio::test]
    async fn remove_and_clear_leave_the_rest_in_order() {
        let (_, dispatcher) = setup(fast_config());
        dispatcher.pause_queue();
        let a = dispatcher.add_to_queue(key("a")).unwrap();
        let b = dispatcher.add_to_queue(key("b")).unwrap();
        let c = dispatcher.add_to_queue(key("c")).unwrap();

        assert!(dispatcher.remove_from_queue(&b));
        assert!(!dispatcher.remove_from_queue(&b));
        let ids: Vec<_> = dispatcher.queued().into_iter().map(|q| q.id).collect();
        assert_eq!(ids, vec![a, c]);
        assert_eq!(dispatcher.clear_queue(), 2);
        assert_eq!(dispatcher.queue_len(), 0);
    }

    #[tokio::test]
    async fn submit_and_wait_runs_through_the_worker() {
        let (injector, dispatcher) = setup(fast_config());
        let report = dispatcher
            .submit_and_wait(ActionKind::click(Point::new(3, 4)))
            .await
            .unwrap();
        assert!(report.ok);
        assert!(dispatcher.is_running());
        assert_eq!(injector.pointer_events().len(), 1);

        dispatcher.shutdown().await;
        assert!(!dispatcher.is_running());
        assert_eq!(dispatcher.performance().executed, 1);
    }

    #[tokio::test]
    async fn cleared_submission_resolves_as_dropped() {
        let (_, dispatcher) = setup(fast_config());
        dispatcher.pause_queue();
        let waiter = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.submit_and_wait(key("never")).await })
        };
        while dispatcher.queue_len() == 0 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert_eq!(dispatcher.clear_queue(), 1);
        assert_eq!(waiter.await.unwrap(), Err(DispatchError::Dropped));
        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn drag_presses_glides_and_releases() {
        let (injector, dispatcher) = setup(fast_config());
        dispatcher
            .execute_now(ActionKind::Drag {
                from: Point::new(0, 0),
                to: Point::new(40, 0),
                button: MouseButton::Left,
            })
            .await
            .unwrap();
        let events = injector.pointer_events();
        assert_eq!(events.first().map(|e| e.action), Some(PointerAction::Move));
        assert_eq!(events[1].action, PointerAction::Down(MouseButton::Left));
        assert_eq!(
            events.last(),
            Some(&PointerEvent::new(Point::new(40, 0), PointerAction::Up(MouseButton::Left)))
        );
        // move + down + 4 waypoints + up
        assert_eq!(events.len(), 7);
    }

    #[tokio::test]
    async fn halted_dispatcher_refuses_submissions() {
        let (injector, dispatcher) = setup(fast_config());
        dispatcher.emergency_stop();
        let outcome = tokio::time::timeout(
            Duration::from_secs(2),
            dispatcher.submit_and_wait(key("Escape")),
        )
        .await
        .unwrap();
        assert_eq!(outcome, Err(DispatchError::EmergencyStopped));
        assert_eq!(dispatcher.queue_len(), 0);

        dispatcher.reset_emergency_stop();
        dispatcher.set_enabled(false);
        let outcome = tokio::time::timeout(
            Duration::from_secs(2),
            dispatcher.submit_and_wait(key("Escape")),
        )
        .await
        .unwrap();
        assert_eq!(outcome, Err(DispatchError::Disabled));
        assert!(injector.key_events().is_empty());
    }

    #[tokio::test]
    async fn emergency_stop_releases_waiters_and_keeps_the_queue() {
        let (injector, dispatcher) = setup(fast_config());
        dispatcher.pause_queue();
        let waiter = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.submit_and_wait(key("later")).await })
        };
        while dispatcher.queue_len() == 0 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        dispatcher.emergency_stop();
        let outcome = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, Err(DispatchError::EmergencyStopped));
        assert_eq!(dispatcher.queue_len(), 1);

        dispatcher.shutdown().await;
        dispatcher.reset_emergency_stop();
        dispatcher.resume_queue();
        assert!(dispatcher.process_next().await.unwrap().ok);
        assert_eq!(injector.key_events(), vec![KeyEvent::Tap("later".into())]);
    }
}
