use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use gamepilot_core_types::SceneId;
use gamepilot_event_bus::{EventBus, InMemoryBus};
use gamepilot_scheduler::PeriodicTask;
use match_engine::{FrameSource, MatchEngine, MatchError};
use parking_lot::{Mutex, RwLock};
use template_store::TemplateStore;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::confirm::{SceneConfirmer, SceneTransition};
use crate::errors::DetectorError;
use crate::history::DetectionHistory;
use crate::models::{ConfirmedScene, DetectionResult, DetectorConfig, DetectorStats, SceneChangeEvent};
use crate::scoring;

/// Polls capture and match, and owns the confirmed "current scene".
///
/// Only the detector's own polls and [`SceneDetector::set_current_scene`]
/// write the current scene; any number of tasks may wait on it.
pub struct SceneDetector {
    store: Arc<TemplateStore>,
    engine: MatchEngine,
    source: Arc<dyn FrameSource>,
    config: RwLock<DetectorConfig>,
    confirmer: Mutex<SceneConfirmer>,
    current: watch::Sender<ConfirmedScene>,
    events: Arc<InMemoryBus<SceneChangeEvent>>,
    history: Mutex<DetectionHistory>,
    poll_lock: tokio::sync::Mutex<()>,
    ticker: Mutex<Option<PeriodicTask>>,
    destroyed: AtomicBool,
    polls: AtomicU64,
    errors: AtomicU64,
    changes: AtomicU64,
    total_detection_ms: AtomicU64,
}

impl SceneDetector {
    /// Builds the detector and, when `auto_detection` is set and a Tokio
    /// runtime is available, starts periodic polling right away.
    pub fn new(
        store: Arc<TemplateStore>,
        engine: MatchEngine,
        source: Arc<dyn FrameSource>,
        config: DetectorConfig,
    ) -> Arc<Self> {
        let (current, _) = watch::channel(ConfirmedScene::default());
        let auto = config.auto_detection;
        let detector = Arc::new(Self {
            store,
            engine,
            source,
            confirmer: Mutex::new(SceneConfirmer::new(config.confirmation_count)),
            history: Mutex::new(DetectionHistory::new(config.history_size)),
            config: RwLock::new(config),
            current,
            events: InMemoryBus::new(64),
            poll_lock: tokio::sync::Mutex::new(()),
            ticker: Mutex::new(None),
            destroyed: AtomicBool::new(false),
            polls: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            changes: AtomicU64::new(0),
            total_detection_ms: AtomicU64::new(0),
        });

        if auto {
            if tokio::runtime::Handle::try_current().is_ok() {
                if let Err(err) = detector.start_detection() {
                    warn!("auto detection not started: {err}");
                }
            } else {
                warn!("auto detection requested outside a Tokio runtime; call start_detection later");
            }
        }
        detector
    }

    pub fn config(&self) -> DetectorConfig {
        self.config.read().clone()
    }

    /// Applies new settings. A changed interval takes effect on the next
    /// `start_detection()`.
    pub fn update_config(&self, config: DetectorConfig) {
        self.confirmer.lock().set_required(config.confirmation_count);
        self.history.lock().resize(config.history_size);
        *self.config.write() = config;
    }

    pub fn current_scene(&self) -> SceneId {
        self.current.borrow().scene.clone()
    }

    pub fn current(&self) -> ConfirmedScene {
        self.current.borrow().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SceneChangeEvent> {
        self.events.subscribe()
    }

    pub fn events(&self) -> Arc<InMemoryBus<SceneChangeEvent>> {
        Arc::clone(&self.events)
    }

    /// Runs one poll. Capture and match failures are absorbed: the poll
    /// reports `UNKNOWN` with zero confidence and the error counter grows.
    pub async fn detect_current_scene(&self) -> DetectionResult {
        let _serial = self.poll_lock.lock().await;
        let started = Instant::now();
        let (timeout, threshold, bonus) = {
            let config = self.config.read();
            (
                config.detection_timeout,
                config.confidence_threshold,
                config.corroboration_bonus,
            )
        };

        let outcome = match tokio::time::timeout(timeout, self.run_detection(threshold, bonus)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(DetectorError::Timeout(timeout)),
        };
        let mut result = match outcome {
            Ok(result) => result,
            Err(err) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                warn!("scene detection failed: {err}");
                DetectionResult::unknown()
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        result.detection_time_ms = elapsed_ms;
        self.polls.fetch_add(1, Ordering::Relaxed);
        self.total_detection_ms.fetch_add(elapsed_ms, Ordering::Relaxed);
        debug!(
            scene = %result.scene,
            confidence = result.confidence,
            elapsed_ms,
            "detection poll"
        );

        self.history.lock().push(result.clone());
        self.confirm(&result);
        result
    }

    async fn run_detection(&self, threshold: f64, bonus: f64) -> Result<DetectionResult, DetectorError> {
        let Some(frame) = self.source.capture_frame().await? else {
            debug!("capture unavailable, scene unknown");
            return Ok(DetectionResult::unknown());
        };

        let index = self.store.snapshot();
        let scene_templates = index.scene_templates();
        if scene_templates.is_empty() {
            return Ok(DetectionResult::unknown());
        }

        let previous = self.current_scene();
        let engine = self.engine.clone();
        let result = tokio::task::spawn_blocking(move || {
            scoring::score_frame(
                &engine,
                &frame,
                &index,
                &scene_templates,
                threshold,
                bonus,
                &previous,
            )
        })
        .await
        .map_err(|e| MatchError::Worker(format!("Task join error: {}", e)))?;
        Ok(result)
    }

    fn confirm(&self, result: &DetectionResult) {
        let mut confirmer = self.confirmer.lock();
        if self.destroyed.load(Ordering::Acquire) {
            return;
        }
        match confirmer.observe(&result.scene) {
            Some(transition) => self.publish_change(transition, result.clone()),
            None if *confirmer.confirmed() == result.scene => {
                let confidence = result.confidence;
                self.current.send_if_modified(|current| {
                    current.confidence = confidence;
                    false
                });
            }
            None => {}
        }
    }

    /// Must be called with the confirmer lock held so changes leave in order.
    fn publish_change(&self, transition: SceneTransition, result: DetectionResult) {
        let now = Utc::now();
        self.current.send_replace(ConfirmedScene {
            scene: transition.current.clone(),
            confidence: result.confidence,
            since: now,
        });
        self.changes.fetch_add(1, Ordering::Relaxed);
        info!(
            from = %transition.previous,
            to = %transition.current,
            confidence = result.confidence,
            "scene changed"
        );
        self.events.publish(SceneChangeEvent {
            previous_scene: transition.previous,
            current_scene: transition.current,
            detection_result: result,
            timestamp: now,
        });
    }

    /// Manual override. Confidence is forced to 1.0; emits immediately when
    /// the scene differs. Returns whether the scene changed.
    pub fn set_current_scene(&self, scene: SceneId) -> bool {
        let mut confirmer = self.confirmer.lock();
        match confirmer.force(scene.clone()) {
            Some(transition) => {
                self.publish_change(transition, DetectionResult::manual(scene));
                true
            }
            None => {
                self.current.send_if_modified(|current| {
                    current.confidence = 1.0;
                    false
                });
                false
            }
        }
    }

    /// Resolves `true` when `target` is already the confirmed scene or a
    /// change to it is emitted, even one superseded before the waiter runs.
    /// Resolves `false` once `timeout` passes without it.
    pub async fn wait_for_scene(&self, target: &SceneId, timeout: Duration) -> bool {
        self.wait_for_scene_until(target, timeout, &CancellationToken::new())
            .await
    }

    /// Like [`SceneDetector::wait_for_scene`], also giving up (with `false`)
    /// when `cancel` fires.
    pub async fn wait_for_scene_until(
        &self,
        target: &SceneId,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> bool {
        // Subscribe before the current-scene check so a change landing in
        // between is still delivered.
        let mut changes = self.events.subscribe();
        if self.current.borrow().scene == *target {
            return true;
        }

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = &mut deadline => return false,
                event = changes.recv() => match event {
                    Ok(event) if event.current_scene == *target => return true,
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, target = %target, "scene waiter lagged");
                        if self.current_scene() == *target {
                            return true;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => return false,
                },
            }
        }
    }

    /// Starts periodic polling. Returns `Ok(false)` when already running.
    pub fn start_detection(self: &Arc<Self>) -> Result<bool, DetectorError> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(DetectorError::Destroyed);
        }
        let mut ticker = self.ticker.lock();
        if ticker.as_ref().is_some_and(PeriodicTask::is_running) {
            return Ok(false);
        }

        let interval = self.config.read().detection_interval;
        let weak = Arc::downgrade(self);
        *ticker = Some(PeriodicTask::spawn("scene-detection", interval, move || {
            let weak = weak.clone();
            async move {
                match weak.upgrade() {
                    Some(detector) => {
                        detector.detect_current_scene().await;
                        ControlFlow::Continue(())
                    }
                    None => ControlFlow::Break(()),
                }
            }
        }));
        info!(interval_ms = interval.as_millis() as u64, "scene detection started");
        Ok(true)
    }

    /// Stops periodic polling. Returns `false` when it was not running.
    pub fn stop_detection(&self) -> bool {
        match self.ticker.lock().take() {
            Some(task) => {
                let was_running = task.is_running();
                task.stop();
                if was_running {
                    info!("scene detection stopped");
                }
                was_running
            }
            None => false,
        }
    }

    pub fn is_detecting(&self) -> bool {
        self.ticker
            .lock()
            .as_ref()
            .is_some_and(PeriodicTask::is_running)
    }

    /// Stops polling for good; later `start_detection()` calls fail. Once
    /// this returns no poll publishes a scene change.
    pub fn destroy(&self) {
        self.destroyed.store(true, Ordering::Release);
        self.stop_detection();
        // Waits out a confirmation already holding the lock.
        drop(self.confirmer.lock());
    }

    /// Like [`SceneDetector::destroy`], also waiting for a poll in flight
    /// to finish.
    pub async fn shutdown(&self) {
        self.destroyed.store(true, Ordering::Release);
        let ticker = self.ticker.lock().take();
        if let Some(task) = ticker {
            task.shutdown().await;
            info!("scene detection stopped");
        }
        drop(self.confirmer.lock());
    }

    pub fn history(&self) -> Vec<DetectionResult> {
        self.history.lock().to_vec()
    }

    pub fn last_result(&self) -> Option<DetectionResult> {
        self.history.lock().last().cloned()
    }

    pub fn stats(&self) -> DetectorStats {
        let polls = self.polls.load(Ordering::Relaxed);
        let total_ms = self.total_detection_ms.load(Ordering::Relaxed);
        DetectorStats {
            polls,
            detection_errors: self.errors.load(Ordering::Relaxed),
            scene_changes: self.changes.load(Ordering::Relaxed),
            avg_detection_ms: if polls == 0 {
                0.0
            } else {
                total_ms as f64 / polls as f64
            },
            current_scene: self.current_scene(),
            running: self.is_detecting(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gamepilot_core_types::PilotError;
    use image::{GrayImage, Luma, Rgba, RgbaImage};
    use match_engine::{Frame, FrameSequence};
    use std::path::Path;
    use tokio::sync::broadcast::error::TryRecvError;

    const SIZE: u32 = 24;

    fn checker(x: u32, y: u32) -> u8 {
        if (x / 4 + y / 4) % 2 == 0 { 255 } else { 0 }
    }

    fn rows(_x: u32, y: u32) -> u8 {
        if (y / 3) % 2 == 0 { 255 } else { 0 }
    }

    fn columns(x: u32, _y: u32) -> u8 {
        if (x / 3) % 2 == 0 { 255 } else { 0 }
    }

    fn save_pattern(path: &Path, pattern: fn(u32, u32) -> u8) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        GrayImage::from_fn(SIZE, SIZE, |x, y| Luma([pattern(x, y)]))
            .save(path)
            .unwrap();
    }

    fn frame_with(patterns: &[(fn(u32, u32) -> u8, u32, u32)]) -> Frame {
        let mut img = RgbaImage::from_pixel(160, 120, Rgba([128, 128, 128, 255]));
        for (pattern, ox, oy) in patterns {
            for y in 0..SIZE {
                for x in 0..SIZE {
                    let v = pattern(x, y);
                    img.put_pixel(ox + x, oy + y, Rgba([v, v, v, 255]));
                }
            }
        }
        Frame::from_rgba(img)
    }

    fn menu_frame() -> Frame {
        frame_with(&[(checker, 20, 20)])
    }

    fn battle_frame() -> Frame {
        frame_with(&[(rows, 90, 40), (columns, 30, 80)])
    }

    fn blank_frame() -> Frame {
        frame_with(&[])
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        store: Arc<TemplateStore>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        save_pattern(&dir.path().join("scenes/main_menu.png"), checker);
        save_pattern(&dir.path().join("scenes/battle.png"), rows);
        save_pattern(&dir.path().join("buttons/battle_attack.png"), columns);
        let store = Arc::new(TemplateStore::default());
        store.load(dir.path()).unwrap();
        Fixture { _dir: dir, store }
    }

    fn config() -> DetectorConfig {
        DetectorConfig {
            detection_interval: Duration::from_millis(10),
            ..DetectorConfig::default()
        }
    }

    fn detector(fixture: &Fixture, frames: Vec<Frame>) -> Arc<SceneDetector> {
        SceneDetector::new(
            fixture.store.clone(),
            MatchEngine::default(),
            Arc::new(FrameSequence::new(frames)),
            config(),
        )
    }

    #[tokio::test]
    async fn second_agreeing_poll_emits_exactly_one_change() {
        let fixture = fixture();
        let detector = detector(&fixture, vec![battle_frame()]);
        let mut events = detector.subscribe();

        let first = detector.detect_current_scene().await;
        assert_eq!(first.scene, SceneId::from("battle"));
        assert!(first.confidence >= 0.8 && first.confidence <= 1.0);
        assert!(first
            .matched_templates
            .contains(&"buttons/battle_attack".to_string()));
        assert!(detector.current_scene().is_unknown());
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));

        detector.detect_current_scene().await;
        assert_eq!(detector.current_scene(), SceneId::from("battle"));
        let event = events.try_recv().unwrap();
        assert!(event.previous_scene.is_unknown());
        assert_eq!(event.current_scene, SceneId::from("battle"));

        detector.detect_current_scene().await;
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(detector.stats().scene_changes, 1);
    }

    #[tokio::test]
    async fn interleaved_disagreement_delays_confirmation() {
        let fixture = fixture();
        let detector = detector(
            &fixture,
            vec![battle_frame(), menu_frame(), battle_frame(), battle_frame()],
        );

        for _ in 0..3 {
            detector.detect_current_scene().await;
            assert!(detector.current_scene().is_unknown());
        }
        detector.detect_current_scene().await;
        assert_eq!(detector.current_scene(), SceneId::from("battle"));
    }

    #[tokio::test]
    async fn blank_frames_confirm_unknown_after_debounce() {
        let fixture = fixture();
        let detector = detector(
            &fixture,
            vec![menu_frame(), menu_frame(), blank_frame(), blank_frame()],
        );
        detector.detect_current_scene().await;
        detector.detect_current_scene().await;
        assert_eq!(detector.current_scene(), SceneId::from("main_menu"));

        let blank = detector.detect_current_scene().await;
        assert!(blank.scene.is_unknown());
        assert_eq!(detector.current_scene(), SceneId::from("main_menu"));

        detector.detect_current_scene().await;
        assert!(detector.current_scene().is_unknown());
        assert_eq!(detector.history().len(), 4);
    }

    #[tokio::test]
    async fn wait_for_scene_is_immediate_or_times_out() {
        let fixture = fixture();
        let detector = detector(&fixture, vec![blank_frame()]);

        let started = Instant::now();
        assert!(detector.wait_for_scene(&SceneId::unknown(), Duration::from_secs(5)).await);
        assert!(started.elapsed() < Duration::from_millis(50));

        let started = Instant::now();
        assert!(!detector.wait_for_scene(&SceneId::from("battle"), Duration::from_millis(100)).await);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(90) && waited < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn wait_gives_up_on_cancellation() {
        let fixture = fixture();
        let detector = detector(&fixture, vec![blank_frame()]);
        let token = CancellationToken::new();
        token.cancel();
        assert!(
            !detector
                .wait_for_scene_until(&SceneId::from("battle"), Duration::from_secs(5), &token)
                .await
        );
    }

    #[tokio::test]
    async fn auto_detection_wakes_waiters_and_is_idempotent() {
        let fixture = fixture();
        let detector = detector(&fixture, vec![battle_frame()]);

        assert!(detector.start_detection().unwrap());
        assert!(!detector.start_detection().unwrap());
        assert!(detector.is_detecting());

        assert!(
            detector
                .wait_for_scene(&SceneId::from("battle"), Duration::from_secs(5))
                .await
        );

        assert!(detector.stop_detection());
        assert!(!detector.stop_detection());
        assert!(!detector.is_detecting());
    }

    #[tokio::test]
    async fn manual_override_emits_immediately() {
        let fixture = fixture();
        let detector = detector(&fixture, vec![blank_frame()]);
        let mut events = detector.subscribe();

        assert!(detector.set_current_scene(SceneId::from("reward")));
        let event = events.try_recv().unwrap();
        assert_eq!(event.current_scene, SceneId::from("reward"));
        assert_eq!(event.detection_result.confidence, 1.0);
        assert_eq!(detector.current().confidence, 1.0);

        assert!(!detector.set_current_scene(SceneId::from("reward")));
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }

    struct FailingCapture;

    #[async_trait]
    impl FrameSource for FailingCapture {
        async fn capture_frame(&self) -> Result<Option<Frame>, PilotError> {
            Err(PilotError::new("capture device lost"))
        }
    }

    #[tokio::test]
    async fn capture_errors_degrade_to_unknown() {
        let fixture = fixture();
        let detector = SceneDetector::new(
            fixture.store.clone(),
            MatchEngine::default(),
            Arc::new(FailingCapture),
            config(),
        );

        let result = detector.detect_current_scene().await;
        assert!(result.scene.is_unknown());
        assert_eq!(result.confidence, 0.0);
        let stats = detector.stats();
        assert_eq!(stats.detection_errors, 1);
        assert_eq!(stats.polls, 1);
    }

    #[tokio::test]
    async fn destroy_stops_and_refuses_restart() {
        let fixture = fixture();
        let detector = detector(&fixture, vec![blank_frame()]);
        detector.start_detection().unwrap();
        detector.destroy();
        assert!(!detector.is_detecting());
        assert!(matches!(
            detector.start_detection(),
            Err(DetectorError::Destroyed)
        ));
    }

    #[tokio::test]
    async fn waiter_sees_a_change_superseded_before_it_runs() {
        let fixture = fixture();
        let detector = detector(&fixture, vec![blank_frame()]);
        let waiter = {
            let detector = detector.clone();
            tokio::spawn(async move {
                detector
                    .wait_for_scene(&SceneId::from("reward"), Duration::from_secs(2))
                    .await
            })
        };
        while detector.events().receiver_count() == 0 {
            tokio::task::yield_now().await;
        }

        assert!(detector.set_current_scene(SceneId::from("reward")));
        assert!(detector.set_current_scene(SceneId::from("battle")));
        assert!(waiter.await.unwrap());
        assert_eq!(detector.current_scene(), SceneId::from("battle"));
    }

    #[tokio::test]
    async fn destroyed_detector_publishes_no_changes() {
        let fixture = fixture();
        let detector = detector(&fixture, vec![battle_frame()]);
        let mut events = detector.subscribe();
        detector.destroy();

        let raw = detector.detect_current_scene().await;
        assert_eq!(raw.scene, SceneId::from("battle"));
        detector.detect_current_scene().await;
        assert!(detector.current_scene().is_unknown());
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(detector.stats().scene_changes, 0);
    }

    #[tokio::test]
    async fn shutdown_waits_for_the_poll_loop() {
        let fixture = fixture();
        let detector = detector(&fixture, vec![battle_frame()]);
        detector.start_detection().unwrap();
        assert!(
            detector
                .wait_for_scene(&SceneId::from("battle"), Duration::from_secs(5))
                .await
        );

        detector.shutdown().await;
        assert!(!detector.is_detecting());
        let polls = detector.stats().polls;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(detector.stats().polls, polls);
        assert!(matches!(
            detector.start_detection(),
            Err(DetectorError::Destroyed)
        ));
    }
}
