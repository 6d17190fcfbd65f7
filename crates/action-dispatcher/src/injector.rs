use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use gamepilot_core_types::{PilotError, Point};
use parking_lot::Mutex;

use crate::models::MouseButton;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerAction {
    Move,
    Down(MouseButton),
    Up(MouseButton),
    Click(MouseButton),
    Scroll(i32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PointerEvent {
    pub position: Point,
    pub action: PointerAction,
}

impl PointerEvent {
    pub fn new(position: Point, action: PointerAction) -> Self {
        Self { position, action }
    }

    pub fn moved(position: Point) -> Self {
        Self::new(position, PointerAction::Move)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyEvent {
    /// Press and release a named key.
    Tap(String),
    /// Type literal text.
    Text(String),
}

/// OS-level input synthesis. Once an event is handed over it cannot be
/// recalled.
#[async_trait]
pub trait InputInjector: Send + Sync {
    async fn inject_pointer(&self, event: PointerEvent) -> Result<(), PilotError>;

    async fn inject_key(&self, event: KeyEvent) -> Result<(), PilotError>;

    /// Current pointer position, when the platform can report it.
    fn cursor_position(&self) -> Option<Point> {
        None
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputEvent {
    Pointer(PointerEvent),
    Key(KeyEvent),
}

/// Injector that keeps every event in memory. Failures can be scheduled
/// with [`MemoryInjector::fail_next`].
#[derive(Debug, Default)]
pub struct MemoryInjector {
    events: Mutex<Vec<InputEvent>>,
    cursor: Mutex<Option<Point>>,
    pending_failures: AtomicU32,
}

impl MemoryInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` injections fail.
    pub fn fail_next(&self, count: u32) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<InputEvent> {
        self.events.lock().clone()
    }

    pub fn pointer_events(&self) -> Vec<PointerEvent> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                InputEvent::Pointer(pointer) => Some(*pointer),
                InputEvent::Key(_) => None,
            })
            .collect()
    }

    pub fn key_events(&self) -> Vec<KeyEvent> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                InputEvent::Key(key) => Some(key.clone()),
                InputEvent::Pointer(_) => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    fn take_failure(&self) -> bool {
        self.pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl InputInjector for MemoryInjector {
    async fn inject_pointer(&self, event: PointerEvent) -> Result<(), PilotError> {
        if self.take_failure() {
            return Err(PilotError::new("simulated pointer injection failure"));
        }
        *self.cursor.lock() = Some(event.position);
        self.events.lock().push(InputEvent::Pointer(event));
        Ok(())
    }

    async fn inject_key(&self, event: KeyEvent) -> Result<(), PilotError> {
        if self.take_failure() {
            return Err(PilotError::new("simulated key injection failure"));
        }
        self.events.lock().push(InputEvent::Key(event));
        Ok(())
    }

    fn cursor_position(&self) -> Option<Point> {
        *self.cursor.lock()
    }
}
