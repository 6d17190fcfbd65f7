//! Input dispatch.
//!
//! Actions wait in a priority queue (`high > medium > low`, FIFO within a
//! band) and are executed one at a time through an [`InputInjector`]. Every
//! coordinate is checked against the configured safe area first; failed
//! injections are retried in place so the rest of the queue keeps its order.
//! Pointer motion can be spread over eased waypoints, executed actions can be
//! recorded and replayed, and an emergency stop halts all further dispatch.

pub mod dispatcher;
pub mod easing;
pub mod errors;
pub mod injector;
pub mod metrics;
pub mod models;
pub mod recorder;
pub mod safety;

pub use dispatcher::ActionDispatcher;
pub use easing::Easing;
pub use errors::DispatchError;
pub use gamepilot_scheduler::Priority;
pub use injector::{InputEvent, InputInjector, KeyEvent, MemoryInjector, PointerAction, PointerEvent};
pub use metrics::{PerformanceCounters, PerformanceSnapshot};
pub use models::{
    ActionKind, ActionReport, ActionRequest, DispatchEvent, DispatcherConfig, MouseButton,
    QueuedAction, RecordedAction, SmoothMoveOptions, SmoothMoveReport,
};
