//! Task execution.
//!
//! [`TaskRunner`] owns the lifecycle of one [`Task`]: precondition gate,
//! per-attempt timeout, bounded retry and cancellation that pre-empts the
//! running body. [`TaskExecutorManager`] keeps runners by name and caps how
//! many run at once. [`ScriptedTask`] turns a YAML step list into a task that
//! drives the scene detector and action dispatcher.

pub mod errors;
pub mod manager;
pub mod probe;
pub mod runner;
pub mod scripted;
pub mod task;
pub mod types;

pub use errors::TaskError;
pub use manager::TaskExecutorManager;
pub use probe::{GameProbe, GameRunningCheck, Precondition, ProcessInfo, WindowInfo};
pub use runner::TaskRunner;
pub use scripted::{Script, ScriptStep, ScriptedTask, StepAction, StepTarget};
pub use task::{Capabilities, Task, TaskContext};
pub use types::{RunnerConfig, TaskEvent, TaskResult, TaskStatus};
