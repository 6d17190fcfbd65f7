//! Scheduling primitives shared by the perception and actuation loops.
//!
//! - [`lane::PriorityLane`]: strict-priority queue, FIFO within a band
//! - [`periodic::PeriodicTask`]: cancellable fixed-interval ticker
//! - [`retry::retry_with_backoff`]: bounded retry combinator with cancellation

pub mod lane;
pub mod model;
pub mod periodic;
pub mod retry;

pub use lane::{Entry, PriorityLane};
pub use model::{Backoff, Priority, RetryOpt};
pub use periodic::PeriodicTask;
pub use retry::{retry_with_backoff, RetryError, Retryable};
