//! Template and color matching.
//!
//! The engine scores a grayscale needle against every offset of a frame
//! (optionally restricted to a region) using the sum of squared differences
//! and reports the best offset with a confidence in `[0, 1]`. Large frames
//! are searched coarse-to-fine. CPU-heavy batch work is moved onto Tokio's
//! blocking pool so poll loops never stall.

pub mod capture;
mod correlate;
pub mod engine;
pub mod errors;
pub mod models;

pub use capture::{FrameSequence, FrameSource};
pub use engine::MatchEngine;
pub use errors::MatchError;
pub use models::{ColorMatch, ColorRange, Frame, MatchEngineConfig, MatchResult};
