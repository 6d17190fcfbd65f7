//! Scene recognition.
//!
//! Each poll captures one frame, scores every scene template against it,
//! corroborates the best scene with the templates hinted at it and feeds the
//! raw result into a confirmation state machine. Only confirmed scenes
//! become "current" and produce [`SceneChangeEvent`]s.

pub mod confirm;
pub mod detector;
pub mod errors;
pub mod history;
pub mod models;
pub mod scoring;

pub use confirm::{SceneConfirmer, SceneTransition};
pub use detector::SceneDetector;
pub use errors::DetectorError;
pub use models::{ConfirmedScene, DetectionResult, DetectorConfig, DetectorStats, SceneChangeEvent};
