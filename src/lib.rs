//! GamePilot library
//!
//! Exposes the configuration, wiring and offline adapters used by the
//! `gamepilot` binary so integration tests can drive them directly.

pub mod app_context;
pub mod config;
pub mod platform;

pub use app_context::PilotContext;
pub use config::{ConfigError, PilotConfig};
pub use platform::{ImageFileSource, StaticProbe, TracingInjector};
