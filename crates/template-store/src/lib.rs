//! Reference image store.
//!
//! Templates are read from `<root>/<type>/<file>` or
//! `<root>/<type>/<scene>/<file>`, decoded to grayscale once and indexed by
//! `(type, name)`. A reload builds a fresh [`TemplateIndex`] and swaps it in
//! atomically, so readers only ever observe a complete index.

pub mod errors;
pub mod index;
pub mod loader;
pub mod models;
pub mod store;

pub use errors::TemplateError;
pub use index::TemplateIndex;
pub use models::{HintSource, SceneHint, SceneKeyword, StoreOptions, Template, TemplateKey};
pub use store::{TemplateStore, TemplateWatcher};
