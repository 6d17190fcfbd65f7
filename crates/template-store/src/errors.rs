use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    /// Reading the template tree failed.
    #[error("template io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configured root exists but is not a directory.
    #[error("template root {0} is not a directory")]
    NotADirectory(PathBuf),

    /// `reload()` was called before any `load()`.
    #[error("template store has no root directory")]
    NoRoot,

    #[error("failed to decode template {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("template watcher error: {0}")]
    Watch(#[from] notify::Error),
}

impl TemplateError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
