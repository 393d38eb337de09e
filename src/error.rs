//! Error types for the line-count engine.
//!
//! Nothing in here ever reaches the decoration surface: the engine logs these
//! and collapses them to `0` lines or "no decoration".

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while counting, enumerating or watching files.
#[derive(Error, Debug)]
pub enum LensError {
    /// Stat, open or read failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path the operation was on.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// An entry could not be read during enumeration.
    #[error("Failed to enumerate files under {root}: {source}")]
    Walk {
        /// Root of the walk.
        root: PathBuf,
        /// Underlying error.
        source: ignore::Error,
    },

    /// Neither watcher backend could be created.
    #[error("Failed to create watcher: {0}")]
    WatcherCreation(#[from] notify::Error),

    /// A root could not be watched.
    #[error("Failed to watch path {path}: {source}")]
    Watch {
        /// Root that failed.
        path: PathBuf,
        /// Underlying error.
        source: notify::Error,
    },

    /// A blocking or spawned task panicked or was cancelled.
    #[error("Background task failed: {0}")]
    TaskJoin(String),
}

impl LensError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, LensError>;
