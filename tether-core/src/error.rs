//! Error types for the configuration adapter.
//!
//! The reactive core itself has no error channel: listener panics are
//! isolated and logged, and a panicking computation unwinds to the reader.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors raised while loading, watching or persisting configuration files.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("file watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a JSON object, found {found}")]
    NotAnObject { found: &'static str },
}

impl Error {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
