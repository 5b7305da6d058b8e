//! Error types for the mter-core library.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for mter operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while setting up UDP console export.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A target rule entry could not be parsed.
    #[error("Invalid target rule '{rule}': {reason}")]
    InvalidRule { rule: String, reason: String },

    /// A UDP socket could not be bound.
    #[error("Failed to bind UDP port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// The port allocation record could not be read or written.
    #[error("Port allocation failed ({}): {source}", path.display())]
    Allocation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The port allocation record could not be locked.
    #[error("Failed to lock {}: {reason}", path.display())]
    Lock { path: PathBuf, reason: String },
}

impl Error {
    pub(crate) fn allocation(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Allocation {
            path: path.into(),
            source,
        }
    }
}
