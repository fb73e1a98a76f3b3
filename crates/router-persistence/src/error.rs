//! Error types for session persistence.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by session stores.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Failed to read the session file.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write the session file.
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create the directory holding the session file.
    #[error("failed to create directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Session data could not be encoded or decoded.
    #[error("invalid session JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A conversation key was empty.
    #[error("conversation key must not be empty")]
    EmptyKey,
}

/// Result type alias for persistence operations.
pub type Result<T> = std::result::Result<T, PersistenceError>;
