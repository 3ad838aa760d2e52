//! Error types for Parley core library.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using Parley Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for Parley operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Agent event parsing error
    #[error("Failed to parse agent event: {0}")]
    EventParse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Exchange record could not be decoded
    #[error("Malformed exchange record {path}: {reason}")]
    MalformedRecord { path: PathBuf, reason: String },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
