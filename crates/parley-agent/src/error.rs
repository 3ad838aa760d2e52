//! Emitter error types.

use std::time::Duration;

use thiserror::Error;

/// Why a request produced no usable response.
///
/// Every variant is answered fail-closed by the emitter.
#[derive(Debug, Error)]
pub enum EmitterError {
    /// The host did not answer in time.
    #[error("No response within {0:?}")]
    Timeout(Duration),

    /// The request could not be delivered.
    #[error("Failed to send request: {0}")]
    Write(#[source] parley_core::Error),

    /// The response could not be decoded.
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// The response belongs to another sub-protocol.
    #[error("Expected a {expected} response, got {got}")]
    Mismatch {
        expected: &'static str,
        got: &'static str,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
