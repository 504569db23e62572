//! Collaborator error types.

use thiserror::Error;

/// Result type for calls into native collaborators.
pub type SourceResult<T> = Result<T, SourceError>;

/// A non-success status returned by the native chat kernel.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("status {status}: {message}")]
pub struct SourceError {
    pub status: i32,
    pub message: String,
}

impl SourceError {
    pub fn new(status: i32, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}
