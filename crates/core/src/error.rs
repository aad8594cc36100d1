//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("invalid upload id: {0}")]
    InvalidUploadId(String),

    #[error("invalid chunk number {number} (expected 1..={total})")]
    InvalidChunkNumber { number: u32, total: u32 },

    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("invalid platform: {0}")]
    InvalidPlatform(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Shorthand for a field validation failure.
    pub fn field(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
