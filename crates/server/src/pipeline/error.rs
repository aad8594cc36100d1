//! Upload pipeline error taxonomy.

use depot_core::{UploadId, UploadStatus};
use depot_metadata::MetadataError;
use depot_storage::StorageError;
use std::time::Duration;

/// Errors surfaced by the upload pipeline.
///
/// Every variant maps to a stable string code (see [`PipelineError::code`])
/// so callers can branch on the failure kind without parsing messages.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("upload session {0} not found")]
    NotFound(UploadId),

    #[error("upload session {0} has expired")]
    Expired(UploadId),

    #[error("upload session {id} is {status}, cannot {operation}")]
    InvalidState {
        id: UploadId,
        status: UploadStatus,
        operation: &'static str,
    },

    #[error("upload incomplete: missing chunks {missing:?}")]
    IncompleteUpload { missing: Vec<u32> },

    #[error("upload session {0} is already completing")]
    AlreadyCompleting(UploadId),

    #[error("hash mismatch{}: expected {expected}, got {actual}", chunk_label(.chunk))]
    HashMismatch {
        /// Set when a single chunk failed its digest check.
        chunk: Option<u32>,
        expected: String,
        actual: String,
    },

    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("storage write failed: {0}")]
    StorageWrite(#[source] StorageError),

    #[error("storage error: {0}")]
    Storage(#[source] StorageError),

    #[error("catalog error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("completion timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

fn chunk_label(chunk: &Option<u32>) -> String {
    match chunk {
        Some(n) => format!(" in chunk {n}"),
        None => String::new(),
    }
}

impl PipelineError {
    /// Stable error code for programmatic handling.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::NotFound(_) => "not_found",
            Self::Expired(_) => "expired",
            Self::InvalidState { .. } => "invalid_state",
            Self::IncompleteUpload { .. } => "incomplete_upload",
            Self::AlreadyCompleting(_) => "already_completing",
            Self::HashMismatch { .. } => "hash_mismatch",
            Self::SizeMismatch { .. } => "size_mismatch",
            Self::StorageWrite(_) => "storage_write_error",
            Self::Storage(_) => "storage_error",
            Self::Metadata(_) => "metadata_error",
            Self::Timeout(_) => "timeout",
        }
    }

    /// Whether the failure means the assembled bytes cannot be trusted.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(self, Self::HashMismatch { .. } | Self::SizeMismatch { .. })
    }
}

impl From<depot_core::Error> for PipelineError {
    fn from(e: depot_core::Error) -> Self {
        Self::InvalidArgument(e.to_string())
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
