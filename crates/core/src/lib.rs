//! Core domain types for the depot release upload pipeline.
//!
//! This crate defines the data model shared by every other crate:
//! - Upload session identity, lifecycle and snapshots
//! - Per-chunk digests and content hashing
//! - Release artifacts (full versions, addon versions, patches)
//! - Request/response DTOs for the HTTP binding
//! - Application configuration

pub mod chunk;
pub mod config;
pub mod error;
pub mod hash;
pub mod release;
pub mod upload;

pub use chunk::{ChunkDigest, ChunkNumber};
pub use error::{Error, Result};
pub use hash::{ContentHash, ContentHasher};
pub use release::{
    FileType, PatchRelease, Platform, ProductFile, ReleaseArtifact, UpdateReleaseRequest,
    VersionKind, VersionRelease,
};
pub use upload::{
    ChunkReceivedResponse, CompleteUploadRequest, StartUploadRequest, StartUploadResponse,
    UploadId, UploadSession, UploadStatus, UploadStatusResponse,
};

/// Default maximum chunk size: 64 MiB
pub const DEFAULT_MAX_CHUNK_SIZE: u64 = 64 * 1024 * 1024;
