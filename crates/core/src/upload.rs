//! Upload session types and lifecycle.

use crate::chunk::{ChunkDigest, ChunkNumber};
use crate::hash::ContentHash;
use crate::release::{FileType, Platform};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Unique identifier for an upload session.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadId(Uuid);

impl UploadId {
    /// Generate a new random upload ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from a string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| crate::Error::InvalidUploadId(format!("{s:?}: {e}")))
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UploadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UploadId({})", self.0)
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Upload session status.
///
/// Transitions only `Open -> Completing -> Completed`, or from any
/// non-terminal status to `Aborted`/`Expired`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    /// Session is open and accepting chunks.
    Open,
    /// A completion attempt holds the session.
    Completing,
    /// Session was consumed into a release artifact.
    Completed,
    /// Session was aborted by the client or by a failed completion.
    Aborted,
    /// Session passed its expiry without completing.
    Expired,
}

impl UploadStatus {
    /// Check if the session can still receive chunks.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Check if the session reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted | Self::Expired)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Completing => "completing",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-side state of one chunked upload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadSession {
    /// Unique session identifier.
    pub id: UploadId,
    /// File name supplied by the client at start.
    pub file_name: String,
    /// Declared total size in bytes.
    pub file_size: u64,
    /// Declared number of chunks.
    pub total_chunks: u32,
    pub content_type: String,
    pub owner_id: Uuid,
    /// Whole-file hash declared at start, if the client knew it.
    pub declared_hash: Option<ContentHash>,
    /// Current status.
    pub status: UploadStatus,
    /// Chunks received so far, keyed by chunk number.
    pub received_chunks: BTreeMap<ChunkNumber, ChunkDigest>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the status or received set last changed.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl UploadSession {
    /// Validate a start request and build a new open session.
    pub fn new(req: &StartUploadRequest, expires_in: time::Duration) -> crate::Result<Self> {
        if req.file_name.trim().is_empty() {
            return Err(crate::Error::field("file_name", "must not be empty"));
        }
        if req.content_type.trim().is_empty() {
            return Err(crate::Error::field("content_type", "must not be empty"));
        }
        if req.file_size == 0 {
            return Err(crate::Error::field("file_size", "must be at least 1"));
        }
        if req.total_chunks == 0 {
            return Err(crate::Error::field("total_chunks", "must be at least 1"));
        }
        if u64::from(req.total_chunks) > req.file_size {
            return Err(crate::Error::field(
                "total_chunks",
                format!(
                    "{} chunks cannot hold {} bytes with every chunk non-empty",
                    req.total_chunks, req.file_size
                ),
            ));
        }
        let owner_id = Uuid::parse_str(&req.owner_id)
            .map_err(|e| crate::Error::field("owner_id", e.to_string()))?;
        let declared_hash = req
            .sha256
            .as_deref()
            .map(ContentHash::from_hex)
            .transpose()?;

        let now = OffsetDateTime::now_utc();
        Ok(Self {
            id: UploadId::new(),
            file_name: req.file_name.clone(),
            file_size: req.file_size,
            total_chunks: req.total_chunks,
            content_type: req.content_type.clone(),
            owner_id,
            declared_hash,
            status: UploadStatus::Open,
            received_chunks: BTreeMap::new(),
            created_at: now,
            updated_at: now,
            expires_at: now + expires_in,
        })
    }

    /// Check if the session has passed its expiry.
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now > self.expires_at
    }

    /// True iff every chunk number in `1..=total_chunks` has been received.
    pub fn is_complete(&self) -> bool {
        self.received_chunks.len() == self.total_chunks as usize
            && ChunkNumber::all(self.total_chunks).all(|n| self.received_chunks.contains_key(&n))
    }

    /// Sum of the sizes of the received chunks.
    pub fn received_bytes(&self) -> u64 {
        self.received_chunks.values().map(|d| d.size).sum()
    }

    /// Chunk numbers not yet received, ascending.
    pub fn missing_chunks(&self) -> Vec<u32> {
        ChunkNumber::all(self.total_chunks)
            .filter(|n| !self.received_chunks.contains_key(n))
            .map(|n| n.get())
            .collect()
    }

    /// Record a chunk, replacing any earlier digest for the same number.
    pub fn record_chunk(&mut self, number: ChunkNumber, digest: ChunkDigest) {
        self.received_chunks.insert(number, digest);
        self.updated_at = OffsetDateTime::now_utc();
    }

    /// Move to a new status, stamping `updated_at`.
    pub fn set_status(&mut self, status: UploadStatus) {
        self.status = status;
        self.updated_at = OffsetDateTime::now_utc();
    }
}

/// Request to start an upload session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StartUploadRequest {
    pub file_name: String,
    /// Declared total size in bytes.
    pub file_size: u64,
    pub total_chunks: u32,
    /// Owning account (UUID).
    pub owner_id: String,
    pub content_type: String,
    /// Whole-file SHA-256 (hex), if known up front.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// Response from starting an upload session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StartUploadResponse {
    pub upload_id: String,
    pub total_chunks: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

/// Acknowledgement of a received chunk.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChunkReceivedResponse {
    pub chunk_number: u32,
    /// Distinct chunks received so far.
    pub received_count: u32,
    pub total_chunks: u32,
    /// Whether every chunk is now present.
    pub complete: bool,
}

/// Response from querying an upload session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadStatusResponse {
    pub upload_id: String,
    pub status: UploadStatus,
    pub file_name: String,
    pub file_size: u64,
    pub total_chunks: u32,
    pub received_chunks: Vec<u32>,
    pub missing_chunks: Vec<u32>,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl From<&UploadSession> for UploadStatusResponse {
    fn from(session: &UploadSession) -> Self {
        Self {
            upload_id: session.id.to_string(),
            status: session.status,
            file_name: session.file_name.clone(),
            file_size: session.file_size,
            total_chunks: session.total_chunks,
            received_chunks: session.received_chunks.keys().map(|n| n.get()).collect(),
            missing_chunks: session.missing_chunks(),
            expires_at: session.expires_at,
        }
    }
}

/// Request to complete an upload into a release artifact.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompleteUploadRequest {
    /// Base game the release belongs to.
    pub game_id: String,
    pub platform: Platform,
    /// Required for full and addon versions.
    #[serde(default)]
    pub version: String,
    /// Name the assembled file is published under.
    pub final_file_name: String,
    pub file_type: FileType,
    /// Required for addon releases.
    #[serde(default)]
    pub addon_id: Option<String>,
    /// Required for patches.
    #[serde(default)]
    pub from_version: Option<String>,
    /// Required for patches.
    #[serde(default)]
    pub to_version: Option<String>,
    #[serde(default)]
    pub changelog: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub release_date: Option<OffsetDateTime>,
    /// Whole-file SHA-256 (hex) the assembled blob must match.
    #[serde(default)]
    pub sha256: Option<String>,
}
