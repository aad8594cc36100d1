//! In-memory registry of upload sessions.
//!
//! Every state transition happens under the session's own mutex, so the
//! check and the update are a single step. In particular
//! [`UploadSessionManager::begin_completing`] is a compare-and-set: of any
//! number of concurrent completion attempts exactly one observes `Open`.

use super::error::{PipelineError, PipelineResult};
use dashmap::DashMap;
use depot_core::{
    ChunkDigest, ChunkNumber, StartUploadRequest, UploadId, UploadSession, UploadStatus,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use time::OffsetDateTime;

/// Result of recording a chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkReceipt {
    pub chunk_number: ChunkNumber,
    pub received_count: u32,
    pub total_chunks: u32,
    pub complete: bool,
}

/// Owns the lifecycle of every upload session.
pub struct UploadSessionManager {
    sessions: DashMap<UploadId, Arc<Mutex<UploadSession>>>,
    ttl: time::Duration,
}

fn lock(entry: &Mutex<UploadSession>) -> MutexGuard<'_, UploadSession> {
    // Transitions never panic half-way, so a poisoned session is still consistent.
    entry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Transition an open session past its expiry to `Expired`.
fn expire_if_due(session: &mut UploadSession, now: OffsetDateTime) -> bool {
    if session.status == UploadStatus::Open && session.is_expired_at(now) {
        session.set_status(UploadStatus::Expired);
        crate::metrics::OPEN_SESSIONS.dec();
        tracing::info!(upload_id = %session.id, "Upload session expired");
        return true;
    }
    false
}

/// Require an open, unexpired session.
fn require_open(
    session: &mut UploadSession,
    now: OffsetDateTime,
    operation: &'static str,
) -> PipelineResult<()> {
    expire_if_due(session, now);
    match session.status {
        UploadStatus::Open => Ok(()),
        UploadStatus::Expired => Err(PipelineError::Expired(session.id)),
        status => Err(PipelineError::InvalidState {
            id: session.id,
            status,
            operation,
        }),
    }
}

/// Size the received set would have after storing `size` bytes as `number`.
fn projected_bytes(session: &UploadSession, number: ChunkNumber, size: u64) -> u64 {
    let replaced = session.received_chunks.get(&number).map_or(0, |d| d.size);
    session.received_bytes() - replaced + size
}

impl UploadSessionManager {
    /// Create a manager whose sessions expire `ttl` after they start.
    pub fn new(ttl: time::Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    fn entry(&self, id: &UploadId) -> PipelineResult<Arc<Mutex<UploadSession>>> {
        self.sessions
            .get(id)
            .map(|e| Arc::clone(e.value()))
            .ok_or(PipelineError::NotFound(*id))
    }

    /// Validate a start request and register a new open session.
    pub fn start_upload(&self, req: &StartUploadRequest) -> PipelineResult<UploadSession> {
        let session = UploadSession::new(req, self.ttl)?;
        self.sessions
            .insert(session.id, Arc::new(Mutex::new(session.clone())));
        crate::metrics::OPEN_SESSIONS.inc();
        Ok(session)
    }

    /// Snapshot of a session. An open session past its expiry reports `Expired`.
    pub fn get(&self, id: &UploadId) -> PipelineResult<UploadSession> {
        let entry = self.entry(id)?;
        let mut session = lock(&entry);
        expire_if_due(&mut session, OffsetDateTime::now_utc());
        Ok(session.clone())
    }

    /// Check that a chunk of `size` bytes may be stored as `number`.
    ///
    /// Called before the chunk bytes are written so that a rejected chunk
    /// never overwrites an earlier good one.
    pub fn admit_chunk(&self, id: &UploadId, number: u32, size: u64) -> PipelineResult<ChunkNumber> {
        let entry = self.entry(id)?;
        let mut session = lock(&entry);
        require_open(&mut session, OffsetDateTime::now_utc(), "accept chunks")?;
        let number = ChunkNumber::new(number, session.total_chunks)?;
        let projected = projected_bytes(&session, number, size);
        if projected > session.file_size {
            return Err(PipelineError::InvalidArgument(format!(
                "chunk {number} would bring the upload to {projected} bytes, declared size is {}",
                session.file_size
            )));
        }
        Ok(number)
    }

    /// Mark a chunk as received. Re-recording a number replaces its digest.
    pub fn record_chunk_received(
        &self,
        id: &UploadId,
        number: ChunkNumber,
        digest: ChunkDigest,
    ) -> PipelineResult<ChunkReceipt> {
        let entry = self.entry(id)?;
        let mut session = lock(&entry);
        require_open(&mut session, OffsetDateTime::now_utc(), "accept chunks")?;
        let projected = projected_bytes(&session, number, digest.size);
        if projected > session.file_size {
            return Err(PipelineError::InvalidArgument(format!(
                "chunk {number} would bring the upload to {projected} bytes, declared size is {}",
                session.file_size
            )));
        }
        session.record_chunk(number, digest);

        Ok(ChunkReceipt {
            chunk_number: number,
            received_count: session.received_chunks.len() as u32,
            total_chunks: session.total_chunks,
            complete: session.is_complete(),
        })
    }

    /// True iff every chunk of the session has been received.
    pub fn is_complete(&self, id: &UploadId) -> PipelineResult<bool> {
        let entry = self.entry(id)?;
        let session = lock(&entry);
        Ok(session.is_complete())
    }

    /// Atomically move an open, complete session to `Completing`.
    ///
    /// Returns the snapshot the completion works from. An incomplete session
    /// stays `Open` so the client can keep uploading.
    pub fn begin_completing(&self, id: &UploadId) -> PipelineResult<UploadSession> {
        let entry = self.entry(id)?;
        let mut session = lock(&entry);
        expire_if_due(&mut session, OffsetDateTime::now_utc());
        match session.status {
            UploadStatus::Open => {}
            UploadStatus::Completing => return Err(PipelineError::AlreadyCompleting(*id)),
            UploadStatus::Expired => return Err(PipelineError::Expired(*id)),
            status @ (UploadStatus::Completed | UploadStatus::Aborted) => {
                return Err(PipelineError::InvalidState {
                    id: *id,
                    status,
                    operation: "complete",
                });
            }
        }
        if !session.is_complete() {
            return Err(PipelineError::IncompleteUpload {
                missing: session.missing_chunks(),
            });
        }
        session.set_status(UploadStatus::Completing);
        crate::metrics::OPEN_SESSIONS.dec();
        Ok(session.clone())
    }

    /// Finish a completion: `Completing -> Completed`.
    pub fn mark_completed(&self, id: &UploadId) -> PipelineResult<()> {
        self.finish_completing(id, UploadStatus::Completed)
    }

    /// Give up a completion: `Completing -> Aborted`.
    pub fn mark_aborted(&self, id: &UploadId) -> PipelineResult<()> {
        self.finish_completing(id, UploadStatus::Aborted)
    }

    fn finish_completing(&self, id: &UploadId, status: UploadStatus) -> PipelineResult<()> {
        let entry = self.entry(id)?;
        let mut session = lock(&entry);
        if session.status != UploadStatus::Completing {
            return Err(PipelineError::InvalidState {
                id: *id,
                status: session.status,
                operation: "finish completion",
            });
        }
        session.set_status(status);
        Ok(())
    }

    /// Hand a session back to the client after its chunk data turned out to
    /// be missing: `Completing -> Open`, forgetting the listed chunks.
    pub fn reopen(&self, id: &UploadId, missing: &[u32]) -> PipelineResult<()> {
        let entry = self.entry(id)?;
        let mut session = lock(&entry);
        if session.status != UploadStatus::Completing {
            return Err(PipelineError::InvalidState {
                id: *id,
                status: session.status,
                operation: "reopen",
            });
        }
        let total = session.total_chunks;
        for n in missing {
            if let Ok(number) = ChunkNumber::new(*n, total) {
                session.received_chunks.remove(&number);
            }
        }
        session.set_status(UploadStatus::Open);
        crate::metrics::OPEN_SESSIONS.inc();
        Ok(())
    }

    /// Client-requested abort. Only an open session can be aborted this way.
    pub fn abort(&self, id: &UploadId) -> PipelineResult<()> {
        let entry = self.entry(id)?;
        let mut session = lock(&entry);
        require_open(&mut session, OffsetDateTime::now_utc(), "abort")?;
        session.set_status(UploadStatus::Aborted);
        crate::metrics::OPEN_SESSIONS.dec();
        Ok(())
    }

    /// Whether the registry still holds a session.
    pub fn contains(&self, id: &UploadId) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Remove every session that no longer needs to be kept.
    ///
    /// Open sessions past their expiry and expired sessions go immediately.
    /// Completed and aborted sessions are kept for `grace` after their last
    /// transition so clients can still read their final status. Sessions
    /// that are `Completing` are never removed.
    pub fn take_sweepable(
        &self,
        now: OffsetDateTime,
        grace: time::Duration,
    ) -> Vec<UploadSession> {
        let sweepable = |session: &mut UploadSession| {
            expire_if_due(session, now);
            match session.status {
                UploadStatus::Expired => true,
                UploadStatus::Completed | UploadStatus::Aborted => {
                    session.updated_at + grace <= now
                }
                UploadStatus::Open | UploadStatus::Completing => false,
            }
        };

        let ids: Vec<UploadId> = self.sessions.iter().map(|e| *e.key()).collect();
        let mut removed = Vec::new();
        for id in ids {
            if let Some((_, entry)) = self
                .sessions
                .remove_if(&id, |_, entry| sweepable(&mut lock(entry)))
            {
                removed.push(lock(&entry).clone());
            }
        }
        removed
    }
}
