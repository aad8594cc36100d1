//! The chunked upload and release assembly pipeline.
//!
//! - [`session`]: session registry and state machine
//! - [`assembler`]: chunk concatenation into the blob store
//! - [`verifier`]: size and hash checks on the assembled blob
//! - [`catalog`]: release classification and metadata persistence
//! - [`janitor`]: background reclamation of sessions and chunks

pub mod assembler;
pub mod catalog;
pub mod error;
pub mod janitor;
pub mod session;
pub mod verifier;

pub use assembler::{AssembledBlob, ReleaseAssembler};
pub use catalog::{ReleaseCatalogWriter, ReleasePlan, ReleaseTarget};
pub use error::{PipelineError, PipelineResult};
pub use janitor::{SessionJanitor, SweepReport};
pub use session::{ChunkReceipt, UploadSessionManager};
pub use verifier::IntegrityVerifier;

use bytes::Bytes;
use dashmap::DashMap;
use depot_core::config::AppConfig;
use depot_core::{
    ChunkDigest, ChunkNumber, CompleteUploadRequest, ContentHash, ReleaseArtifact,
    StartUploadRequest, UploadId, UploadSession,
};
use depot_storage::{ChunkStore, ObjectStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Entry point for every upload operation.
pub struct UploadPipeline {
    sessions: Arc<UploadSessionManager>,
    chunks: ChunkStore,
    chunk_locks: ChunkWriteLocks,
    blobs: Arc<dyn ObjectStore>,
    assembler: ReleaseAssembler,
    verifier: IntegrityVerifier,
    catalog: ReleaseCatalogWriter,
    max_chunk_size: u64,
    completion_timeout: Duration,
}

impl UploadPipeline {
    pub fn new(
        config: &AppConfig,
        blobs: Arc<dyn ObjectStore>,
        chunks: ChunkStore,
        catalog: ReleaseCatalogWriter,
    ) -> Self {
        Self {
            sessions: Arc::new(UploadSessionManager::new(config.server.upload_timeout())),
            assembler: ReleaseAssembler::new(chunks.clone(), Arc::clone(&blobs)),
            verifier: IntegrityVerifier::new(Arc::clone(&blobs)),
            chunks,
            chunk_locks: ChunkWriteLocks::default(),
            blobs,
            catalog,
            max_chunk_size: config.server.max_chunk_size,
            completion_timeout: config.server.completion_timeout(),
        }
    }

    pub fn sessions(&self) -> &Arc<UploadSessionManager> {
        &self.sessions
    }

    pub fn chunks(&self) -> &ChunkStore {
        &self.chunks
    }

    pub fn catalog(&self) -> &ReleaseCatalogWriter {
        &self.catalog
    }

    #[tracing::instrument(skip_all, fields(file_name = %req.file_name, file_size = req.file_size))]
    pub fn start_upload(&self, req: &StartUploadRequest) -> PipelineResult<UploadSession> {
        let session = self.sessions.start_upload(req)?;
        crate::metrics::UPLOADS_STARTED.inc();
        tracing::info!(
            upload_id = %session.id,
            total_chunks = session.total_chunks,
            "Upload session started"
        );
        Ok(session)
    }

    pub fn get_upload(&self, id: &UploadId) -> PipelineResult<UploadSession> {
        self.sessions.get(id)
    }

    /// Store one chunk and record its receipt.
    #[tracing::instrument(skip_all, fields(upload_id = %id, chunk_number = chunk_number))]
    pub async fn upload_chunk(
        &self,
        id: &UploadId,
        chunk_number: u32,
        chunk_size: u64,
        data: Bytes,
    ) -> PipelineResult<ChunkReceipt> {
        let actual = data.len() as u64;
        if chunk_size == 0 {
            return Err(PipelineError::InvalidArgument(
                "chunk_size must be at least 1".to_string(),
            ));
        }
        if chunk_size != actual {
            return Err(PipelineError::InvalidArgument(format!(
                "chunk_size is {chunk_size} but {actual} bytes were sent"
            )));
        }
        if actual > self.max_chunk_size {
            return Err(PipelineError::InvalidArgument(format!(
                "chunk of {actual} bytes exceeds the maximum of {}",
                self.max_chunk_size
            )));
        }

        let number = self.sessions.admit_chunk(id, chunk_number, actual)?;
        let digest = ChunkDigest::of(&data);
        // Bytes and digest of one chunk must come from the same request.
        let write_lock = self.chunk_locks.acquire(*id, number).await;
        self.chunks
            .write_chunk(id, number, data)
            .await
            .map_err(PipelineError::StorageWrite)?;
        let receipt = self.sessions.record_chunk_received(id, number, digest)?;
        drop(write_lock);

        crate::metrics::CHUNKS_RECEIVED.inc();
        crate::metrics::CHUNK_BYTES_RECEIVED.inc_by(actual);
        tracing::debug!(
            chunk = %number,
            received = receipt.received_count,
            total = receipt.total_chunks,
            "Chunk received"
        );
        Ok(receipt)
    }

    /// Assemble, verify and record a completed upload.
    ///
    /// Exactly one caller per session gets past the `Completing`
    /// transition. Once past it, the session always ends `Completed` or
    /// `Aborted`, including when this future is dropped or times out.
    #[tracing::instrument(skip_all, fields(upload_id = %id, file_type = ?req.file_type))]
    pub async fn complete_upload(
        &self,
        id: &UploadId,
        req: &CompleteUploadRequest,
    ) -> PipelineResult<ReleaseArtifact> {
        let result = self.try_complete(id, req).await;
        match &result {
            Ok(artifact) => {
                crate::metrics::UPLOADS_COMPLETED.inc();
                tracing::info!(kind = artifact.kind_str(), "Upload completed");
            }
            Err(e) => {
                crate::metrics::record_completion_failure(e.code());
                tracing::warn!(error = %e, code = e.code(), "Upload completion failed");
            }
        }
        result
    }

    async fn try_complete(
        &self,
        id: &UploadId,
        req: &CompleteUploadRequest,
    ) -> PipelineResult<ReleaseArtifact> {
        let plan = ReleasePlan::from_request(req)?;
        let session = self.sessions.begin_completing(id)?;
        let blob_key = plan.blob_key(id);
        let guard = self.completion_guard(id, blob_key.clone());

        let work = self.assemble_and_record(&session, plan, &blob_key);
        let outcome = match tokio::time::timeout(self.completion_timeout, work).await {
            Ok(outcome) => outcome,
            Err(_) => Err(PipelineError::Timeout(self.completion_timeout)),
        };

        match outcome {
            Ok(artifact) => {
                guard.disarm();
                self.sessions.mark_completed(id)?;
                Ok(artifact)
            }
            Err(e) => guard.compensate(e).await,
        }
    }

    fn completion_guard(&self, id: &UploadId, blob_key: String) -> CompletionGuard {
        CompletionGuard {
            sessions: Arc::clone(&self.sessions),
            blobs: Arc::clone(&self.blobs),
            catalog: self.catalog.clone(),
            upload_id: *id,
            blob_key,
            armed: true,
        }
    }

    async fn assemble_and_record(
        &self,
        session: &UploadSession,
        plan: ReleasePlan,
        blob_key: &str,
    ) -> PipelineResult<ReleaseArtifact> {
        let blob = self.assembler.assemble(session, blob_key).await?;

        let declared: Vec<ContentHash> = session
            .declared_hash
            .into_iter()
            .chain(plan.declared_hash)
            .collect();
        self.verifier
            .verify(&blob, session.file_size, &declared)
            .await?;

        let artifact = plan.into_artifact(session.id, &blob);
        self.catalog.persist(&artifact).await?;
        Ok(artifact)
    }

    /// Client-requested abort of an open session. Its chunks are deleted
    /// right away.
    #[tracing::instrument(skip_all, fields(upload_id = %id))]
    pub async fn abort_upload(&self, id: &UploadId) -> PipelineResult<()> {
        self.sessions.abort(id)?;
        crate::metrics::UPLOADS_ABORTED.inc();
        match self.chunks.delete_upload(id).await {
            Ok(removed) => tracing::info!(removed, "Upload aborted"),
            // The janitor's orphan sweep picks these up later.
            Err(e) => tracing::warn!(error = %e, "Failed to delete chunks of aborted upload"),
        }
        Ok(())
    }
}

/// Keeps a session from being stranded in `Completing`.
///
/// If the completion future is dropped while armed, the session is marked
/// aborted and the blob deleted in the background.
struct CompletionGuard {
    sessions: Arc<UploadSessionManager>,
    blobs: Arc<dyn ObjectStore>,
    catalog: ReleaseCatalogWriter,
    upload_id: UploadId,
    blob_key: String,
    armed: bool,
}

impl CompletionGuard {
    fn disarm(mut self) {
        self.armed = false;
    }

    /// Undo a failed completion and hand back the outcome to report.
    ///
    /// A timeout whose catalog insert committed anyway is reported as the
    /// committed release.
    async fn compensate(mut self, error: PipelineError) -> PipelineResult<ReleaseArtifact> {
        self.armed = false;

        // Chunk data vanished from scratch storage: let the client resend.
        if let PipelineError::IncompleteUpload { missing } = &error {
            match self.sessions.reopen(&self.upload_id, missing) {
                Ok(()) => return Err(error),
                Err(e) => tracing::warn!(error = %e, "Failed to reopen upload session"),
            }
        }

        // A timed out catalog insert may still have committed.
        if matches!(error, PipelineError::Timeout(_)) {
            match self.catalog.release_for_upload(&self.upload_id).await {
                Ok(Some(artifact)) => {
                    tracing::warn!(
                        upload_id = %self.upload_id,
                        "Release committed despite timeout, keeping blob"
                    );
                    if let Err(e) = self.sessions.mark_completed(&self.upload_id) {
                        tracing::warn!(error = %e, "Failed to mark upload completed");
                    }
                    return Ok(artifact);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "Failed to look up release after timeout"),
            }
        }

        delete_blob(self.blobs.as_ref(), &self.blob_key).await;
        match self.sessions.mark_aborted(&self.upload_id) {
            Ok(()) => crate::metrics::UPLOADS_ABORTED.inc(),
            Err(e) => tracing::warn!(error = %e, "Failed to mark upload aborted"),
        }
        Err(error)
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        tracing::warn!(upload_id = %self.upload_id, "Completion cancelled, aborting upload");
        match self.sessions.mark_aborted(&self.upload_id) {
            Ok(()) => crate::metrics::UPLOADS_ABORTED.inc(),
            Err(e) => tracing::warn!(error = %e, "Failed to mark cancelled upload aborted"),
        }

        let blobs = Arc::clone(&self.blobs);
        let catalog = self.catalog.clone();
        let upload_id = self.upload_id;
        let blob_key = std::mem::take(&mut self.blob_key);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Ok(true) = catalog.has_release_for(&upload_id).await {
                        return;
                    }
                    delete_blob(blobs.as_ref(), &blob_key).await;
                });
            }
            Err(_) => tracing::error!(blob_key = %blob_key, "No runtime to delete blob of cancelled upload"),
        }
    }
}

/// Serialises writers of the same chunk.
#[derive(Default)]
struct ChunkWriteLocks {
    locks: Arc<DashMap<(UploadId, ChunkNumber), Arc<Mutex<()>>>>,
}

impl ChunkWriteLocks {
    async fn acquire(&self, id: UploadId, number: ChunkNumber) -> ChunkWriteGuard {
        let key = (id, number);
        let lock = Arc::clone(self.locks.entry(key).or_default().value());
        let guard = lock.lock_owned().await;
        ChunkWriteGuard {
            locks: Arc::clone(&self.locks),
            key,
            guard: Some(guard),
        }
    }
}

struct ChunkWriteGuard {
    locks: Arc<DashMap<(UploadId, ChunkNumber), Arc<Mutex<()>>>>,
    key: (UploadId, ChunkNumber),
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ChunkWriteGuard {
    fn drop(&mut self) {
        self.guard.take();
        // Only the map itself still holds the mutex once nobody waits on it.
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

async fn delete_blob(blobs: &dyn ObjectStore, key: &str) {
    match blobs.delete(key).await {
        Ok(()) => {
            crate::metrics::COMPENSATING_DELETES.inc();
            tracing::warn!(blob_key = %key, "Deleted blob of failed completion");
        }
        Err(e) => tracing::error!(blob_key = %key, error = %e, "Failed to delete blob of failed completion"),
    }
}
