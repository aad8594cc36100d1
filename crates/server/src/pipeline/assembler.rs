//! Streams a session's chunks into a single durable blob.

use super::error::{PipelineError, PipelineResult};
use depot_core::{ChunkNumber, ContentHash, ContentHasher, UploadSession};
use depot_storage::{ChunkStore, ObjectStore, StorageError, StreamingUpload};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;

/// What was published by [`ReleaseAssembler::assemble`].
#[derive(Clone, Debug)]
pub struct AssembledBlob {
    pub key: String,
    pub url: String,
    pub size: u64,
    pub hash: ContentHash,
}

/// Concatenates chunks `1..=N` in order into the blob store.
///
/// Bytes flow chunk by chunk from scratch storage into the blob upload, so
/// memory use is bounded by the chunk size rather than the file size.
#[derive(Clone)]
pub struct ReleaseAssembler {
    chunks: ChunkStore,
    blobs: Arc<dyn ObjectStore>,
}

impl ReleaseAssembler {
    pub fn new(chunks: ChunkStore, blobs: Arc<dyn ObjectStore>) -> Self {
        Self { chunks, blobs }
    }

    /// Assemble the session's chunks under `blob_key`.
    ///
    /// Each chunk is checked against the digest recorded when it was
    /// received. Nothing is published unless every chunk streams through
    /// intact; on any failure the partial upload is discarded.
    #[tracing::instrument(skip(self, session), fields(upload_id = %session.id))]
    pub async fn assemble(
        &self,
        session: &UploadSession,
        blob_key: &str,
    ) -> PipelineResult<AssembledBlob> {
        let start = Instant::now();
        let mut upload = self
            .blobs
            .put_stream(blob_key)
            .await
            .map_err(PipelineError::StorageWrite)?;

        let mut hasher = ContentHasher::default();
        if let Err(e) = self.copy_chunks(session, upload.as_mut(), &mut hasher).await {
            if let Err(abort_err) = upload.abort().await {
                tracing::warn!(error = %abort_err, "Failed to discard partial blob upload");
            }
            return Err(e);
        }

        let written = upload.finish().await.map_err(PipelineError::StorageWrite)?;
        let size = hasher.bytes_hashed();
        let hash = hasher.finalize();
        if written != size {
            tracing::warn!(written, hashed = size, "Blob backend reported unexpected size");
        }

        crate::metrics::ASSEMBLY_DURATION.observe(start.elapsed().as_secs_f64());
        tracing::info!(size, hash = %hash, "Assembled release blob");

        Ok(AssembledBlob {
            key: blob_key.to_string(),
            url: self.blobs.object_url(blob_key),
            size,
            hash,
        })
    }

    async fn copy_chunks(
        &self,
        session: &UploadSession,
        upload: &mut dyn StreamingUpload,
        hasher: &mut ContentHasher,
    ) -> PipelineResult<()> {
        for number in ChunkNumber::all(session.total_chunks) {
            let expected = session.received_chunks.get(&number).ok_or_else(|| {
                PipelineError::IncompleteUpload {
                    missing: vec![number.get()],
                }
            })?;

            let mut stream = match self.chunks.open_chunk(&session.id, number).await {
                Ok(stream) => stream,
                Err(StorageError::NotFound(_)) => {
                    return Err(PipelineError::IncompleteUpload {
                        missing: vec![number.get()],
                    });
                }
                Err(e) => return Err(PipelineError::Storage(e)),
            };

            let mut chunk_hasher = ContentHasher::default();
            while let Some(piece) = stream.next().await {
                let piece = piece.map_err(PipelineError::Storage)?;
                chunk_hasher.update(&piece);
                hasher.update(&piece);
                upload
                    .write(piece)
                    .await
                    .map_err(PipelineError::StorageWrite)?;
            }

            let actual_size = chunk_hasher.bytes_hashed();
            let actual = chunk_hasher.finalize();
            if actual_size != expected.size || actual != expected.hash {
                return Err(PipelineError::HashMismatch {
                    chunk: Some(number.get()),
                    expected: expected.hash.to_hex(),
                    actual: actual.to_hex(),
                });
            }
        }
        Ok(())
    }
}
