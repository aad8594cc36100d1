//! Scratch storage for the chunks of in-flight uploads.
//!
//! Chunks are addressed by `(upload_id, chunk_number)` and stored under
//! `uploads/{upload_id}/chunks/{chunk_number:08}` in any [`ObjectStore`].
//! Each write replaces the previous bytes for that slot atomically, so
//! concurrent writes to different chunk numbers need no coordination.

use crate::error::StorageResult;
use crate::traits::{ByteStream, ObjectStore};
use bytes::Bytes;
use depot_core::chunk::chunk_prefix;
use depot_core::{ChunkNumber, UploadId};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, instrument};

const UPLOADS_PREFIX: &str = "uploads/";

/// Chunk scratch area layered over an object store.
#[derive(Clone)]
pub struct ChunkStore {
    store: Arc<dyn ObjectStore>,
}

impl ChunkStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// The underlying object store.
    pub fn backend(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Persist one chunk, overwriting any earlier bytes for the same number.
    #[instrument(skip(self, data), fields(upload_id = %upload_id, chunk = %number, size = data.len()))]
    pub async fn write_chunk(
        &self,
        upload_id: &UploadId,
        number: ChunkNumber,
        data: Bytes,
    ) -> StorageResult<()> {
        self.store
            .put(&number.to_object_key(upload_id), data)
            .await
    }

    /// Open one chunk for streaming. Missing chunks yield `NotFound`.
    pub async fn open_chunk(
        &self,
        upload_id: &UploadId,
        number: ChunkNumber,
    ) -> StorageResult<ByteStream> {
        self.store
            .get_stream(&number.to_object_key(upload_id))
            .await
    }

    pub async fn has_chunk(&self, upload_id: &UploadId, number: ChunkNumber) -> StorageResult<bool> {
        self.store.exists(&number.to_object_key(upload_id)).await
    }

    /// Delete every chunk of an upload. Returns how many objects were removed.
    #[instrument(skip(self), fields(upload_id = %upload_id))]
    pub async fn delete_upload(&self, upload_id: &UploadId) -> StorageResult<usize> {
        let keys = self.store.list(&chunk_prefix(upload_id)).await?;
        for key in &keys {
            self.store.delete(key).await?;
        }
        debug!(removed = keys.len(), "deleted upload chunks");
        Ok(keys.len())
    }

    /// Upload ids that currently own at least one chunk.
    ///
    /// Keys that do not follow the chunk layout are ignored.
    pub async fn list_uploads(&self) -> StorageResult<BTreeSet<UploadId>> {
        let keys = self.store.list(UPLOADS_PREFIX).await?;
        Ok(keys
            .iter()
            .filter_map(|key| parse_upload_id(key))
            .collect())
    }

    pub async fn health_check(&self) -> StorageResult<()> {
        self.store.health_check().await
    }
}

fn parse_upload_id(key: &str) -> Option<UploadId> {
    let rest = key.strip_prefix(UPLOADS_PREFIX)?;
    let (id, tail) = rest.split_once('/')?;
    if !tail.starts_with("chunks/") {
        return None;
    }
    UploadId::parse(id).ok()
}
