//! Object storage abstraction and backends for depot.
//!
//! This crate provides:
//! - The [`ObjectStore`] contract for durable release blobs
//! - Backends: local filesystem and in-memory
//! - [`ChunkStore`], the scratch area holding chunks of in-flight uploads

pub mod backends;
pub mod chunk_store;
pub mod error;
pub mod traits;

pub use backends::{filesystem::FilesystemBackend, memory::MemoryBackend};
pub use chunk_store::ChunkStore;
pub use error::{StorageError, StorageResult};
pub use traits::{ByteStream, ObjectMeta, ObjectStore, StreamingUpload};

use depot_core::config::StorageConfig;
use std::sync::Arc;

/// Create an object store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    match config {
        StorageConfig::Filesystem { path } => {
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
        StorageConfig::Memory => Ok(Arc::new(MemoryBackend::new())),
    }
}
