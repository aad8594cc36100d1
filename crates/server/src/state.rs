//! Application state shared across handlers.

use crate::pipeline::{ReleaseCatalogWriter, SessionJanitor, UploadPipeline};
use depot_core::config::AppConfig;
use depot_metadata::MetadataStore;
use depot_storage::{ChunkStore, ObjectStore};
use std::sync::Arc;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Durable store for release blobs.
    pub blobs: Arc<dyn ObjectStore>,
    /// Scratch area for chunks of in-flight uploads.
    pub chunks: ChunkStore,
    /// Release catalog.
    pub metadata: Arc<dyn MetadataStore>,
    /// Upload pipeline.
    pub pipeline: Arc<UploadPipeline>,
}

impl AppState {
    /// Create new application state.
    pub fn new(
        config: AppConfig,
        blobs: Arc<dyn ObjectStore>,
        scratch: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        let chunks = ChunkStore::new(scratch);
        let catalog = ReleaseCatalogWriter::new(Arc::clone(&metadata));
        let pipeline = UploadPipeline::new(&config, Arc::clone(&blobs), chunks.clone(), catalog);
        Self {
            config: Arc::new(config),
            blobs,
            chunks,
            metadata,
            pipeline: Arc::new(pipeline),
        }
    }

    /// Build the janitor over this state's session registry and chunk store.
    pub fn janitor(&self) -> SessionJanitor {
        SessionJanitor::new(
            Arc::clone(self.pipeline.sessions()),
            self.chunks.clone(),
            &self.config.janitor,
        )
    }
}
