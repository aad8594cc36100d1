//! Server test utilities.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use bytes::Bytes;
use depot_core::config::{AppConfig, MetadataConfig, StorageConfig};
use depot_metadata::{MetadataStore, SqliteStore};
use depot_server::{AppState, create_router};
use depot_storage::{FilesystemBackend, MemoryBackend, ObjectStore};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    /// Chunk store backend, shared with the server for tampering.
    pub scratch: MemoryBackend,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with temporary storage.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        Self::build(|blobs| blobs, modifier).await
    }

    /// Create a test server whose blob store is wrapped by `wrap`.
    pub async fn build<W, F>(wrap: W, modifier: F) -> Self
    where
        W: FnOnce(Arc<dyn ObjectStore>) -> Arc<dyn ObjectStore>,
        F: FnOnce(&mut AppConfig),
    {
        depot_server::metrics::register_metrics();
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let blob_path = temp_dir.path().join("releases");
        let blobs: Arc<dyn ObjectStore> = Arc::new(
            FilesystemBackend::new(&blob_path)
                .await
                .expect("Failed to create blob store"),
        );
        let blobs = wrap(blobs);

        let scratch = MemoryBackend::new();

        let db_path = temp_dir.path().join("catalog.db");
        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(&db_path, None)
                .await
                .expect("Failed to create metadata store"),
        );

        let mut config = AppConfig::for_testing();
        config.storage = StorageConfig::Filesystem { path: blob_path };
        config.metadata = MetadataConfig::Sqlite {
            path: db_path,
            query_timeout_secs: None,
        };
        modifier(&mut config);

        let state = AppState::new(config, blobs, Arc::new(scratch.clone()), metadata);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            scratch,
            _temp_dir: temp_dir,
        }
    }

    /// Get access to the underlying metadata.
    pub fn metadata(&self) -> Arc<dyn MetadataStore> {
        self.state.metadata.clone()
    }

    /// Get access to the blob store.
    pub fn blobs(&self) -> Arc<dyn ObjectStore> {
        self.state.blobs.clone()
    }

    /// Start an upload and return its id.
    pub async fn start_upload(&self, file_size: usize, total_chunks: usize) -> String {
        let (status, body) = json_request(
            &self.router,
            "POST",
            "/v1/uploads",
            Some(super::fixtures::start_body("game.zip", file_size, total_chunks)),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "start failed: {body}");
        body["upload_id"].as_str().unwrap().to_string()
    }

    /// Upload one chunk, declaring its actual size.
    pub async fn put_chunk(&self, upload_id: &str, number: u32, data: Bytes) -> (StatusCode, Value) {
        let uri = format!(
            "/v1/uploads/{upload_id}/chunks/{number}?chunk_size={}",
            data.len()
        );
        raw_request(&self.router, "PUT", &uri, Body::from(data)).await
    }

    /// Upload every chunk in order, asserting success.
    pub async fn put_chunks(&self, upload_id: &str, chunks: &[Bytes]) {
        for (i, chunk) in chunks.iter().enumerate() {
            let (status, body) = self.put_chunk(upload_id, i as u32 + 1, chunk.clone()).await;
            assert_eq!(status, StatusCode::OK, "chunk {} failed: {body}", i + 1);
        }
    }

    /// Request completion of an upload.
    pub async fn complete(&self, upload_id: &str, body: Value) -> (StatusCode, Value) {
        json_request(
            &self.router,
            "POST",
            &format!("/v1/uploads/{upload_id}/complete"),
            Some(body),
        )
        .await
    }

    /// Fetch an upload's status.
    pub async fn upload_status(&self, upload_id: &str) -> (StatusCode, Value) {
        json_request(&self.router, "GET", &format!("/v1/uploads/{upload_id}"), None).await
    }
}

/// Helper to make JSON requests.
#[allow(dead_code)]
pub async fn json_request(
    router: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let body = match body {
        Some(v) => Body::from(serde_json::to_vec(&v).unwrap()),
        None => Body::empty(),
    };
    raw_request(router, method, uri, body).await
}

/// Send a request and decode the response body as JSON (or `Null`).
#[allow(dead_code)]
pub async fn raw_request(
    router: &axum::Router,
    method: &str,
    uri: &str,
    body: Body,
) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(body)
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let json: Value = if body_bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
    };

    (status, json)
}
