//! Fault-injecting object store for failure-path tests.

use async_trait::async_trait;
use bytes::Bytes;
use depot_storage::{
    ByteStream, ObjectMeta, ObjectStore, StorageError, StorageResult, StreamingUpload,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Switches controlling which operations fail.
#[derive(Default)]
pub struct Faults {
    /// `put_stream` itself is rejected.
    pub reject_put_stream: AtomicBool,
    /// Streaming writes are rejected.
    pub reject_writes: AtomicBool,
    /// `finish` is rejected.
    pub reject_finish: AtomicBool,
    /// Streaming writes sleep this many milliseconds first.
    pub write_delay_ms: AtomicUsize,
    /// Number of `delete` calls observed.
    pub deletes: AtomicUsize,
}

/// Wraps another store and injects failures controlled by [`Faults`].
#[derive(Clone)]
#[allow(dead_code)]
pub struct FaultyStore {
    inner: Arc<dyn ObjectStore>,
    pub faults: Arc<Faults>,
}

#[allow(dead_code)]
impl FaultyStore {
    pub fn new(inner: Arc<dyn ObjectStore>) -> Self {
        Self {
            inner,
            faults: Arc::new(Faults::default()),
        }
    }

    pub fn reject_writes(&self) {
        self.faults.reject_writes.store(true, Ordering::SeqCst);
    }

    pub fn reject_finish(&self) {
        self.faults.reject_finish.store(true, Ordering::SeqCst);
    }

    pub fn reject_put_stream(&self) {
        self.faults.reject_put_stream.store(true, Ordering::SeqCst);
    }

    pub fn slow_writes(&self, delay: Duration) {
        self.faults
            .write_delay_ms
            .store(delay.as_millis() as usize, Ordering::SeqCst);
    }

    pub fn delete_count(&self) -> usize {
        self.faults.deletes.load(Ordering::SeqCst)
    }
}

fn injected() -> StorageError {
    StorageError::Backend("injected failure".to_string())
}

#[async_trait]
impl ObjectStore for FaultyStore {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(key).await
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        self.inner.head(key).await
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.inner.get(key).await
    }

    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        self.inner.get_stream(key).await
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        if self.faults.reject_writes.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.put(key, data).await
    }

    async fn put_stream(&self, key: &str) -> StorageResult<Box<dyn StreamingUpload>> {
        if self.faults.reject_put_stream.load(Ordering::SeqCst) {
            return Err(injected());
        }
        let upload = self.inner.put_stream(key).await?;
        Ok(Box::new(FaultyUpload {
            inner: upload,
            faults: Arc::clone(&self.faults),
        }))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.faults.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.inner.list(prefix).await
    }

    fn object_url(&self, key: &str) -> String {
        self.inner.object_url(key)
    }

    fn backend_name(&self) -> &'static str {
        "faulty"
    }
}

struct FaultyUpload {
    inner: Box<dyn StreamingUpload>,
    faults: Arc<Faults>,
}

#[async_trait]
impl StreamingUpload for FaultyUpload {
    async fn write(&mut self, data: Bytes) -> StorageResult<()> {
        let delay = self.faults.write_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }
        if self.faults.reject_writes.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.write(data).await
    }

    async fn finish(self: Box<Self>) -> StorageResult<u64> {
        if self.faults.reject_finish.load(Ordering::SeqCst) {
            self.inner.abort().await?;
            return Err(injected());
        }
        self.inner.finish().await
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        self.inner.abort().await
    }
}
