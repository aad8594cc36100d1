//! Integrity checks on an assembled blob.

use super::assembler::AssembledBlob;
use super::error::{PipelineError, PipelineResult};
use depot_core::ContentHash;
use depot_storage::ObjectStore;
use std::sync::Arc;

/// Compare what was assembled against what the client declared.
///
/// The hash is only checked when one was declared.
pub fn check(
    assembled_size: u64,
    assembled_hash: &ContentHash,
    declared_size: u64,
    declared_hash: Option<&ContentHash>,
) -> PipelineResult<()> {
    if assembled_size != declared_size {
        return Err(PipelineError::SizeMismatch {
            expected: declared_size,
            actual: assembled_size,
        });
    }
    match declared_hash {
        Some(declared) if declared != assembled_hash => Err(PipelineError::HashMismatch {
            chunk: None,
            expected: declared.to_hex(),
            actual: assembled_hash.to_hex(),
        }),
        _ => Ok(()),
    }
}

/// Verifies assembled blobs and discards the ones that fail.
#[derive(Clone)]
pub struct IntegrityVerifier {
    blobs: Arc<dyn ObjectStore>,
}

impl IntegrityVerifier {
    pub fn new(blobs: Arc<dyn ObjectStore>) -> Self {
        Self { blobs }
    }

    /// Check `blob` against the declared size and every declared hash.
    ///
    /// A failing blob is deleted before the error is returned, so no
    /// unverified bytes stay reachable under a release key.
    pub async fn verify(
        &self,
        blob: &AssembledBlob,
        declared_size: u64,
        declared_hashes: &[ContentHash],
    ) -> PipelineResult<()> {
        let result = check(blob.size, &blob.hash, declared_size, None).and_then(|()| {
            declared_hashes
                .iter()
                .try_for_each(|h| check(blob.size, &blob.hash, declared_size, Some(h)))
        });

        if let Err(e) = &result {
            crate::metrics::INTEGRITY_FAILURES.inc();
            tracing::warn!(blob_key = %blob.key, error = %e, "Assembled blob failed verification");
            if let Err(delete_err) = self.blobs.delete(&blob.key).await {
                tracing::error!(
                    blob_key = %blob.key,
                    error = %delete_err,
                    "Failed to delete unverified blob"
                );
            }
        }
        result
    }
}
