//! Health check handler.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub blob_backend: &'static str,
    pub scratch_backend: &'static str,
}

/// GET /v1/health - Check blob store, chunk store and catalog.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    state
        .blobs
        .health_check()
        .await
        .map_err(|e| ApiError::Unavailable(format!("blob store: {e}")))?;
    state
        .chunks
        .health_check()
        .await
        .map_err(|e| ApiError::Unavailable(format!("chunk store: {e}")))?;
    state
        .metadata
        .health_check()
        .await
        .map_err(|e| ApiError::Unavailable(format!("metadata store: {e}")))?;

    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        blob_backend: state.blobs.backend_name(),
        scratch_backend: state.chunks.backend().backend_name(),
    }))
}
