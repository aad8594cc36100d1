//! HTTP request handlers.

pub mod health;
pub mod releases;
pub mod uploads;

pub use health::*;
pub use releases::*;
pub use uploads::*;

use crate::error::{ApiError, ApiResult};
use axum::body::Body;
use depot_core::{Platform, UploadId};
use serde::de::DeserializeOwned;

/// Maximum size of a JSON request body (1 MiB).
const MAX_JSON_BODY_SIZE: usize = 1024 * 1024;

pub(crate) fn parse_upload_id(raw: &str) -> ApiResult<UploadId> {
    UploadId::parse(raw).map_err(|e| ApiError::BadRequest(e.to_string()))
}

pub(crate) fn parse_platform(raw: &str) -> ApiResult<Platform> {
    raw.parse::<Platform>()
        .map_err(|e| ApiError::BadRequest(e.to_string()))
}

/// Read and deserialize a JSON body, reporting failures as bad requests.
pub(crate) async fn read_json<T: DeserializeOwned>(body: Body) -> ApiResult<T> {
    let bytes = axum::body::to_bytes(body, MAX_JSON_BODY_SIZE)
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read body: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::BadRequest(format!("invalid JSON: {e}")))
}
