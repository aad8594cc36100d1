//! Upload control plane handlers.

use super::{parse_upload_id, read_json};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use depot_core::{
    ChunkReceivedResponse, CompleteUploadRequest, ReleaseArtifact, StartUploadRequest,
    StartUploadResponse, UploadStatusResponse,
};
use serde::Deserialize;

/// POST /v1/uploads - Start an upload session.
#[tracing::instrument(skip_all)]
pub async fn start_upload(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<(StatusCode, Json<StartUploadResponse>)> {
    let body: StartUploadRequest = read_json(req.into_body()).await?;
    let session = state.pipeline.start_upload(&body)?;

    Ok((
        StatusCode::CREATED,
        Json(StartUploadResponse {
            upload_id: session.id.to_string(),
            total_chunks: session.total_chunks,
            expires_at: session.expires_at,
        }),
    ))
}

/// GET /v1/uploads/{upload_id} - Get upload session status.
#[tracing::instrument(skip(state))]
pub async fn get_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> ApiResult<Json<UploadStatusResponse>> {
    let upload_id = parse_upload_id(&upload_id)?;
    let session = state.pipeline.get_upload(&upload_id)?;
    Ok(Json(UploadStatusResponse::from(&session)))
}

/// Query parameters of a chunk upload.
#[derive(Debug, Deserialize)]
pub struct ChunkParams {
    /// Declared byte length of the chunk.
    pub chunk_size: Option<String>,
}

/// PUT /v1/uploads/{upload_id}/chunks/{chunk_number}?chunk_size=N - Upload a chunk.
#[tracing::instrument(skip(state, params, req))]
pub async fn upload_chunk(
    State(state): State<AppState>,
    Path((upload_id, chunk_number)): Path<(String, String)>,
    Query(params): Query<ChunkParams>,
    req: Request,
) -> ApiResult<Json<ChunkReceivedResponse>> {
    let upload_id = parse_upload_id(&upload_id)?;
    let chunk_number: u32 = chunk_number
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("invalid chunk number: {e}")))?;
    let chunk_size: u64 = params
        .chunk_size
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("chunk_size query parameter is required".into()))?
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("invalid chunk_size: {e}")))?;

    // One byte over the limit is enough to tell an oversized chunk apart.
    let max_chunk_size = usize::try_from(state.config.server.max_chunk_size).unwrap_or(usize::MAX);
    let data = axum::body::to_bytes(req.into_body(), max_chunk_size.saturating_add(1))
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read chunk: {e}")))?;

    let receipt = state
        .pipeline
        .upload_chunk(&upload_id, chunk_number, chunk_size, data)
        .await?;

    Ok(Json(ChunkReceivedResponse {
        chunk_number: receipt.chunk_number.get(),
        received_count: receipt.received_count,
        total_chunks: receipt.total_chunks,
        complete: receipt.complete,
    }))
}

/// POST /v1/uploads/{upload_id}/complete - Assemble and publish the upload.
#[tracing::instrument(skip(state, req))]
pub async fn complete_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
    req: Request,
) -> ApiResult<(StatusCode, Json<ReleaseArtifact>)> {
    let upload_id = parse_upload_id(&upload_id)?;
    let body: CompleteUploadRequest = read_json(req.into_body()).await?;
    let artifact = state.pipeline.complete_upload(&upload_id, &body).await?;
    Ok((StatusCode::CREATED, Json(artifact)))
}

/// DELETE /v1/uploads/{upload_id} - Abort an open upload.
#[tracing::instrument(skip(state))]
pub async fn abort_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> ApiResult<StatusCode> {
    let upload_id = parse_upload_id(&upload_id)?;
    state.pipeline.abort_upload(&upload_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
