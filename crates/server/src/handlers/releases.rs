//! Release catalog read and edit handlers.

use super::{parse_platform, read_json};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Query, Request, State};
use depot_core::{PatchRelease, ReleaseArtifact, UpdateReleaseRequest};
use serde::Deserialize;
use uuid::Uuid;

/// GET /v1/releases/{product_id}/{platform} - List versions, newest first.
#[tracing::instrument(skip(state))]
pub async fn list_releases(
    State(state): State<AppState>,
    Path((product_id, platform)): Path<(String, String)>,
) -> ApiResult<Json<Vec<ReleaseArtifact>>> {
    let platform = parse_platform(&platform)?;
    let releases = state
        .pipeline
        .catalog()
        .list_releases(&product_id, platform)
        .await?;
    Ok(Json(releases))
}

/// GET /v1/releases/{product_id}/{platform}/{version} - Latest release of a version.
#[tracing::instrument(skip(state))]
pub async fn get_release(
    State(state): State<AppState>,
    Path((product_id, platform, version)): Path<(String, String, String)>,
) -> ApiResult<Json<ReleaseArtifact>> {
    let platform = parse_platform(&platform)?;
    state
        .pipeline
        .catalog()
        .get_release_by_version(&product_id, platform, &version)
        .await?
        .map(Json)
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "no release {version} of {product_id} for {platform}"
            ))
        })
}

/// PATCH /v1/releases/versions/{version_id} - Edit changelog or release date.
#[tracing::instrument(skip(state, req))]
pub async fn update_release(
    State(state): State<AppState>,
    Path(version_id): Path<String>,
    req: Request,
) -> ApiResult<Json<ReleaseArtifact>> {
    let version_id = Uuid::parse_str(&version_id)
        .map_err(|e| ApiError::BadRequest(format!("invalid version ID: {e}")))?;
    let body: UpdateReleaseRequest = read_json(req.into_body()).await?;

    state
        .pipeline
        .catalog()
        .update_release_details(version_id, &body)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("version {version_id} not found")))
}

/// Optional version endpoints narrowing a patch lookup.
#[derive(Debug, Default, Deserialize)]
pub struct PatchParams {
    pub from_version: Option<String>,
    pub to_version: Option<String>,
}

/// GET /v1/patches/{product_id}/{platform}/{name} - Latest patch by name.
#[tracing::instrument(skip(state))]
pub async fn get_patch(
    State(state): State<AppState>,
    Path((product_id, platform, name)): Path<(String, String, String)>,
    Query(params): Query<PatchParams>,
) -> ApiResult<Json<PatchRelease>> {
    let platform = parse_platform(&platform)?;
    state
        .pipeline
        .catalog()
        .get_patch(
            &product_id,
            platform,
            &name,
            params.from_version.as_deref(),
            params.to_version.as_deref(),
        )
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("patch {name} of {product_id} not found")))
}
