//! Route configuration.

use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::routing::{get, patch, post, put};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/v1/health", get(handlers::health_check))
        // Upload pipeline
        .route("/v1/uploads", post(handlers::start_upload))
        .route(
            "/v1/uploads/{upload_id}",
            get(handlers::get_upload).delete(handlers::abort_upload),
        )
        .route(
            "/v1/uploads/{upload_id}/chunks/{chunk_number}",
            put(handlers::upload_chunk),
        )
        .route(
            "/v1/uploads/{upload_id}/complete",
            post(handlers::complete_upload),
        )
        // Release catalog
        .route(
            "/v1/releases/{product_id}/{platform}",
            get(handlers::list_releases),
        )
        .route(
            "/v1/releases/{product_id}/{platform}/{version}",
            get(handlers::get_release),
        )
        .route(
            "/v1/releases/versions/{version_id}",
            patch(handlers::update_release),
        )
        .route(
            "/v1/patches/{product_id}/{platform}/{name}",
            get(handlers::get_patch),
        );

    let mut router = Router::new().merge(api_routes);

    // When enabled, keep this endpoint reachable by the scraper only.
    if state.config.server.metrics_enabled {
        let metrics_routes = Router::new().route("/metrics", get(metrics_handler));
        router = router.merge(metrics_routes);
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
