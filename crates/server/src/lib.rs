//! HTTP server for depot, the chunked upload and release assembly service.
//!
//! This crate provides:
//! - The upload pipeline (sessions, assembly, verification, catalog writes)
//! - The background session janitor
//! - The HTTP/JSON binding and Prometheus metrics

pub mod error;
pub mod handlers;
pub mod metrics;
pub mod pipeline;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use pipeline::{PipelineError, UploadPipeline};
pub use routes::create_router;
pub use state::AppState;
