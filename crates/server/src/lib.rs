// crates/server/src/lib.rs
//! scarab server library.
//!
//! Axum HTTP server that accepts keyword exports, runs the external analyzer
//! for each one as a background job, and serves job status and the resulting
//! workbooks.

pub mod config;
pub mod error;
pub mod metrics;
pub mod openapi;
pub mod routes;
pub mod state;

pub use config::{LogFormat, ServerConfig};
pub use error::*;
pub use routes::api_routes;
pub use state::AppState;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method, StatusCode, Uri},
    Json, Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the Axum application with all routes and middleware.
///
/// This sets up:
/// - API routes (health, analysis jobs, downloads, metrics)
/// - JSON 404 for unknown routes
/// - CORS restricted to `cors_origins`
/// - Request body limit and request tracing
pub fn create_app(state: Arc<AppState>, cors_origins: &[String]) -> Router {
    let body_limit = state.max_upload_bytes;

    api_routes(state)
        .fallback(route_not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin = %origin, error = %e, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

async fn route_not_found(uri: Uri) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::new(format!("This route {} not found.", uri.path()))),
    )
}

// ============================================================================
// Integration Tests
// ============================================================================
