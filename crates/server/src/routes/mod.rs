//! API route handlers for the scarab server.

pub mod analysis;
pub mod download;
pub mod health;
pub mod jobs;
pub mod metrics;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Create the combined API router.
///
/// Routes:
/// - GET  /api/health - Health check with job counts
/// - GET  /api/openapi.json - OpenAPI document
/// - POST /api/v1/analysis/analyze-file - Submit an analysis job
/// - GET  /api/v1/analysis/status/{job_id} - Poll a job
/// - GET  /api/v1/analysis/jobs - List all jobs
/// - GET  /api/v1/analysis/download/{filename} - Download a result workbook
/// - GET  /metrics - Prometheus metrics
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", health::router())
        .nest("/api", crate::openapi::router())
        .nest("/api/v1", analysis::router())
        .nest("/api/v1", jobs::router())
        .nest("/api/v1", download::router())
        .merge(metrics::router())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scarab_server_jobs::RunnerConfig;

    #[tokio::test]
    async fn test_api_routes_creation() {
        let state = AppState::with_runner_config("uploads".into(), RunnerConfig::new("sh", "results"));
        let _router = api_routes(state);
    }
}
