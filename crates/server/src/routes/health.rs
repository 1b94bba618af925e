// crates/server/src/routes/health.rs
//! Health check endpoint for the API.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use scarab_server_jobs::JobCounts;
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

/// Response for the health check endpoint.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub jobs: JobCounts,
}

/// GET /api/health - Health check endpoint.
///
/// Returns server status, version, uptime and job counts per status.
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    responses((status = 200, body = HealthResponse))
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.uptime_secs(),
        jobs: state.store.counts(),
    })
}

/// Create the health routes router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health_check))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "ok".to_string(),
            version: "0.3.0".to_string(),
            uptime_secs: 42,
            jobs: JobCounts {
                processing: 1,
                completed: 2,
                failed: 0,
            },
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"status\":\"ok\""));
        assert!(json.contains("\"uptimeSecs\":42"));
        assert!(json.contains("\"jobs\":{\"processing\":1,\"completed\":2,\"failed\":0}"));
    }
}
