// crates/server/src/openapi.rs
//! OpenAPI document for the HTTP API, served at `GET /api/openapi.json`.

use std::sync::Arc;

use axum::{routing::get, Json, Router};
use utoipa::OpenApi;

use crate::routes;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(title = "scarab analysis API", description = "Asynchronous SEO keyword analysis jobs"),
    paths(
        routes::health::health_check,
        routes::analysis::analyze_file,
        routes::jobs::job_status,
        routes::jobs::list_jobs,
        routes::download::download,
    ),
    components(schemas(
        scarab_types::SubmitResponse,
        scarab_types::AnalysisResult,
        scarab_types::JobError,
        scarab_types::ErrorDetail,
        scarab_types::JobStatus,
        scarab_types::FilterOption,
        scarab_server_jobs::JobSummary,
        scarab_server_jobs::JobCounts,
        crate::error::ErrorResponse,
        routes::analysis::AnalyzeFileRequest,
        routes::jobs::JobListResponse,
        routes::health::HealthResponse,
    )),
    tags(
        (name = "analysis", description = "Job submission, status and downloads"),
        (name = "health", description = "Liveness"),
    )
)]
pub struct ApiDoc;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/openapi.json", get(openapi_json))
}
