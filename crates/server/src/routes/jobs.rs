// crates/server/src/routes/jobs.rs
//! Job status and listing endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use scarab_server_jobs::{JobCounts, JobState, JobSummary};
use scarab_types::JobStatusResponse;
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct JobListResponse {
    pub success: bool,
    pub counts: JobCounts,
    pub jobs: Vec<JobSummary>,
}

/// GET /api/v1/analysis/status/{job_id}
///
/// Read-only. Unknown ids are 404, failed jobs 422, everything else 200.
#[utoipa::path(
    get,
    path = "/api/v1/analysis/status/{job_id}",
    tag = "analysis",
    params(("job_id" = String, Path, description = "Id returned by the submission endpoint")),
    responses(
        (status = 200, description = "Job processing, or completed with result fields at top level"),
        (status = 404, description = "Unknown or expired job id"),
        (status = 422, description = "Job failed; `error` holds the reason"),
    )
)]
pub async fn job_status(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> (StatusCode, Json<JobStatusResponse>) {
    let Some(job) = state.store.get(&job_id) else {
        tracing::debug!(job_id = %job_id, "status requested for unknown job");
        return (
            StatusCode::NOT_FOUND,
            Json(JobStatusResponse::not_found(job_id)),
        );
    };

    match job.state {
        JobState::Processing { progress } => (
            StatusCode::OK,
            Json(JobStatusResponse::processing(job_id, progress)),
        ),
        JobState::Completed { result } => (
            StatusCode::OK,
            Json(JobStatusResponse::completed(job_id, result)),
        ),
        JobState::Failed { error } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(JobStatusResponse::failed(job_id, error)),
        ),
    }
}

/// GET /api/v1/analysis/jobs - all jobs, newest first, without result payloads.
#[utoipa::path(
    get,
    path = "/api/v1/analysis/jobs",
    tag = "analysis",
    responses((status = 200, description = "Job summaries and per-status counts", body = JobListResponse))
)]
pub async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<JobListResponse> {
    let jobs = state.store.list().iter().map(|job| job.summary()).collect();
    Json(JobListResponse {
        success: true,
        counts: state.store.counts(),
        jobs,
    })
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/analysis/status/{job_id}", get(job_status))
        .route("/analysis/jobs", get(list_jobs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use pretty_assertions::assert_eq;
    use scarab_server_jobs::{JobId, RunnerConfig};
    use scarab_types::{AnalysisResult, JobError};
    use serde_json::{json, Map, Value};
    use std::path::PathBuf;
    use tower::ServiceExt;

    fn app() -> (Arc<AppState>, Router) {
        let state = AppState::with_runner_config(
            PathBuf::from("uploads"),
            RunnerConfig::new("sh", "results"),
        );
        let app = Router::new().nest("/api/v1", router()).with_state(state.clone());
        (state, app)
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_unknown_job_is_404() {
        let (_, app) = app();
        let (status, body) = get(app, "/api/v1/analysis/status/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let json: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(
            json,
            json!({"success": false, "jobId": "nope", "error": "not found"})
        );
    }

    #[tokio::test]
    async fn test_processing_job() {
        let (state, app) = app();
        state.store.create(JobId::from("p1"), Map::new()).unwrap();

        let (status, body) = get(app, "/api/v1/analysis/status/p1").await;
        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(
            json,
            json!({"success": true, "jobId": "p1", "status": "processing", "progress": 0})
        );
    }

    #[tokio::test]
    async fn test_completed_job_spreads_result() {
        let (state, app) = app();
        state.store.create(JobId::from("c1"), Map::new()).unwrap();
        state
            .store
            .complete(
                "c1",
                AnalysisResult {
                    message: "Analysis completed successfully".into(),
                    download_url: "/api/v1/analysis/download/out.xlsx".into(),
                    excel_file: "out.xlsx".into(),
                    data_source: None,
                    summary: json!({"total_keywords": 2}),
                    onpage_results: vec![],
                    keyword_mapping: vec![json!({"keyword": "shoes"})],
                },
            )
            .unwrap();

        let (status, body) = get(app, "/api/v1/analysis/status/c1").await;
        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["status"], "completed");
        assert_eq!(json["excelFile"], "out.xlsx");
        assert_eq!(json["downloadUrl"], "/api/v1/analysis/download/out.xlsx");
        assert_eq!(json["summary"]["total_keywords"], 2);
        assert_eq!(json["keywordMapping"][0]["keyword"], "shoes");
        assert!(json.get("error").is_none());
    }

    #[tokio::test]
    async fn test_failed_job_is_422() {
        let (state, app) = app();
        state.store.create(JobId::from("f1"), Map::new()).unwrap();
        state
            .store
            .fail("f1", JobError::message("no output produced"))
            .unwrap();

        let (status, body) = get(app, "/api/v1/analysis/status/f1").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let json: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(
            json,
            json!({"success": false, "jobId": "f1", "status": "failed", "error": "no output produced"})
        );
    }

    #[tokio::test]
    async fn test_status_reads_are_idempotent() {
        let (state, app) = app();
        state.store.create(JobId::from("i1"), Map::new()).unwrap();
        state
            .store
            .fail("i1", JobError::detailed("execution failed", "boom"))
            .unwrap();

        let (_, first) = get(app.clone(), "/api/v1/analysis/status/i1").await;
        for _ in 0..5 {
            let (_, again) = get(app.clone(), "/api/v1/analysis/status/i1").await;
            assert_eq!(again, first);
        }
        assert_eq!(state.store.len(), 1);
    }

    #[tokio::test]
    async fn test_list_jobs() {
        let (state, app) = app();
        state.store.create(JobId::from("a"), Map::new()).unwrap();
        state.store.create(JobId::from("b"), Map::new()).unwrap();
        state.store.fail("b", JobError::message("timeout")).unwrap();

        let (status, body) = get(app, "/api/v1/analysis/jobs").await;
        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["counts"], json!({"processing": 1, "completed": 0, "failed": 1}));
        assert_eq!(json["jobs"].as_array().unwrap().len(), 2);
    }
}
