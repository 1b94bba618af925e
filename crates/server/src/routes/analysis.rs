// crates/server/src/routes/analysis.rs
//! Job submission endpoint.
//!
//! - POST /api/v1/analysis/analyze-file
//!
//! Accepts either a multipart upload (`file` + optional `filterOption`) or a
//! JSON body naming a file already in the uploads directory. Input problems
//! are answered synchronously; everything after job creation happens in the
//! background and is reported through the status endpoint.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{FromRequest, Multipart, Request, State},
    http::{header, StatusCode},
    routing::post,
    Json, Router,
};
use rand::{distributions::Alphanumeric, Rng};
use scarab_server_jobs::paths::{is_plain_file_name, sanitize_file_name};
use scarab_server_jobs::{JobId, JobSpec};
use scarab_types::{FilterOption, SubmitResponse};
use serde::Deserialize;
use serde_json::{json, Map};
use utoipa::ToSchema;

use crate::error::{ApiError, ApiResult, ErrorResponse};
use crate::state::AppState;

const NO_INPUT: &str = "No file uploaded or filename provided";
const UPLOAD_NOT_FOUND: &str = "Uploaded file not found";

/// JSON form of a submission: reference an already-uploaded file.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeFileRequest {
    /// Stored name of the file inside the uploads directory.
    pub filename: Option<String>,
    /// `all` (default) or `recommended`.
    pub filter_option: Option<String>,
}

/// An input file ready for the runner.
struct StagedInput {
    original_name: String,
    stored_name: String,
}

/// Start an analysis job.
#[utoipa::path(
    post,
    path = "/api/v1/analysis/analyze-file",
    tag = "analysis",
    request_body(
        content = AnalyzeFileRequest,
        description = "JSON reference to an uploaded file, or multipart/form-data with `file` and `filterOption`"
    ),
    responses(
        (status = 202, description = "Job created and started", body = SubmitResponse),
        (status = 400, description = "Missing input, unknown filterOption, or unknown file", body = ErrorResponse),
        (status = 413, description = "Upload exceeds the body limit", body = ErrorResponse),
        (status = 415, description = "Neither multipart nor JSON", body = ErrorResponse),
        (status = 500, description = "Analyzer not available", body = ErrorResponse),
    )
)]
pub async fn analyze_file(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let runner_config = state.runner.config();
    if !runner_config.analyzer_available() {
        let analyzer = runner_config
            .script
            .as_ref()
            .unwrap_or(&runner_config.program)
            .display()
            .to_string();
        return Err(ApiError::AnalyzerUnavailable(analyzer));
    }

    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase());

    let (input, filter) = match content_type.as_deref() {
        Some(ct) if ct.starts_with("multipart/form-data") => {
            let multipart = Multipart::from_request(request, &state)
                .await
                .map_err(|e| ApiError::from_rejection(e.status(), e.body_text()))?;
            stage_upload(&state, multipart).await?
        }
        Some(ct) if ct.starts_with("application/json") => {
            let Json(body) = Json::<AnalyzeFileRequest>::from_request(request, &state)
                .await
                .map_err(|e| ApiError::from_rejection(e.status(), e.body_text()))?;
            stage_reference(&state, body).await?
        }
        None => return Err(ApiError::BadRequest(NO_INPUT.into())),
        Some(other) => return Err(ApiError::UnsupportedMediaType(other.to_string())),
    };

    let job_id = JobId::generate();
    let mut metadata = Map::new();
    metadata.insert("originalName".into(), json!(input.original_name));
    metadata.insert("inputFile".into(), json!(input.stored_name));
    metadata.insert("filterOption".into(), json!(filter.as_str()));
    state
        .store
        .create(job_id.clone(), metadata)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    metrics::counter!("analysis_jobs_submitted_total").increment(1);
    tracing::info!(
        job_id = %job_id,
        input = %input.stored_name,
        filter = %filter,
        "analysis job submitted"
    );

    // Detached: the runner records the outcome in the store.
    let _ = state.runner.submit(JobSpec {
        id: job_id.clone(),
        input: state.uploads_dir.join(&input.stored_name),
        filter,
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse::accepted(job_id.to_string())),
    ))
}

fn parse_filter(raw: Option<&str>) -> ApiResult<FilterOption> {
    match raw {
        None => Ok(FilterOption::default()),
        Some(raw) => FilterOption::from_str(raw.trim()).map_err(|e| ApiError::BadRequest(e.to_string())),
    }
}

/// Read a multipart upload, validate it, then persist the file.
async fn stage_upload(
    state: &AppState,
    mut multipart: Multipart,
) -> ApiResult<(StagedInput, FilterOption)> {
    let mut file = None;
    let mut filter_raw = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::from_rejection(e.status(), e.body_text()))?
    {
        match field.name() {
            Some("file") => {
                let original_name = field
                    .file_name()
                    .filter(|name| !name.is_empty())
                    .unwrap_or("upload")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::from_rejection(e.status(), e.body_text()))?;
                file = Some((original_name, bytes));
            }
            Some("filterOption") => {
                filter_raw = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::from_rejection(e.status(), e.body_text()))?,
                );
            }
            other => {
                tracing::debug!(field = ?other, "ignoring multipart field");
            }
        }
    }

    let filter = parse_filter(filter_raw.as_deref())?;
    let Some((original_name, bytes)) = file else {
        return Err(ApiError::BadRequest(NO_INPUT.into()));
    };

    let stored_name = stored_file_name(&original_name);
    tokio::fs::write(state.uploads_dir.join(&stored_name), &bytes).await?;
    tracing::debug!(stored = %stored_name, bytes = bytes.len(), "upload stored");

    Ok((
        StagedInput {
            original_name,
            stored_name,
        },
        filter,
    ))
}

/// Validate a JSON reference to a file already in the uploads directory.
async fn stage_reference(
    state: &AppState,
    body: AnalyzeFileRequest,
) -> ApiResult<(StagedInput, FilterOption)> {
    let filter = parse_filter(body.filter_option.as_deref())?;
    let filename = match body.filename {
        Some(name) if !name.is_empty() => name,
        _ => return Err(ApiError::BadRequest(NO_INPUT.into())),
    };
    if !is_plain_file_name(&filename) {
        tracing::warn!(filename = %filename, "rejected non-plain file reference");
        return Err(ApiError::BadRequest(UPLOAD_NOT_FOUND.into()));
    }
    match tokio::fs::metadata(state.uploads_dir.join(&filename)).await {
        Ok(meta) if meta.is_file() => {}
        _ => return Err(ApiError::BadRequest(UPLOAD_NOT_FOUND.into())),
    }

    Ok((
        StagedInput {
            original_name: filename.clone(),
            stored_name: filename,
        },
        filter,
    ))
}

/// `{millis}-{rand6}-{sanitized}`: unique per upload, safe to join.
fn stored_file_name(original: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!(
        "{}-{}-{}",
        chrono::Utc::now().timestamp_millis(),
        suffix,
        sanitize_file_name(original)
    )
}

/// Create the analysis submission router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/analysis/analyze-file", post(analyze_file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_file_name_shape() {
        let name = stored_file_name("my keywords.csv");
        let parts: Vec<&str> = name.splitn(3, '-').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts[0].parse::<i64>().is_ok());
        assert_eq!(parts[1].len(), 6);
        assert_eq!(parts[2], "my_keywords.csv");
        assert!(is_plain_file_name(&name));
    }

    #[test]
    fn test_stored_file_names_differ() {
        assert_ne!(stored_file_name("a.csv"), stored_file_name("a.csv"));
    }

    #[test]
    fn test_parse_filter() {
        assert_eq!(parse_filter(None).unwrap(), FilterOption::All);
        assert_eq!(parse_filter(Some("recommended")).unwrap(), FilterOption::Recommended);
        assert!(matches!(
            parse_filter(Some("everything")),
            Err(ApiError::BadRequest(_))
        ));
    }
}
