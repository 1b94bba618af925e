// crates/types/src/responses.rs
//! JSON bodies of the submission and status endpoints.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::analysis::{AnalysisResult, JobError};
use crate::status::JobStatus;

/// Body returned by `POST /api/v1/analysis/analyze-file`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub success: bool,
    pub job_id: String,
    pub status: JobStatus,
    pub message: String,
}

impl SubmitResponse {
    pub fn accepted(job_id: impl Into<String>) -> Self {
        Self {
            success: true,
            job_id: job_id.into(),
            status: JobStatus::Processing,
            message: "Analysis started".to_string(),
        }
    }
}

/// Body returned by `GET /api/v1/analysis/status/{job_id}`.
///
/// For a completed job the fields of [`AnalysisResult`] are spread at the
/// top level next to `jobId` and `status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub success: bool,
    pub job_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(flatten)]
    pub result: Option<AnalysisResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobStatusError>,
}

/// `error` field of a status body: the stored job error, or the lookup
/// failure text for unknown ids.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum JobStatusError {
    Job(JobError),
    Lookup(&'static str),
}

impl JobStatusResponse {
    pub fn not_found(job_id: impl Into<String>) -> Self {
        Self {
            success: false,
            job_id: job_id.into(),
            status: None,
            progress: None,
            result: None,
            error: Some(JobStatusError::Lookup("not found")),
        }
    }

    pub fn processing(job_id: impl Into<String>, progress: u8) -> Self {
        Self {
            success: true,
            job_id: job_id.into(),
            status: Some(JobStatus::Processing),
            progress: Some(progress),
            result: None,
            error: None,
        }
    }

    pub fn completed(job_id: impl Into<String>, result: AnalysisResult) -> Self {
        Self {
            success: true,
            job_id: job_id.into(),
            status: Some(JobStatus::Completed),
            progress: None,
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(job_id: impl Into<String>, error: JobError) -> Self {
        Self {
            success: false,
            job_id: job_id.into(),
            status: Some(JobStatus::Failed),
            progress: None,
            result: None,
            error: Some(JobStatusError::Job(error)),
        }
    }
}

/// Client-side view of a status body.
///
/// Lenient on purpose: every field is optional so that not-found bodies,
/// failed bodies and completed bodies with spread result fields all decode.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub status: Option<JobStatus>,
    #[serde(default)]
    pub progress: Option<u8>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
}
