// crates/server-jobs/src/types.rs
//! Job records held by the store.

use std::borrow::Borrow;
use std::fmt;

use chrono::{DateTime, Utc};
use scarab_types::{AnalysisResult, JobError, JobStatus};
use serde::Serialize;
use serde_json::{Map, Value};
use utoipa::ToSchema;

/// Unique identifier of an analysis job.
///
/// Generated as a ULID (millisecond timestamp + 80 random bits), so ids are
/// unique in practice and sort by creation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Borrow<str> for JobId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state. A result or an error exists only once the job has left
/// `Processing`, and never both.
#[derive(Debug, Clone, PartialEq)]
pub enum JobState {
    Processing { progress: u8 },
    Completed { result: AnalysisResult },
    Failed { error: JobError },
}

impl JobState {
    pub fn status(&self) -> JobStatus {
        match self {
            JobState::Processing { .. } => JobStatus::Processing,
            JobState::Completed { .. } => JobStatus::Completed,
            JobState::Failed { .. } => JobStatus::Failed,
        }
    }
}

/// One asynchronous unit of analysis work.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: JobId,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Free-form fields supplied at creation (original file name, filter).
    pub metadata: Map<String, Value>,
}

impl Job {
    pub(crate) fn new(id: JobId, metadata: Map<String, Value>) -> Self {
        let now = Utc::now();
        Self {
            id,
            state: JobState::Processing { progress: 0 },
            created_at: now,
            updated_at: now,
            metadata,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.state.status()
    }

    pub fn progress(&self) -> u8 {
        match &self.state {
            JobState::Processing { progress } => *progress,
            JobState::Completed { .. } => 100,
            JobState::Failed { .. } => 0,
        }
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        match &self.state {
            JobState::Completed { result } => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&JobError> {
        match &self.state {
            JobState::Failed { error } => Some(error),
            _ => None,
        }
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary {
            job_id: self.id.to_string(),
            status: self.status(),
            progress: self.progress(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            metadata: self.metadata.clone(),
            error: self.error().cloned(),
        }
    }
}

/// Monitoring view of a job, without the (possibly large) result payload.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub job_id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[schema(value_type = Object)]
    pub metadata: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
}
