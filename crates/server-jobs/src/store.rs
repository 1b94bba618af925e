// crates/server-jobs/src/store.rs
//! In-memory job registry.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use scarab_types::{AnalysisResult, JobError, JobStatus};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;

use crate::types::{Job, JobId, JobState};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Job {0} already exists")]
    DuplicateId(String),

    #[error("Job {0} not found")]
    NotFound(String),

    #[error("Job {id} is already {status}")]
    AlreadyTerminal { id: String, status: JobStatus },
}

/// Number of jobs per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct JobCounts {
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Process-local map from job id to job record.
///
/// The map is sharded, so operations on different ids never contend on the
/// same lock. Terminal transitions are guarded: a job leaves `Processing`
/// at most once.
pub struct JobStore {
    jobs: DashMap<JobId, Job>,
}

impl JobStore {
    pub fn new() -> Self {
        Self {
            jobs: DashMap::new(),
        }
    }

    /// Register a new job in `Processing` state with progress 0.
    ///
    /// Never overwrites: an existing id is reported as `DuplicateId`.
    pub fn create(&self, id: JobId, metadata: Map<String, Value>) -> Result<Job, StoreError> {
        match self.jobs.entry(id) {
            Entry::Occupied(entry) => Err(StoreError::DuplicateId(entry.key().to_string())),
            Entry::Vacant(entry) => {
                let job = Job::new(entry.key().clone(), metadata);
                entry.insert(job.clone());
                tracing::debug!(job_id = %job.id, "job created");
                Ok(job)
            }
        }
    }

    /// Snapshot of a job, if present.
    pub fn get(&self, id: &str) -> Option<Job> {
        self.jobs.get(id).map(|entry| entry.value().clone())
    }

    /// Mark a job completed with progress 100.
    pub fn complete(&self, id: &str, result: AnalysisResult) -> Result<Job, StoreError> {
        self.transition(id, JobState::Completed { result })
    }

    /// Mark a job failed.
    pub fn fail(&self, id: &str, error: JobError) -> Result<Job, StoreError> {
        self.transition(id, JobState::Failed { error })
    }

    fn transition(&self, id: &str, next: JobState) -> Result<Job, StoreError> {
        let mut entry = self
            .jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let current = entry.status();
        if current.is_terminal() {
            return Err(StoreError::AlreadyTerminal {
                id: id.to_string(),
                status: current,
            });
        }
        entry.state = next;
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    /// Delete every job older than `max_age`, whatever its status.
    /// Returns the number of evicted jobs.
    pub fn sweep(&self, max_age: Duration) -> usize {
        self.sweep_at(Utc::now(), max_age)
    }

    /// `sweep` against an explicit clock reading.
    pub fn sweep_at(&self, now: DateTime<Utc>, max_age: Duration) -> usize {
        let max_age = TimeDelta::from_std(max_age).unwrap_or(TimeDelta::MAX);
        let mut removed = 0;
        self.jobs.retain(|_, job| {
            let keep = now.signed_duration_since(job.created_at) <= max_age;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    /// All jobs, newest first.
    pub fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.iter().map(|e| e.value().clone()).collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        jobs
    }

    pub fn counts(&self) -> JobCounts {
        let mut counts = JobCounts::default();
        for entry in self.jobs.iter() {
            match entry.status() {
                JobStatus::Processing => counts.processing += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `sweep(max_age)` every `interval` until `cancel` fires.
///
/// The first sweep happens one full interval after start.
pub fn spawn_sweeper(
    store: Arc<JobStore>,
    interval: Duration,
    max_age: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("job sweeper stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }
            let removed = store.sweep(max_age);
            if removed > 0 {
                metrics::counter!("analysis_jobs_swept_total").increment(removed as u64);
                tracing::info!(removed, remaining = store.len(), "swept expired jobs");
            } else {
                tracing::debug!(remaining = store.len(), "job sweep: nothing expired");
            }
        }
    })
}
