// crates/server/src/state.rs
//! Application state for the Axum server.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use scarab_server_jobs::{JobRunner, JobStore, RunnerConfig};

use crate::config::ServerConfig;

const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    /// Every job the process knows about.
    pub store: Arc<JobStore>,
    /// Runs analyzer processes and records their outcomes into `store`.
    pub runner: JobRunner,
    pub uploads_dir: PathBuf,
    /// Request body limit applied to submissions.
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> Arc<Self> {
        let store = Arc::new(JobStore::new());
        Self::build(
            store,
            config.uploads_dir.clone(),
            config.runner_config(),
            config.max_upload_bytes(),
        )
    }

    /// Build state around a fresh store with an explicit runner config.
    pub fn with_runner_config(uploads_dir: PathBuf, runner_config: RunnerConfig) -> Arc<Self> {
        Self::with_upload_limit(uploads_dir, runner_config, DEFAULT_MAX_UPLOAD_BYTES)
    }

    pub fn with_upload_limit(
        uploads_dir: PathBuf,
        runner_config: RunnerConfig,
        max_upload_bytes: usize,
    ) -> Arc<Self> {
        Self::build(
            Arc::new(JobStore::new()),
            uploads_dir,
            runner_config,
            max_upload_bytes,
        )
    }

    fn build(
        store: Arc<JobStore>,
        uploads_dir: PathBuf,
        runner_config: RunnerConfig,
        max_upload_bytes: usize,
    ) -> Arc<Self> {
        let runner = JobRunner::new(runner_config, store.clone());
        Arc::new(Self {
            start_time: Instant::now(),
            store,
            runner,
            uploads_dir,
            max_upload_bytes,
        })
    }

    pub fn results_dir(&self) -> &Path {
        &self.runner.config().results_dir
    }

    /// Get uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
