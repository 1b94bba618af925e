// crates/server-jobs/src/lib.rs
//! Background analysis jobs.
//!
//! Provides:
//! - `JobStore`: in-memory registry of job records and their transitions
//! - `JobRunner`: spawns the external analyzer per job and resolves it
//! - `interpret`: turns a finished analyzer process into a job outcome
//! - `spawn_sweeper`: periodic eviction of jobs past the retention window

pub mod outcome;
pub mod paths;
pub mod runner;
pub mod store;
pub mod types;

pub use outcome::{interpret, AnalyzerOutput, ProcessOutput};
pub use runner::{JobRunner, JobSink, JobSpec, RunnerConfig};
pub use store::{spawn_sweeper, JobCounts, JobStore, StoreError};
pub use types::{Job, JobId, JobState, JobSummary};
