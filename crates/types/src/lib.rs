// crates/types/src/lib.rs
//! Wire contract shared by the analysis server and its polling client.
//!
//! Everything here is plain serde data: job status values, the normalized
//! analysis result, the error shape stored on failed jobs, and the JSON
//! bodies of the submission and status endpoints.

pub mod analysis;
pub mod responses;
pub mod status;

pub use analysis::{AnalysisResult, ErrorDetail, JobError};
pub use responses::{JobStatusError, JobStatusResponse, StatusReport, SubmitResponse};
pub use status::{FilterOption, JobStatus, UnknownFilterOption};
