// crates/types/src/status.rs
//! Job status and analysis option enums.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Lifecycle status of an analysis job.
///
/// There is no pending state: a job is `Processing` from the moment it is
/// created. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// True for `Completed` and `Failed`.
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Processing)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keyword filter passed to the analyzer as its second positional argument.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FilterOption {
    /// Keep every keyword row.
    #[default]
    All,
    /// Keep only rows ranking in positions 5-20.
    Recommended,
}

impl FilterOption {
    pub fn as_str(self) -> &'static str {
        match self {
            FilterOption::All => "all",
            FilterOption::Recommended => "recommended",
        }
    }
}

impl fmt::Display for FilterOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a filter option string is not one of the known values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownFilterOption(pub String);

impl fmt::Display for UnknownFilterOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown filter option '{}' (expected 'all' or 'recommended')",
            self.0
        )
    }
}

impl std::error::Error for UnknownFilterOption {}

impl FromStr for FilterOption {
    type Err = UnknownFilterOption;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "all" => Ok(FilterOption::All),
            "recommended" => Ok(FilterOption::Recommended),
            other => Err(UnknownFilterOption(other.to_string())),
        }
    }
}
