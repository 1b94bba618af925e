// crates/types/src/analysis.rs
//! Payloads stored on terminal jobs.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// Normalized output of a successful analysis run.
///
/// Collections the analyzer did not emit are empty, never absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub message: String,
    /// Path of the download endpoint for the generated workbook.
    pub download_url: String,
    pub excel_file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<String>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub summary: Value,
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub onpage_results: Vec<Value>,
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub keyword_mapping: Vec<Value>,
}

/// Structured failure with optional diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
}

/// Error stored on a failed job: a bare message or a structured detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum JobError {
    Message(String),
    Detailed(ErrorDetail),
}

impl JobError {
    pub fn message(msg: impl Into<String>) -> Self {
        JobError::Message(msg.into())
    }

    pub fn detailed(msg: impl Into<String>, details: impl Into<String>) -> Self {
        JobError::Detailed(ErrorDetail {
            message: msg.into(),
            details: Some(details.into()),
            exit_code: None,
            raw_output: None,
        })
    }

    /// Normalize an arbitrary error-like JSON value reported by the analyzer.
    ///
    /// Strings are kept as-is, objects contribute their `message` and
    /// `details`, anything else is rendered as JSON text.
    pub fn from_value(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => JobError::message("analysis reported failure"),
            Some(Value::String(s)) => JobError::Message(s.clone()),
            Some(Value::Object(map)) => match map.get("message").and_then(Value::as_str) {
                Some(message) => JobError::Detailed(ErrorDetail {
                    message: message.to_string(),
                    details: map.get("details").map(|d| match d {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    }),
                    exit_code: None,
                    raw_output: None,
                }),
                None => JobError::Message(Value::Object(map.clone()).to_string()),
            },
            Some(other) => JobError::Message(other.to_string()),
        }
    }

    /// Human-readable summary regardless of shape.
    pub fn summary(&self) -> &str {
        match self {
            JobError::Message(m) => m,
            JobError::Detailed(d) => &d.message,
        }
    }
}

impl std::fmt::Display for JobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobError::Message(m) => f.write_str(m),
            JobError::Detailed(d) => match &d.details {
                Some(details) => write!(f, "{}: {}", d.message, details),
                None => f.write_str(&d.message),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_job_error_message_serializes_as_string() {
        let err = JobError::message("timeout");
        assert_eq!(serde_json::to_value(&err).unwrap(), json!("timeout"));
    }

    #[test]
    fn test_job_error_detailed_skips_empty_fields() {
        let err = JobError::Detailed(ErrorDetail {
            message: "execution failed".into(),
            details: Some("boom".into()),
            exit_code: Some(1),
            raw_output: None,
        });
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            json!({"message": "execution failed", "details": "boom", "exit_code": 1})
        );
    }

    #[test]
    fn test_job_error_from_value_variants() {
        assert_eq!(
            JobError::from_value(Some(&json!("bad csv"))),
            JobError::message("bad csv")
        );
        assert_eq!(
            JobError::from_value(None),
            JobError::message("analysis reported failure")
        );
        assert_eq!(
            JobError::from_value(Some(&json!({"message": "m", "details": {"row": 3}}))),
            JobError::Detailed(ErrorDetail {
                message: "m".into(),
                details: Some("{\"row\":3}".into()),
                exit_code: None,
                raw_output: None,
            })
        );
        assert_eq!(
            JobError::from_value(Some(&json!(42))),
            JobError::message("42")
        );
    }

    #[test]
    fn test_job_error_deserialize_untagged() {
        let err: JobError = serde_json::from_value(json!({"message": "x"})).unwrap();
        assert_eq!(err.summary(), "x");
        let err: JobError = serde_json::from_value(json!("y")).unwrap();
        assert_eq!(err.summary(), "y");
    }

    #[test]
    fn test_analysis_result_defaults_collections() {
        let result: AnalysisResult = serde_json::from_value(json!({
            "message": "ok",
            "downloadUrl": "/api/v1/analysis/download/out.xlsx",
            "excelFile": "out.xlsx"
        }))
        .unwrap();
        assert!(result.onpage_results.is_empty());
        assert!(result.keyword_mapping.is_empty());
        assert_eq!(result.summary, Value::Null);
        assert!(result.data_source.is_none());
    }
}
