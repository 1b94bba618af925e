// crates/server-jobs/src/outcome.rs
//! Interpretation of a finished analyzer process.
//!
//! The analyzer contract: print one JSON object on stdout, write the
//! referenced workbook into the results directory, exit 0. Diagnostics go to
//! stderr. Stray text around the object on stdout is tolerated.

use std::path::Path;

use scarab_types::{AnalysisResult, ErrorDetail, JobError};
use serde::Deserialize;
use serde_json::Value;

use crate::paths::is_plain_file_name;

/// Characters of raw stdout kept on a parse failure.
const RAW_OUTPUT_LIMIT: usize = 1000;

/// Captured result of one analyzer run.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    /// Whether the process exited with status 0.
    pub success: bool,
    /// Exit code, `None` when terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// JSON document printed by the analyzer.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzerOutput {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub excel_file: Option<String>,
    #[serde(default)]
    pub data_source: Option<String>,
    #[serde(default)]
    pub summary: Value,
    #[serde(default)]
    pub onpage_results: Option<Vec<Value>>,
    #[serde(default)]
    pub keyword_mapping: Option<Vec<Value>>,
}

/// Slice from the first `{` to the last `}` of `stdout`, or the trimmed
/// text when no such span exists.
pub fn extract_json_object(stdout: &str) -> &str {
    let trimmed = stdout.trim();
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start <= end => &trimmed[start..=end],
        _ => trimmed,
    }
}

/// Decide the terminal outcome of a job from its analyzer run.
///
/// `download_prefix` is the URL path under which the results directory is
/// served; the workbook name is appended to it.
pub fn interpret(
    output: &ProcessOutput,
    results_dir: &Path,
    download_prefix: &str,
) -> Result<AnalysisResult, JobError> {
    if !output.success {
        let details = if output.stderr.trim().is_empty() {
            "Script exited with non-zero code".to_string()
        } else {
            output.stderr.clone()
        };
        return Err(JobError::Detailed(ErrorDetail {
            message: "execution failed".to_string(),
            details: Some(details),
            exit_code: output.exit_code,
            raw_output: None,
        }));
    }

    if output.stdout.trim().is_empty() {
        return Err(JobError::message("no output produced"));
    }

    let parsed: AnalyzerOutput = serde_json::from_str(extract_json_object(&output.stdout))
        .map_err(|e| {
            JobError::Detailed(ErrorDetail {
                message: "failed to parse results".to_string(),
                details: Some(e.to_string()),
                exit_code: None,
                raw_output: Some(output.stdout.chars().take(RAW_OUTPUT_LIMIT).collect()),
            })
        })?;

    if !parsed.success {
        return Err(JobError::from_value(parsed.error.as_ref()));
    }

    let excel_file = match parsed.excel_file {
        Some(name) if is_plain_file_name(&name) && results_dir.join(&name).is_file() => name,
        _ => return Err(JobError::message("expected output artifact not found")),
    };

    Ok(AnalysisResult {
        message: "Analysis completed successfully".to_string(),
        download_url: format!("{}/{}", download_prefix.trim_end_matches('/'), excel_file),
        excel_file,
        data_source: parsed.data_source,
        summary: parsed.summary,
        onpage_results: parsed.onpage_results.unwrap_or_default(),
        keyword_mapping: parsed.keyword_mapping.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const PREFIX: &str = "/api/v1/analysis/download";

    fn ok(stdout: &str) -> ProcessOutput {
        ProcessOutput {
            success: true,
            exit_code: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    #[test]
    fn test_extract_json_object() {
        assert_eq!(extract_json_object("  {\"a\":1}\n"), "{\"a\":1}");
        assert_eq!(
            extract_json_object("loading model...\n{\"a\":{\"b\":2}}\ndone"),
            "{\"a\":{\"b\":2}}"
        );
        assert_eq!(extract_json_object("no json here"), "no json here");
        assert_eq!(extract_json_object("} backwards {"), "} backwards {");
    }

    #[test]
    fn test_nonzero_exit_keeps_stderr_and_code() {
        let output = ProcessOutput {
            success: false,
            exit_code: Some(1),
            stdout: "{\"success\":true}".into(),
            stderr: "boom".into(),
        };
        let err = interpret(&output, Path::new("/nonexistent"), PREFIX).unwrap_err();
        assert_eq!(
            err,
            JobError::Detailed(ErrorDetail {
                message: "execution failed".into(),
                details: Some("boom".into()),
                exit_code: Some(1),
                raw_output: None,
            })
        );
    }

    #[test]
    fn test_nonzero_exit_without_stderr() {
        let output = ProcessOutput {
            success: false,
            exit_code: None,
            ..Default::default()
        };
        let err = interpret(&output, Path::new("/nonexistent"), PREFIX).unwrap_err();
        let JobError::Detailed(detail) = err else {
            panic!("expected detailed error");
        };
        assert_eq!(detail.details.as_deref(), Some("Script exited with non-zero code"));
        assert_eq!(detail.exit_code, None);
    }

    #[test]
    fn test_empty_stdout() {
        let err = interpret(&ok("  \n\t"), Path::new("/nonexistent"), PREFIX).unwrap_err();
        assert_eq!(err, JobError::message("no output produced"));
    }

    #[test]
    fn test_garbled_stdout_truncates_raw_output() {
        let garbage = format!("{{not json {}", "x".repeat(2000));
        let err = interpret(&ok(&garbage), Path::new("/nonexistent"), PREFIX).unwrap_err();
        let JobError::Detailed(detail) = err else {
            panic!("expected detailed error");
        };
        assert_eq!(detail.message, "failed to parse results");
        assert_eq!(detail.raw_output.unwrap().chars().count(), 1000);
        assert!(detail.details.is_some());
    }

    #[test]
    fn test_reported_failure_uses_analyzer_error() {
        let err = interpret(
            &ok("{\"success\": false, \"error\": \"Missing column: Query\"}"),
            Path::new("/nonexistent"),
            PREFIX,
        )
        .unwrap_err();
        assert_eq!(err, JobError::message("Missing column: Query"));
    }

    #[test]
    fn test_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let err = interpret(
            &ok("{\"success\": true, \"excel_file\": \"out.xlsx\"}"),
            dir.path(),
            PREFIX,
        )
        .unwrap_err();
        assert_eq!(err, JobError::message("expected output artifact not found"));

        let err = interpret(&ok("{\"success\": true}"), dir.path(), PREFIX).unwrap_err();
        assert_eq!(err, JobError::message("expected output artifact not found"));
    }

    #[test]
    fn test_artifact_outside_results_dir_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = interpret(
            &ok("{\"success\": true, \"excel_file\": \"../out.xlsx\"}"),
            dir.path(),
            PREFIX,
        )
        .unwrap_err();
        assert_eq!(err, JobError::message("expected output artifact not found"));
    }

    #[test]
    fn test_success_normalizes_result() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("out.xlsx"), b"xlsx").unwrap();
        let stdout = r#"[analyser] reading csv
{"success": true, "excel_file": "out.xlsx", "data_source": "gsc",
 "summary": {"total_keywords": 3}, "keyword_mapping": null,
 "onpage_results": [{"url": "/a"}]}"#;

        let result = interpret(&ok(stdout), dir.path(), PREFIX).unwrap();
        assert_eq!(
            result,
            AnalysisResult {
                message: "Analysis completed successfully".into(),
                download_url: "/api/v1/analysis/download/out.xlsx".into(),
                excel_file: "out.xlsx".into(),
                data_source: Some("gsc".into()),
                summary: json!({"total_keywords": 3}),
                onpage_results: vec![json!({"url": "/a"})],
                keyword_mapping: vec![],
            }
        );
    }
}
