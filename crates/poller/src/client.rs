// crates/poller/src/client.rs
//! HTTP client for the analysis API.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{multipart, StatusCode};
use scarab_types::{FilterOption, SubmitResponse};
use serde_json::Value;
use thiserror::Error;

use crate::poller::StatusSource;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unexpected HTTP {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("invalid response body: {0}")]
    Decode(String),
}

/// Talks to a scarab server at `base_url`.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self::with_client(http, base_url))
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for a server-relative path such as a `downloadUrl`.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Upload `path` and start an analysis job.
    pub async fn submit_file(
        &self,
        path: &Path,
        filter: FilterOption,
    ) -> Result<SubmitResponse, ClientError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| ClientError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let mime = mime_guess::from_path(path).first_or_octet_stream();

        let part = multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime.as_ref())?;
        let form = multipart::Form::new()
            .text("filterOption", filter.as_str())
            .part("file", part);

        let response = self
            .http
            .post(self.url("/api/v1/analysis/analyze-file"))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// Fetch the raw status body for `job_id`.
    ///
    /// 404 and 422 carry a JSON body describing the job and are returned as
    /// payloads, not errors. Any other non-2xx status is an error.
    pub async fn check_status(&self, job_id: &str) -> Result<Value, ClientError> {
        let response = self
            .http
            .get(self.url(&format!("/api/v1/analysis/status/{job_id}")))
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        match status {
            s if s.is_success() => {}
            StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY => {}
            s => {
                return Err(ClientError::UnexpectedStatus {
                    status: s.as_u16(),
                    body: text,
                })
            }
        }
        serde_json::from_str(&text).map_err(|e| ClientError::Decode(e.to_string()))
    }
}

#[async_trait]
impl StatusSource for ApiClient {
    async fn check(&self, job_id: &str) -> Result<Value, ClientError> {
        self.check_status(job_id).await
    }
}
