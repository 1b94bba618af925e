// crates/server/src/routes/download.rs
//! Streams analysis workbooks out of the results directory.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use scarab_server_jobs::paths::is_plain_file_name;
use tokio::fs::File;
use tokio_util::io::ReaderStream;

use crate::error::{ApiError, ApiResult, ErrorResponse};
use crate::state::AppState;

const FILE_NOT_FOUND: &str = "File not found";

/// GET /api/v1/analysis/download/{filename}
///
/// Only plain file names are served; anything with a separator or a `..`
/// component is treated as absent.
#[utoipa::path(
    get,
    path = "/api/v1/analysis/download/{filename}",
    tag = "analysis",
    params(("filename" = String, Path, description = "Workbook name from `excelFile`")),
    responses(
        (status = 200, description = "File streamed as an attachment", body = Vec<u8>, content_type = "application/octet-stream"),
        (status = 404, description = "No such file", body = ErrorResponse),
    )
)]
pub async fn download(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> ApiResult<Response> {
    if !is_plain_file_name(&filename) {
        tracing::warn!(filename = %filename, "blocked download of non-plain file name");
        return Err(ApiError::NotFound(FILE_NOT_FOUND.into()));
    }

    let path = state.results_dir().join(&filename);
    let metadata = match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => meta,
        Ok(_) => return Err(ApiError::NotFound(FILE_NOT_FOUND.into())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::NotFound(FILE_NOT_FOUND.into()))
        }
        Err(e) => return Err(e.into()),
    };
    let file = File::open(&path).await?;

    let mime_type = mime_guess::from_path(&path).first_or_octet_stream();
    let disposition = format!("attachment; filename=\"{filename}\"");
    tracing::debug!(filename = %filename, bytes = metadata.len(), "serving download");

    Ok((
        [
            (header::CONTENT_TYPE, mime_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CONTENT_LENGTH, metadata.len().to_string()),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/analysis/download/{filename}", get(download))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};
    use scarab_server_jobs::RunnerConfig;
    use tower::ServiceExt;

    fn app(results: &std::path::Path) -> Router {
        let state = AppState::with_runner_config("uploads".into(), RunnerConfig::new("sh", results));
        Router::new().nest("/api/v1", router()).with_state(state)
    }

    #[tokio::test]
    async fn test_download_streams_attachment() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("out.xlsx"), b"PK\x03\x04workbook").unwrap();

        let response = app(dir.path())
            .oneshot(
                Request::builder()
                    .uri("/api/v1/analysis/download/out.xlsx")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(
            headers[header::CONTENT_TYPE],
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        );
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            "attachment; filename=\"out.xlsx\""
        );
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"PK\x03\x04workbook");
    }

    #[tokio::test]
    async fn test_missing_and_traversal_are_404() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        for uri in [
            "/api/v1/analysis/download/missing.xlsx",
            "/api/v1/analysis/download/..",
            "/api/v1/analysis/download/..%2Fsecret.txt",
            "/api/v1/analysis/download/sub",
        ] {
            let response = app(dir.path())
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        }
    }
}
