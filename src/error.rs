use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;

/// Failures of the download-intent protocol.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DownloadError {
    #[error("Invalid YouTube URL")]
    InvalidReference,
    #[error("upstream service unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("upstream service rejected the request: {0}")]
    UpstreamRejected(String),
    #[error("No download option is available for this video")]
    NoResultsAvailable,
}

// Define our custom error type
pub enum AppError {
    Internal(anyhow::Error),
    YtDlp(String),
    BadRequest(String),
    NotFound(String),
    Download(DownloadError),
}

// This implementation allows us to convert our AppError into a valid HTTP response.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Internal(e) => {
                // Log the full error for debugging
                tracing::error!("Internal server error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal server error occurred".to_string(),
                )
            }
            AppError::YtDlp(e) => (StatusCode::BAD_REQUEST, format!("yt-dlp error: {}", e)),
            AppError::BadRequest(e) => (StatusCode::BAD_REQUEST, e),
            AppError::NotFound(e) => (StatusCode::NOT_FOUND, e),
            AppError::Download(e @ DownloadError::InvalidReference) => (StatusCode::BAD_REQUEST, e.to_string()),
            AppError::Download(e) => {
                tracing::warn!("Upstream failure: {}", e);
                (StatusCode::BAD_GATEWAY, e.to_string())
            }
        };

        let body = Json(json!({ "success": false, "error": error_message }));
        (status, body).into_response()
    }
}

// Lets `?` turn any `std::error::Error` into `AppError::Internal`.
// `DownloadError` goes through `AppError::Download` explicitly instead.
impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Internal(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_errors_map_to_http_statuses() {
        let invalid = AppError::Download(DownloadError::InvalidReference).into_response();
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let upstream = AppError::Download(DownloadError::UpstreamUnavailable("timeout".into())).into_response();
        assert_eq!(upstream.status(), StatusCode::BAD_GATEWAY);

        let missing = AppError::NotFound("nope".into()).into_response();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}
