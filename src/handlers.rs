use crate::{
    config::{self, Config},
    coordinator::DownloadCoordinator,
    error::{AppError, DownloadError},
    models::{
        ApiResponse, DownloadOptions, DownloadRequest, FallbackRequest, LocalDownload, LocalVideoInfo, MediaFormat, Quality,
        UrlRequest, VideoInfoResponse, VideoReference,
    },
    resolver, ytdlp, AppState,
};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use percent_encoding::percent_decode_str;
use serde_json::json;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError};
use tokio_util::sync::CancellationToken;

// ===================================================================
//                          HEALTH HANDLER
// ===================================================================

/// # GET /health - Reports whether the `yt-dlp` binary is usable.
pub async fn health() -> impl IntoResponse {
    match ytdlp::version().await {
        Ok(version) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "message": "yt-dlp is available", "version": version })),
        ),
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "status": "error",
                "message": "yt-dlp not installed. Please install it first.",
                "instructions": "Run: pip install yt-dlp or brew install yt-dlp",
            })),
        ),
    }
}

// ===================================================================
//                          CONFIG HANDLERS
// ===================================================================

/// # GET /config - Returns the current application configuration.
pub async fn get_config(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let config = state.config.read().unwrap_or_else(PoisonError::into_inner).clone();
    Ok((StatusCode::OK, Json(config)))
}

/// # POST /config - Replaces the configuration, saves it and rebuilds the coordinator.
pub async fn update_config(
    State(state): State<AppState>,
    Json(payload): Json<Config>,
) -> Result<impl IntoResponse, AppError> {
    let coordinator = crate::build_coordinator(&payload)?;
    config::save_config(&payload).await?;
    *state.config.write().unwrap_or_else(PoisonError::into_inner) = payload.clone();
    *state.coordinator.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(coordinator);
    tracing::info!("Configuration updated and saved.");
    Ok((StatusCode::OK, Json(payload)))
}

// ===================================================================
//                          REMOTE (CONVERSION SERVICE) HANDLERS
// ===================================================================

/// # POST /api/video-info - Metadata from oEmbed plus the standard option table.
pub async fn video_info(
    State(state): State<AppState>,
    Json(payload): Json<UrlRequest>,
) -> Result<impl IntoResponse, AppError> {
    let reference = require_reference(&payload.url)?;
    tracing::info!("Fetching info for video: {}", reference.id);

    let metadata = coordinator(&state)
        .request_metadata(&reference)
        .await
        .map_err(AppError::Download)?;

    Ok(Json(ApiResponse::ok(VideoInfoResponse {
        metadata,
        download_options: DownloadOptions::standard(),
    })))
}

/// # POST /api/download - Produces a download directive.
pub async fn request_download(
    State(state): State<AppState>,
    Json(payload): Json<DownloadRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_reference(&payload.url)?;
    let quality = parse_quality(&payload.quality)?;
    let format = parse_format(&payload.format)?;

    let directive = coordinator(&state).request_download(&payload.url, quality, format).await;

    let (status, error) = if directive.is_success() {
        (StatusCode::OK, None)
    } else {
        (StatusCode::BAD_GATEWAY, Some(directive.message.clone()))
    };
    Ok((status, Json(ApiResponse { success: error.is_none(), data: Some(directive), error })))
}

/// # POST /api/direct-links - Probes every quality and lists what worked.
pub async fn direct_links(
    State(state): State<AppState>,
    Json(payload): Json<UrlRequest>,
) -> Result<impl IntoResponse, AppError> {
    let reference = require_reference(&payload.url)?;

    // Probes stop when the client goes away and this future is dropped.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let links = coordinator(&state).list_direct_download_links(&reference, &cancel).await;
    tracing::info!(
        "Found {} video and {} audio link(s) for {}",
        links.video.len(),
        links.audio.len(),
        reference.id
    );
    Ok(Json(ApiResponse::ok(links)))
}

/// # POST /api/fallback-services - Lists every external page for the track family.
pub async fn fallback_services(
    State(state): State<AppState>,
    Json(payload): Json<FallbackRequest>,
) -> Result<impl IntoResponse, AppError> {
    let reference = require_reference(&payload.url)?;
    let format = parse_format(&payload.format)?;
    let services = coordinator(&state).list_fallback_services(&reference, format.is_audio());
    Ok(Json(ApiResponse::ok(services)))
}

// ===================================================================
//                          LOCAL (YT-DLP) HANDLERS
// ===================================================================

/// # POST /api/local/video-info - Formats as reported by `yt-dlp`.
pub async fn local_video_info(Json(payload): Json<UrlRequest>) -> Result<impl IntoResponse, AppError> {
    let reference = require_reference(&payload.url)?;
    tracing::info!("Fetching formats for video: {}", reference.id);

    let info = ytdlp::dump_info(&reference).await?;
    tracing::info!("Successfully fetched {} formats for '{}'", info.formats.len(), info.title);

    Ok(Json(ApiResponse::ok(LocalVideoInfo {
        id: reference.id,
        formats: ytdlp::summarize_formats(&info.formats),
        title: info.title,
        author: info.uploader.or(info.channel),
        thumbnail: info.thumbnail,
        duration: info.duration,
    })))
}

/// # POST /api/local/download - Downloads with `yt-dlp` into the download directory.
pub async fn local_download(
    State(state): State<AppState>,
    Json(payload): Json<DownloadRequest>,
) -> Result<impl IntoResponse, AppError> {
    let reference = require_reference(&payload.url)?;
    let quality = parse_quality(&payload.quality)?;
    let format = parse_format(&payload.format)?;
    let download_dir = get_download_dir_from_state(&state);

    let filename = ytdlp::download(&reference, quality, format, &download_dir).await?;

    Ok(Json(ApiResponse::ok(LocalDownload {
        video_id: reference.id,
        quality,
        format,
        download_url: format!("/api/file/{}", filename),
        filename,
        message: "Download ready!".to_string(),
        status: crate::models::DirectiveStatus::Ready,
    })))
}

/// # GET /api/file/*path - Serves a single downloaded file.
pub async fn get_file(State(state): State<AppState>, Path(path): Path<String>) -> Result<impl IntoResponse, AppError> {
    let decoded_path = percent_decode_str(&path).decode_utf8_lossy().to_string();
    let download_dir = get_download_dir_from_state(&state);
    let file_path = download_dir.join(&decoded_path);

    let not_found = || AppError::NotFound(format!("File '{}' not found.", decoded_path));
    let canonical_base = tokio::fs::canonicalize(&download_dir).await.map_err(|_| not_found())?;
    let canonical_file = tokio::fs::canonicalize(&file_path).await.map_err(|_| not_found())?;

    if !canonical_file.starts_with(canonical_base) {
        return Err(AppError::NotFound("File not found (Path Traversal Attempt)".to_string()));
    }
    let is_file = tokio::fs::metadata(&canonical_file).await.map(|m| m.is_file()).unwrap_or(false);
    if !is_file {
        return Err(not_found());
    }

    let file = tokio::fs::File::open(&canonical_file).await?;
    let stream = tokio_util::io::ReaderStream::new(file);
    let body = Body::from_stream(stream);

    let mut headers = HeaderMap::new();
    let disposition = format!(
        "attachment; filename=\"{}\"",
        canonical_file.file_name().unwrap_or_default().to_string_lossy()
    );
    let disposition = HeaderValue::from_str(&disposition)
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    headers.insert(header::CONTENT_DISPOSITION, disposition);

    Ok((headers, body))
}

// ===================================================================
//                          HELPER FUNCTIONS
// ===================================================================

/// Empty and unresolvable URLs are rejected before any upstream call.
fn require_reference(url: &str) -> Result<VideoReference, AppError> {
    if url.trim().is_empty() {
        return Err(AppError::BadRequest("URL is required".to_string()));
    }
    if !resolver::is_valid_reference(url) {
        return Err(AppError::Download(DownloadError::InvalidReference));
    }
    resolver::resolve_video_id(url).ok_or(AppError::Download(DownloadError::InvalidReference))
}

fn parse_quality(raw: &str) -> Result<Quality, AppError> {
    raw.parse().map_err(AppError::BadRequest)
}

fn parse_format(raw: &str) -> Result<MediaFormat, AppError> {
    raw.parse().map_err(AppError::BadRequest)
}

fn coordinator(state: &AppState) -> Arc<DownloadCoordinator> {
    state.coordinator.read().unwrap_or_else(PoisonError::into_inner).clone()
}

/// Helper to get the configured download directory path from the shared state.
fn get_download_dir_from_state(state: &AppState) -> PathBuf {
    let config = state.config.read().unwrap_or_else(PoisonError::into_inner);
    PathBuf::from(&config.download_directory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cobalt::{ConversionOutcome, ConversionRequest, ConversionService};
    use crate::fallback::FallbackCatalogue;
    use crate::oembed::{MetadataSource, OEmbedInfo};
    use async_trait::async_trait;
    use axum::body::to_bytes;
    use axum::response::Response;
    use serde_json::Value;
    use std::sync::RwLock;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Unreachable;

    #[async_trait]
    impl ConversionService for Unreachable {
        fn name(&self) -> &str {
            "unreachable"
        }

        async fn convert(&self, _request: &ConversionRequest) -> Result<ConversionOutcome, DownloadError> {
            Err(DownloadError::UpstreamUnavailable("connection refused".into()))
        }
    }

    struct NotFound;

    #[async_trait]
    impl MetadataSource for NotFound {
        async fn lookup(&self, _watch_url: &str) -> Result<OEmbedInfo, DownloadError> {
            Err(DownloadError::UpstreamRejected("video not found or unavailable (HTTP 404)".into()))
        }
    }

    struct HandlerTestContext {
        _temp: TempDir,
        state: AppState,
    }

    impl HandlerTestContext {
        fn new(catalogue: FallbackCatalogue) -> Self {
            let temp = TempDir::new().unwrap();
            let config = Config {
                download_directory: temp.path().to_string_lossy().to_string(),
                fallback: catalogue.clone(),
                ..Config::default()
            };
            let coordinator =
                DownloadCoordinator::new(Arc::new(Unreachable), Arc::new(NotFound), catalogue, Duration::from_secs(1));
            Self {
                state: AppState {
                    config: Arc::new(RwLock::new(config)),
                    coordinator: Arc::new(RwLock::new(Arc::new(coordinator))),
                },
                _temp: temp,
            }
        }
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn download_request(url: &str, quality: &str) -> DownloadRequest {
        DownloadRequest { url: url.into(), quality: quality.into(), format: "MP4".into() }
    }

    #[tokio::test]
    async fn failed_conversion_is_still_a_successful_redirect() {
        let ctx = HandlerTestContext::new(FallbackCatalogue::default());

        let response = request_download(State(ctx.state.clone()), Json(download_request("https://youtu.be/jNQXAC9IVRw", "720p")))
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["status"], "redirect");
        assert!(body["data"]["fallbackUrl"].as_str().unwrap().starts_with("https://en.savefrom.net/"));
    }

    #[tokio::test]
    async fn empty_catalogue_reports_failure() {
        let ctx = HandlerTestContext::new(FallbackCatalogue { video: vec![], audio: vec![] });

        let response = request_download(State(ctx.state.clone()), Json(download_request("https://youtu.be/jNQXAC9IVRw", "720p")))
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["data"]["status"], "error");
    }

    #[tokio::test]
    async fn bad_input_is_rejected_before_upstream() {
        let ctx = HandlerTestContext::new(FallbackCatalogue::default());

        let empty = request_download(State(ctx.state.clone()), Json(download_request("", "720p"))).await.into_response();
        assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(empty).await["error"], "URL is required");

        let invalid = request_download(State(ctx.state.clone()), Json(download_request("https://vimeo.com/1", "720p")))
            .await
            .into_response();
        assert_eq!(body_json(invalid).await["error"], "Invalid YouTube URL");

        let channel = request_download(
            State(ctx.state.clone()),
            Json(download_request("https://www.youtube.com/channel/UC123", "720p")),
        )
        .await
        .into_response();
        assert_eq!(channel.status(), StatusCode::BAD_REQUEST);

        let quality = request_download(State(ctx.state.clone()), Json(download_request("https://youtu.be/abc", "4k")))
            .await
            .into_response();
        assert_eq!(quality.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn metadata_failure_maps_to_bad_gateway() {
        let ctx = HandlerTestContext::new(FallbackCatalogue::default());

        let response = video_info(State(ctx.state.clone()), Json(UrlRequest { url: "https://youtu.be/abc".into() }))
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(body_json(response).await["success"], false);
    }

    #[tokio::test]
    async fn direct_links_are_empty_when_every_probe_fails() {
        let ctx = HandlerTestContext::new(FallbackCatalogue::default());

        let response = direct_links(State(ctx.state.clone()), Json(UrlRequest { url: "https://youtu.be/abc".into() }))
            .await
            .into_response();

        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["video"].as_array().unwrap().len(), 0);
        assert_eq!(body["data"]["audio"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn fallback_services_follow_catalogue_order() {
        let ctx = HandlerTestContext::new(FallbackCatalogue::default());

        let response = fallback_services(
            State(ctx.state.clone()),
            Json(FallbackRequest { url: "https://youtu.be/abc".into(), format: "mp3".into() }),
        )
        .await
        .into_response();

        let body = body_json(response).await;
        let names: Vec<&str> = body["data"].as_array().unwrap().iter().map(|s| s["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["YTMP3", "MP3Juice", "AudioDownloader"]);
    }

    #[tokio::test]
    async fn serves_files_and_blocks_traversal() {
        let ctx = HandlerTestContext::new(FallbackCatalogue::default());
        std::fs::write(ctx._temp.path().join("abc_1.mp4"), b"video-bytes").unwrap();

        let found = get_file(State(ctx.state.clone()), Path("abc_1.mp4".into())).await.into_response();
        assert_eq!(found.status(), StatusCode::OK);
        assert_eq!(
            found.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"abc_1.mp4\""
        );
        let bytes = to_bytes(found.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"video-bytes");

        let missing = get_file(State(ctx.state.clone()), Path("nope.mp4".into())).await.into_response();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let escape = get_file(State(ctx.state.clone()), Path("..%2F..%2Fetc%2Fpasswd".into())).await.into_response();
        assert_eq!(escape.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn directories_are_not_served() {
        let ctx = HandlerTestContext::new(FallbackCatalogue::default());
        std::fs::create_dir(ctx._temp.path().join("nested")).unwrap();

        let root = get_file(State(ctx.state.clone()), Path(".".into())).await.into_response();
        assert_eq!(root.status(), StatusCode::NOT_FOUND);

        let nested = get_file(State(ctx.state.clone()), Path("nested".into())).await.into_response();
        assert_eq!(nested.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn format_is_case_insensitive_and_unknown_formats_are_bad_requests() {
        let ctx = HandlerTestContext::new(FallbackCatalogue::default());

        let mut lower = download_request("https://youtu.be/jNQXAC9IVRw", "720p");
        lower.format = "mp4".into();
        let response = request_download(State(ctx.state.clone()), Json(lower)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["data"]["format"], "MP4");

        let mut unknown = download_request("https://youtu.be/jNQXAC9IVRw", "720p");
        unknown.format = "webm".into();
        let response = request_download(State(ctx.state.clone()), Json(unknown)).await.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Unsupported format 'webm'");
    }
}
