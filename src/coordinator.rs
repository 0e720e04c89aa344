//! Turns a resolved reference plus a quality/format request into a directive.
//!
//! The conversion service is a third party that comes and goes, so a failed
//! call is a normal branch here: it ends in a `redirect` to an external page
//! rather than an error whenever the catalogue has an entry for the track family.

use crate::cobalt::{ConversionOutcome, ConversionRequest, ConversionService};
use crate::error::DownloadError;
use crate::fallback::FallbackCatalogue;
use crate::models::{
    DirectiveStatus, DownloadDirective, DownloadLink, DownloadLinks, FallbackLink, MediaFormat, Quality,
    TrackKind, VideoMetadata, VideoReference,
};
use crate::oembed::MetadataSource;
use crate::resolver;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct DownloadCoordinator {
    converter: Arc<dyn ConversionService>,
    metadata: Arc<dyn MetadataSource>,
    catalogue: FallbackCatalogue,
    call_timeout: Duration,
}

impl DownloadCoordinator {
    pub fn new(
        converter: Arc<dyn ConversionService>,
        metadata: Arc<dyn MetadataSource>,
        catalogue: FallbackCatalogue,
        call_timeout: Duration,
    ) -> Self {
        DownloadCoordinator { converter, metadata, catalogue, call_timeout }
    }

    /// One oEmbed lookup; thumbnails are derived from the id, not checked.
    pub async fn request_metadata(&self, reference: &VideoReference) -> Result<VideoMetadata, DownloadError> {
        let info = self.metadata.lookup(&reference.watch_url()).await?;
        Ok(VideoMetadata {
            id: reference.id.clone(),
            title: info.title,
            author: info.author_name,
            author_url: info.author_url,
            thumbnail: reference.thumbnail_url("maxresdefault"),
            thumbnail_hq: reference.thumbnail_url("hqdefault"),
            thumbnail_mq: reference.thumbnail_url("mqdefault"),
            embed_url: reference.embed_url(),
            watch_url: reference.watch_url(),
        })
    }

    pub async fn request_download(&self, raw_url: &str, quality: Quality, format: MediaFormat) -> DownloadDirective {
        let Some(reference) = resolver::resolve_video_id(raw_url) else {
            return directive(String::new(), quality, format, DirectiveStatus::Error)
                .message(DownloadError::InvalidReference.to_string());
        };
        tracing::info!(video_id = %reference.id, %quality, %format, "Processing download request");

        let request = ConversionRequest::new(reference.watch_url(), quality.height(), format.is_audio());
        let failure = match self.attempt(&request).await {
            Ok(url) => {
                return directive(reference.id, quality, format, DirectiveStatus::Ready)
                    .download_url(url)
                    .message("Download ready! The file will start downloading automatically.".to_string());
            }
            Err(e) => e,
        };
        tracing::warn!(video_id = %reference.id, "Conversion failed, falling back: {}", failure);

        match self.catalogue.primary(format.kind()) {
            Some(service) => directive(reference.id.clone(), quality, format, DirectiveStatus::Redirect)
                .fallback_url(service.build_url(&reference))
                .message(format!("Direct download unavailable. Continue on {}.", service.name))
                .instructions(vec![
                    format!("1. Open {} using the link below", service.name),
                    "2. Wait for the page to process the video".to_string(),
                    format!("3. Pick {} {} and start the download", format, quality),
                ]),
            None => directive(reference.id, quality, format, DirectiveStatus::Error)
                .message(DownloadError::NoResultsAvailable.to_string()),
        }
    }

    /// Whole catalogue for the track family, in the order `request_download` uses.
    pub fn list_fallback_services(&self, reference: &VideoReference, is_audio: bool) -> Vec<FallbackLink> {
        let kind = if is_audio { TrackKind::Audio } else { TrackKind::Video };
        self.catalogue.links(reference, kind)
    }

    /// Probes every video quality plus one audio request concurrently. Failed,
    /// timed-out and cancelled probes are dropped from the result.
    pub async fn list_direct_download_links(
        &self,
        reference: &VideoReference,
        cancel: &CancellationToken,
    ) -> DownloadLinks {
        let video_probes = Quality::VIDEO.into_iter().map(|quality| {
            let request = ConversionRequest::new(reference.watch_url(), quality.height(), false);
            async move { (quality, self.probe(&request, cancel).await) }
        });
        let audio_request = ConversionRequest::new(reference.watch_url(), None, true);

        let (video_results, audio_url) =
            tokio::join!(join_all(video_probes), self.probe(&audio_request, cancel));

        let video = video_results
            .into_iter()
            .filter_map(|(quality, url)| {
                url.map(|url| DownloadLink { quality, format: MediaFormat::Mp4, url })
            })
            .collect();
        // The service has no audio bitrate knob; one result serves every tag.
        let audio = audio_url
            .map(|url| {
                Quality::AUDIO
                    .into_iter()
                    .map(|quality| DownloadLink { quality, format: MediaFormat::Mp3, url: url.clone() })
                    .collect()
            })
            .unwrap_or_default();

        let links = DownloadLinks { video, audio };
        if links.is_empty() {
            tracing::warn!(video_id = %reference.id, "No direct links available");
        }
        links
    }

    async fn probe(&self, request: &ConversionRequest, cancel: &CancellationToken) -> Option<String> {
        tokio::select! {
            _ = cancel.cancelled() => None,
            result = self.attempt(request) => match result {
                Ok(url) => Some(url),
                Err(e) => {
                    tracing::debug!(quality = ?request.v_quality, audio = request.is_audio_only, "Probe failed: {}", e);
                    None
                }
            },
        }
    }

    /// A single time-bounded call. Service-reported errors come back as
    /// `UpstreamRejected`; everything transport-related as `UpstreamUnavailable`.
    async fn attempt(&self, request: &ConversionRequest) -> Result<String, DownloadError> {
        let outcome = tokio::time::timeout(self.call_timeout, self.converter.convert(request))
            .await
            .map_err(|_| {
                DownloadError::UpstreamUnavailable(format!("{} timed out", self.converter.name()))
            })??;

        match outcome {
            ConversionOutcome::Redirect { url } | ConversionOutcome::Stream { url } => Ok(url),
            ConversionOutcome::Picker { urls } => urls
                .into_iter()
                .next()
                .ok_or_else(|| DownloadError::UpstreamRejected("empty picker".to_string())),
            ConversionOutcome::Error { text } => Err(DownloadError::UpstreamRejected(text)),
        }
    }
}

fn directive(video_id: String, quality: Quality, format: MediaFormat, status: DirectiveStatus) -> DownloadDirective {
    DownloadDirective {
        video_id,
        quality,
        format,
        kind: format.kind(),
        status,
        download_url: None,
        fallback_url: None,
        message: String::new(),
        instructions: None,
    }
}

// Small builder steps so each branch above reads as one expression.
impl DownloadDirective {
    fn message(mut self, message: String) -> Self {
        self.message = message;
        self
    }

    fn download_url(mut self, url: String) -> Self {
        self.download_url = Some(url);
        self
    }

    fn fallback_url(mut self, url: String) -> Self {
        self.fallback_url = Some(url);
        self
    }

    fn instructions(mut self, steps: Vec<String>) -> Self {
        self.instructions = Some(steps);
        self
    }
}
