//! Adapter for the Cobalt conversion API.
//!
//! The wire format of the conversion service lives only in this file. The rest
//! of the crate talks to it through [`ConversionService`] and sees the parsed
//! [`ConversionOutcome`].

use crate::error::DownloadError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Request body accepted by the conversion service.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversionRequest {
    pub url: String,
    /// Video height, e.g. "720". Absent for audio-only requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub v_quality: Option<String>,
    pub filename_pattern: String,
    pub is_audio_only: bool,
    pub a_format: String,
}

impl ConversionRequest {
    pub fn new(watch_url: String, height: Option<u32>, is_audio_only: bool) -> Self {
        ConversionRequest {
            url: watch_url,
            v_quality: if is_audio_only { None } else { height.map(|h| h.to_string()) },
            filename_pattern: "basic".to_string(),
            is_audio_only,
            a_format: "mp3".to_string(),
        }
    }
}

/// Parsed response, one variant per status the service reports.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversionOutcome {
    Redirect { url: String },
    Stream { url: String },
    Picker { urls: Vec<String> },
    Error { text: String },
}

#[derive(Deserialize, Debug)]
#[serde(tag = "status", rename_all = "lowercase")]
enum CobaltResponse {
    Redirect {
        url: String,
    },
    Stream {
        url: String,
    },
    Picker {
        #[serde(default)]
        picker: Vec<PickerItem>,
        #[serde(default)]
        url: Option<String>,
    },
    Error {
        #[serde(default)]
        text: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize, Debug)]
struct PickerItem {
    url: String,
}

impl From<CobaltResponse> for ConversionOutcome {
    fn from(response: CobaltResponse) -> Self {
        match response {
            CobaltResponse::Redirect { url } => ConversionOutcome::Redirect { url },
            CobaltResponse::Stream { url } => ConversionOutcome::Stream { url },
            CobaltResponse::Picker { picker, url } => {
                let mut urls: Vec<String> = picker.into_iter().map(|item| item.url).collect();
                if urls.is_empty() {
                    urls.extend(url);
                }
                ConversionOutcome::Picker { urls }
            }
            CobaltResponse::Error { text } => ConversionOutcome::Error {
                text: text.unwrap_or_else(|| "Download failed".to_string()),
            },
            CobaltResponse::Unknown => ConversionOutcome::Error {
                text: "Unrecognized response status".to_string(),
            },
        }
    }
}

/// Parses a raw response body. Malformed JSON is a transport-level failure.
pub fn parse_response(body: &[u8]) -> Result<ConversionOutcome, DownloadError> {
    serde_json::from_slice::<CobaltResponse>(body)
        .map(ConversionOutcome::from)
        .map_err(|e| DownloadError::UpstreamUnavailable(format!("malformed response: {}", e)))
}

#[async_trait]
pub trait ConversionService: Send + Sync {
    fn name(&self) -> &str;

    /// One attempt, never retried by the implementation.
    async fn convert(&self, request: &ConversionRequest) -> Result<ConversionOutcome, DownloadError>;
}

pub struct CobaltClient {
    api_url: String,
    client: reqwest::Client,
}

impl CobaltClient {
    pub fn new(api_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("yt_fetch/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(CobaltClient { api_url: api_url.to_string(), client })
    }
}

#[async_trait]
impl ConversionService for CobaltClient {
    fn name(&self) -> &str {
        &self.api_url
    }

    async fn convert(&self, request: &ConversionRequest) -> Result<ConversionOutcome, DownloadError> {
        tracing::debug!(url = %request.url, quality = ?request.v_quality, audio = request.is_audio_only, "Calling conversion service");

        let response = self
            .client
            .post(&self.api_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| DownloadError::UpstreamUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::UpstreamUnavailable(format!("conversion service returned {}", status)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| DownloadError::UpstreamUnavailable(e.to_string()))?;
        parse_response(&body)
    }
}
