//! Keyless metadata lookup through YouTube's oEmbed endpoint.

use crate::error::DownloadError;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Fields of the oEmbed document we use.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct OEmbedInfo {
    pub title: String,
    #[serde(default)]
    pub author_name: String,
    #[serde(default)]
    pub author_url: String,
}

#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn lookup(&self, watch_url: &str) -> Result<OEmbedInfo, DownloadError>;
}

pub struct OEmbedClient {
    endpoint: String,
    client: reqwest::Client,
}

impl OEmbedClient {
    pub fn new(endpoint: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(OEmbedClient { endpoint: endpoint.to_string(), client })
    }
}

#[async_trait]
impl MetadataSource for OEmbedClient {
    async fn lookup(&self, watch_url: &str) -> Result<OEmbedInfo, DownloadError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("url", watch_url), ("format", "json")])
            .send()
            .await
            .map_err(|e| DownloadError::UpstreamUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::UpstreamRejected(format!(
                "video not found or unavailable (HTTP {})",
                status.as_u16()
            )));
        }

        response
            .json::<OEmbedInfo>()
            .await
            .map_err(|e| DownloadError::UpstreamUnavailable(e.to_string()))
    }
}
