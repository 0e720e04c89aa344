use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// === Core Domain Models ===

/// A canonical YouTube video identifier extracted from a user-supplied URL.
///
/// Only the resolver produces these from raw input; the id is never checked
/// against YouTube itself.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VideoReference {
    pub id: String,
}

impl VideoReference {
    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.id)
    }

    pub fn embed_url(&self) -> String {
        format!("https://www.youtube.com/embed/{}", self.id)
    }

    /// Thumbnail URL for one of the fixed `img.youtube.com` variants
    /// (`maxresdefault`, `hqdefault`, `mqdefault`).
    pub fn thumbnail_url(&self, variant: &str) -> String {
        format!("https://img.youtube.com/vi/{}/{}.jpg", self.id, variant)
    }
}

/// Requested output fidelity. Video tags carry a height, audio tags a bitrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quality {
    P1080,
    P720,
    P480,
    P360,
    Kbps320,
    Kbps192,
    Kbps128,
}

impl Quality {
    pub const VIDEO: [Quality; 4] = [Quality::P1080, Quality::P720, Quality::P480, Quality::P360];
    pub const AUDIO: [Quality; 3] = [Quality::Kbps320, Quality::Kbps192, Quality::Kbps128];

    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::P1080 => "1080p",
            Quality::P720 => "720p",
            Quality::P480 => "480p",
            Quality::P360 => "360p",
            Quality::Kbps320 => "320kbps",
            Quality::Kbps192 => "192kbps",
            Quality::Kbps128 => "128kbps",
        }
    }

    /// Height in pixels for video tags, bitrate in kbps for audio tags.
    pub fn magnitude(&self) -> u32 {
        match self {
            Quality::P1080 => 1080,
            Quality::P720 => 720,
            Quality::P480 => 480,
            Quality::P360 => 360,
            Quality::Kbps320 => 320,
            Quality::Kbps192 => 192,
            Quality::Kbps128 => 128,
        }
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, Quality::Kbps320 | Quality::Kbps192 | Quality::Kbps128)
    }

    pub fn height(&self) -> Option<u32> {
        (!self.is_audio()).then(|| self.magnitude())
    }

    /// Rough size shown next to each option. Display only.
    pub fn estimated_size(&self) -> &'static str {
        match self {
            Quality::P1080 => "~250 MB",
            Quality::P720 => "~150 MB",
            Quality::P480 => "~80 MB",
            Quality::P360 => "~40 MB",
            Quality::Kbps320 => "~10 MB",
            Quality::Kbps192 => "~7 MB",
            Quality::Kbps128 => "~4 MB",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Quality::VIDEO
            .iter()
            .chain(Quality::AUDIO.iter())
            .find(|q| q.as_str().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| format!("Unsupported quality '{}'", s))
    }
}

impl Serialize for Quality {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Quality {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Target container. MP3 selects the audio track family.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum MediaFormat {
    Mp4,
    Mp3,
}

impl MediaFormat {
    pub fn kind(&self) -> TrackKind {
        match self {
            MediaFormat::Mp4 => TrackKind::Video,
            MediaFormat::Mp3 => TrackKind::Audio,
        }
    }

    pub fn is_audio(&self) -> bool {
        self.kind() == TrackKind::Audio
    }
}

impl FromStr for MediaFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MP4" => Ok(MediaFormat::Mp4),
            "MP3" => Ok(MediaFormat::Mp3),
            _ => Err(format!("Unsupported format '{}'", s)),
        }
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaFormat::Mp4 => f.write_str("MP4"),
            MediaFormat::Mp3 => f.write_str("MP3"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DirectiveStatus {
    Ready,
    Redirect,
    Error,
}

/// How the caller should proceed to obtain the media. Built once per request.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DownloadDirective {
    pub video_id: String,
    pub quality: Quality,
    pub format: MediaFormat,
    #[serde(rename = "type")]
    pub kind: TrackKind,
    pub status: DirectiveStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_url: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<Vec<String>>,
}

impl DownloadDirective {
    /// `redirect` still counts as success: the user has a page to go to.
    pub fn is_success(&self) -> bool {
        self.status != DirectiveStatus::Error
    }
}

/// Descriptive metadata for a resolved video.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VideoMetadata {
    pub id: String,
    pub title: String,
    pub author: String,
    pub author_url: String,
    pub thumbnail: String,
    #[serde(rename = "thumbnailHQ")]
    pub thumbnail_hq: String,
    #[serde(rename = "thumbnailMQ")]
    pub thumbnail_mq: String,
    pub embed_url: String,
    pub watch_url: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DownloadOption {
    pub quality: Quality,
    pub format: MediaFormat,
    pub estimated_size: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DownloadOptions {
    pub video: Vec<DownloadOption>,
    pub audio: Vec<DownloadOption>,
}

impl DownloadOptions {
    /// The fixed option table offered for every video.
    pub fn standard() -> Self {
        let option = |quality: Quality, format| DownloadOption {
            quality,
            format,
            estimated_size: quality.estimated_size().to_string(),
        };
        DownloadOptions {
            video: Quality::VIDEO.iter().map(|q| option(*q, MediaFormat::Mp4)).collect(),
            audio: Quality::AUDIO.iter().map(|q| option(*q, MediaFormat::Mp3)).collect(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DownloadLink {
    pub quality: Quality,
    pub format: MediaFormat,
    pub url: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct DownloadLinks {
    pub video: Vec<DownloadLink>,
    pub audio: Vec<DownloadLink>,
}

impl DownloadLinks {
    pub fn is_empty(&self) -> bool {
        self.video.is_empty() && self.audio.is_empty()
    }
}

/// A fallback page resolved for one particular video.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FallbackLink {
    pub name: String,
    pub url: String,
}

// === API Request/Response Models ===

/// Envelope shared by every `/api` route.
#[derive(Serialize, Debug)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        ApiResponse { success: true, data: Some(data), error: None }
    }
}

/// Body for routes that only need a URL.
#[derive(Deserialize, Debug)]
pub struct UrlRequest {
    #[serde(default)]
    pub url: String,
}

/// Body for `POST /api/download` and `POST /api/local/download`.
#[derive(Deserialize, Debug)]
pub struct DownloadRequest {
    #[serde(default)]
    pub url: String,
    pub quality: String,
    pub format: String,
}

/// Body for `POST /api/fallback-services`.
#[derive(Deserialize, Debug)]
pub struct FallbackRequest {
    #[serde(default)]
    pub url: String,
    pub format: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct VideoInfoResponse {
    #[serde(flatten)]
    pub metadata: VideoMetadata,
    pub download_options: DownloadOptions,
}

// === Local yt-dlp Models ===

/// The subset of `yt-dlp --dump-json` output we read.
#[derive(Serialize, Deserialize, Debug)]
pub struct YtDlpInfo {
    pub title: String,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub formats: Vec<YtDlpFormat>,
}

/// A single format entry from `yt-dlp`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct YtDlpFormat {
    #[serde(default)]
    pub format_id: String,
    #[serde(default)]
    pub ext: Option<String>,
    #[serde(default)]
    pub vcodec: Option<String>,
    #[serde(default)]
    pub acodec: Option<String>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub abr: Option<f64>, // Audio bitrate in KBit/s
    #[serde(default)]
    pub filesize: Option<u64>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct LocalFormat {
    pub quality: String,
    pub format: String,
    pub filesize: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct LocalFormats {
    pub video: Vec<LocalFormat>,
    pub audio: Vec<LocalFormat>,
}

#[derive(Serialize, Debug)]
pub struct LocalVideoInfo {
    pub id: String,
    pub title: String,
    pub author: Option<String>,
    pub thumbnail: Option<String>,
    pub duration: Option<f64>,
    pub formats: LocalFormats,
}

/// Result of a finished local download.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LocalDownload {
    pub video_id: String,
    pub quality: Quality,
    pub format: MediaFormat,
    pub filename: String,
    pub download_url: String,
    pub message: String,
    pub status: DirectiveStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_tags_parse_and_classify() {
        assert_eq!("720p".parse::<Quality>().unwrap(), Quality::P720);
        assert_eq!("320KBPS".parse::<Quality>().unwrap(), Quality::Kbps320);
        assert!("4k".parse::<Quality>().is_err());
        assert_eq!("mp4".parse::<MediaFormat>().unwrap(), MediaFormat::Mp4);
        assert_eq!(" Mp3 ".parse::<MediaFormat>().unwrap(), MediaFormat::Mp3);
        assert!("webm".parse::<MediaFormat>().is_err());
        assert_eq!(Quality::P1080.height(), Some(1080));
        assert_eq!(Quality::Kbps192.height(), None);
        assert!(Quality::Kbps128.is_audio());
    }

    #[test]
    fn directive_serializes_with_wire_names() {
        let directive = DownloadDirective {
            video_id: "abc".into(),
            quality: Quality::P720,
            format: MediaFormat::Mp4,
            kind: TrackKind::Video,
            status: DirectiveStatus::Ready,
            download_url: Some("https://cdn.example/x.mp4".into()),
            fallback_url: None,
            message: "ok".into(),
            instructions: None,
        };
        let value = serde_json::to_value(&directive).unwrap();
        assert_eq!(value["videoId"], "abc");
        assert_eq!(value["quality"], "720p");
        assert_eq!(value["format"], "MP4");
        assert_eq!(value["type"], "video");
        assert_eq!(value["status"], "ready");
        assert_eq!(value["downloadUrl"], "https://cdn.example/x.mp4");
        assert!(value.get("fallbackUrl").is_none());
    }

    #[test]
    fn standard_options_cover_every_tag() {
        let options = DownloadOptions::standard();
        assert_eq!(options.video.len(), 4);
        assert_eq!(options.audio.len(), 3);
        assert_eq!(options.video[0].estimated_size, "~250 MB");
        assert!(options.audio.iter().all(|o| o.format == MediaFormat::Mp3));
    }
}
