//! Turns user-supplied YouTube links into canonical video identifiers.

use crate::models::VideoReference;
use once_cell::sync::Lazy;
use regex::Regex;

/// Accepted URL shapes, in priority order. When several rules match the same
/// input, the earliest rule in this list decides the identifier.
static REFERENCE_RULES: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        ("watch", r"youtube\.com/watch\?v=([^&\n?#]+)"),
        ("short-link", r"youtu\.be/([^&\n?#]+)"),
        ("embed", r"youtube\.com/embed/([^&\n?#]+)"),
        ("legacy", r"youtube\.com/v/([^&\n?#]+)"),
        ("shorts", r"youtube\.com/shorts/([^&\n?#]+)"),
    ]
    .into_iter()
    .map(|(name, pattern)| (name, Regex::new(pattern).unwrap()))
    .collect()
});

const KNOWN_DOMAINS: [&str; 2] = ["youtube.com", "youtu.be"];

/// Extracts the video id from any accepted link shape, or `None`.
pub fn resolve_video_id(raw_url: &str) -> Option<VideoReference> {
    REFERENCE_RULES.iter().find_map(|(name, rule)| {
        let id = rule.captures(raw_url)?.get(1)?.as_str();
        tracing::debug!(rule = *name, id, "Resolved video reference");
        Some(VideoReference { id: id.to_string() })
    })
}

/// Cheap domain check run before `resolve_video_id`.
///
/// Deliberately looser than the resolver: any string mentioning a YouTube
/// domain passes, even when no accepted path shape follows it.
pub fn is_valid_reference(raw_url: &str) -> bool {
    KNOWN_DOMAINS.iter().any(|domain| raw_url.contains(domain))
}
