//! Human-navigable download pages offered when the conversion service fails.

use crate::models::{FallbackLink, TrackKind, VideoReference};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

/// Characters left untouched by JavaScript's `encodeURIComponent`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// One external page. `template` may contain `{id}` and `{url}`; the latter is
/// the canonical watch URL, percent-encoded.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FallbackService {
    pub name: String,
    pub template: String,
}

impl FallbackService {
    pub fn new(name: &str, template: &str) -> Self {
        FallbackService { name: name.to_string(), template: template.to_string() }
    }

    pub fn build_url(&self, reference: &VideoReference) -> String {
        let encoded = utf8_percent_encode(&reference.watch_url(), COMPONENT).to_string();
        self.template.replace("{id}", &reference.id).replace("{url}", &encoded)
    }

    pub fn link_for(&self, reference: &VideoReference) -> FallbackLink {
        FallbackLink { name: self.name.clone(), url: self.build_url(reference) }
    }
}

/// Ordered catalogue per track family. Entry zero is the automatic choice.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FallbackCatalogue {
    pub video: Vec<FallbackService>,
    pub audio: Vec<FallbackService>,
}

impl Default for FallbackCatalogue {
    fn default() -> Self {
        FallbackCatalogue {
            video: vec![
                FallbackService::new("SaveFrom", "https://en.savefrom.net/#url={url}"),
                FallbackService::new("9xbuddy", "https://9xbuddy.org/process?url={url}"),
                FallbackService::new("Y2Mate", "https://y2mate.com/youtube/{id}"),
            ],
            audio: vec![
                FallbackService::new("YTMP3", "https://ytmp3.cc/en2/{id}/"),
                FallbackService::new("MP3Juice", "https://mp3juices.cc/?q={url}"),
                FallbackService::new("AudioDownloader", "https://320ytmp3.com/en/download?v={id}"),
            ],
        }
    }
}

impl FallbackCatalogue {
    pub fn services(&self, kind: TrackKind) -> &[FallbackService] {
        match kind {
            TrackKind::Video => &self.video,
            TrackKind::Audio => &self.audio,
        }
    }

    pub fn links(&self, reference: &VideoReference, kind: TrackKind) -> Vec<FallbackLink> {
        self.services(kind).iter().map(|s| s.link_for(reference)).collect()
    }

    pub fn primary(&self, kind: TrackKind) -> Option<&FallbackService> {
        self.services(kind).first()
    }
}
