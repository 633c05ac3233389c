//! Media prober interface and report types.
//!
//! A prober inspects a content file (or disc root) and returns structured
//! general/video/audio/text attribute maps keyed by human-readable labels.
//! Probers are external collaborators; the shipped implementation shells
//! out to `mediainfo`.

mod mediainfo;

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;

pub use mediainfo::MediaInfoProber;

/// Source name stamped on fields produced by probing.
pub const SOURCE_MEDIAINFO: &str = "mediainfo";

/// Structured probe output: attribute maps per stream kind.
///
/// Labels are kept as reported by the tool; lookups go through
/// [`ProbeReport::general_value`] and friends, which tolerate the
/// locale-varied spellings some tool builds emit.
#[derive(Debug, Clone, Default)]
pub struct ProbeReport {
    pub general: HashMap<String, String>,
    pub video: Vec<HashMap<String, String>>,
    pub audio: Vec<HashMap<String, String>>,
    pub text: Vec<HashMap<String, String>>,
}

impl ProbeReport {
    /// Look up a general-section attribute under any of the given labels.
    pub fn general_value(&self, labels: &[&str]) -> Option<&str> {
        labels
            .iter()
            .find_map(|l| self.general.get(*l))
            .map(String::as_str)
    }

    pub fn video_value(&self, stream: usize, labels: &[&str]) -> Option<&str> {
        self.video
            .get(stream)
            .and_then(|m| labels.iter().find_map(|l| m.get(*l)))
            .map(String::as_str)
    }

    /// Distinct audio-track languages, in stream order.
    pub fn audio_languages(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for track in &self.audio {
            if let Some(lang) = track.get("Language") {
                if !out.contains(&lang.as_str()) {
                    out.push(lang);
                }
            }
        }
        out
    }

    /// Distinct subtitle-track languages, in stream order.
    pub fn text_languages(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for track in &self.text {
            if let Some(lang) = track.get("Language") {
                if !out.contains(&lang.as_str()) {
                    out.push(lang);
                }
            }
        }
        out
    }
}

/// Async interface every media prober implements.
#[async_trait]
pub trait MediaProber: Send + Sync {
    /// Short lowercase identifier, also used as the merge source name.
    fn name(&self) -> &'static str;

    /// False when the backing tool is missing; probing is then skipped
    /// for the whole run.
    fn is_available(&self) -> bool;

    async fn probe(&self, path: &Path) -> anyhow::Result<ProbeReport>;
}
