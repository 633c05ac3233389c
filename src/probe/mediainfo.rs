//! `mediainfo` text-output prober.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::warn;

use super::{MediaProber, ProbeReport, SOURCE_MEDIAINFO};

/// Section labels vary with the tool build's locale; both spellings of the
/// general section have been seen in the wild.
const GENERAL_LABELS: &[&str] = &["General", "G\u{e9}n\u{e9}ral"];
const VIDEO_LABELS: &[&str] = &["Video", "Vid\u{e9}o"];
const AUDIO_LABELS: &[&str] = &["Audio"];
const TEXT_LABELS: &[&str] = &["Text", "Texte"];

pub struct MediaInfoProber {
    executable: Option<PathBuf>,
}

impl MediaInfoProber {
    /// Locate the tool, honoring an explicit configured path first.
    pub fn new(configured: Option<&Path>) -> Self {
        let executable = match configured {
            Some(path) if path.exists() => Some(path.to_path_buf()),
            Some(path) => {
                warn!(path = %path.display(), "configured mediainfo path does not exist");
                None
            }
            None => which::which("mediainfo").ok(),
        };
        if executable.is_none() {
            warn!("mediainfo not found, technical probing disabled for this run");
        }
        Self { executable }
    }

    /// A prober with no backing tool; probing is skipped entirely.
    pub fn unavailable() -> Self {
        Self { executable: None }
    }
}

#[async_trait]
impl MediaProber for MediaInfoProber {
    fn name(&self) -> &'static str {
        SOURCE_MEDIAINFO
    }

    fn is_available(&self) -> bool {
        self.executable.is_some()
    }

    async fn probe(&self, path: &Path) -> anyhow::Result<ProbeReport> {
        let exe = self
            .executable
            .as_ref()
            .context("mediainfo executable not available")?;
        let output = Command::new(exe)
            .arg("--Output=TEXT")
            .arg(path)
            .output()
            .await
            .with_context(|| format!("failed to run mediainfo on {}", path.display()))?;
        if !output.status.success() {
            anyhow::bail!(
                "mediainfo exited with {} for {}",
                output.status,
                path.display()
            );
        }
        Ok(parse_text_output(&String::from_utf8_lossy(&output.stdout)))
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    General,
    Video,
    Audio,
    Text,
    Other,
}

/// Parse `mediainfo` plain-text output into per-section attribute maps.
///
/// Section headers are bare lines ("Video", "Audio #2"); attribute lines
/// are "Label : value" with a wide padded label column.
pub fn parse_text_output(text: &str) -> ProbeReport {
    let mut report = ProbeReport::default();
    let mut section = Section::Other;
    let mut current: HashMap<String, String> = HashMap::new();

    let flush = |section: Section, current: &mut HashMap<String, String>, report: &mut ProbeReport| {
        if current.is_empty() {
            return;
        }
        let map = std::mem::take(current);
        match section {
            Section::General => report.general = map,
            Section::Video => report.video.push(map),
            Section::Audio => report.audio.push(map),
            Section::Text => report.text.push(map),
            Section::Other => {}
        }
    };

    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        match line.split_once(':') {
            Some((label, value)) => {
                let label = label.trim();
                let value = value.trim();
                if !label.is_empty() && !value.is_empty() {
                    current.insert(label.to_string(), value.to_string());
                }
            }
            None => {
                // a bare line opens a new section
                flush(section, &mut current, &mut report);
                let header = line.split('#').next().unwrap_or(line).trim();
                section = if GENERAL_LABELS.contains(&header) {
                    Section::General
                } else if VIDEO_LABELS.contains(&header) {
                    Section::Video
                } else if AUDIO_LABELS.contains(&header) {
                    Section::Audio
                } else if TEXT_LABELS.contains(&header) {
                    Section::Text
                } else {
                    Section::Other
                };
            }
        }
    }
    flush(section, &mut current, &mut report);
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
General
Complete name            : /library/movie.mkv
Format                   : Matroska
Duration                 : 2 h 28 min

Video
Format                   : AVC
Width                    : 1 920 pixels
Height                   : 1 080 pixels
Frame rate               : 23.976 FPS

Audio #1
Format                   : DTS
Language                 : English

Audio #2
Format                   : AC-3
Language                 : French

Text #1
Format                   : UTF-8
Language                 : English
";

    #[test]
    fn sections_and_tracks_are_split() {
        let report = parse_text_output(SAMPLE);
        assert_eq!(report.general.get("Format").unwrap(), "Matroska");
        assert_eq!(report.video.len(), 1);
        assert_eq!(report.audio.len(), 2);
        assert_eq!(report.text.len(), 1);
        assert_eq!(report.audio_languages(), vec!["English", "French"]);
        assert_eq!(report.text_languages(), vec!["English"]);
    }

    #[test]
    fn localized_general_header_is_recognized() {
        let localized = SAMPLE.replacen("General", "G\u{e9}n\u{e9}ral", 1);
        let report = parse_text_output(&localized);
        assert_eq!(
            report.general_value(&["General", "Format"]),
            Some("Matroska")
        );
        assert_eq!(report.general.get("Format").unwrap(), "Matroska");
    }

    #[test]
    fn unavailable_prober_reports_it() {
        let prober = MediaInfoProber::unavailable();
        assert!(!prober.is_available());
    }
}
