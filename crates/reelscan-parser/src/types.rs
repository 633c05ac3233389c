//! Result types produced by the filename parser.

use serde::{Deserialize, Serialize};

/// Draft metadata derived purely from a path and file name.
///
/// All fields are candidates: downstream merge logic decides whether they
/// are allowed to land on a movie record. Parsing the same input always
/// yields the same value here; the parser performs no I/O.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedFilename {
    /// Cleaned-up title, empty when nothing usable was found.
    pub title: String,
    /// Release year when a plausible four-digit token was present.
    pub year: Option<u16>,
    /// Season number for TV-style names.
    pub season: Option<u16>,
    /// Episode numbers, in filename order (multi-episode files list all).
    pub episodes: Vec<u16>,
    /// Multi-part ordinal (CD2, DISC 1, ...).
    pub part: Option<u32>,
    /// Title text following a part marker, if any.
    pub part_title: Option<String>,
    /// Title text following the season/episode tag, if any.
    pub episode_title: Option<String>,
    /// True when an extras keyword (trailer, featurette, ...) was seen.
    pub extra: bool,
    /// Edition marker (Director's Cut, Extended, ...), as written.
    pub edition: Option<String>,
    /// Canonical language labels, in detection order, duplicates removed.
    pub languages: Vec<String>,
    /// Frame rate when a rate keyword was present.
    pub fps: Option<u32>,
    /// Canonical audio codec label.
    pub audio_codec: Option<String>,
    /// Canonical video codec label.
    pub video_codec: Option<String>,
    /// HD resolution label (720p, 1080p, ...).
    pub hd_resolution: Option<String>,
    /// Canonical video source label (BluRay, DVDRip, HDTV, ...).
    pub video_source: Option<String>,
    /// `[SET name-index]` markers.
    pub sets: Vec<SetMarker>,
    /// Upper-cased file extension; empty for directory units.
    pub container: String,
}

/// A collection membership marker parsed from `[SET name-index]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetMarker {
    pub title: String,
    pub index: Option<u32>,
}

impl ParsedFilename {
    /// True when the name carried a season/episode tag.
    pub fn is_tv(&self) -> bool {
        self.season.is_some() || !self.episodes.is_empty()
    }

    /// First episode number, when present.
    pub fn first_episode(&self) -> Option<u16> {
        self.episodes.first().copied()
    }

    /// Last episode number, when present.
    pub fn last_episode(&self) -> Option<u16> {
        self.episodes.last().copied()
    }
}
