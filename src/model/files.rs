use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::vfs::FileNode;

/// One physical or virtual playable unit belonging to a movie.
///
/// A single file may span several parts (multi-episode TV files), hence the
/// first/last part range. Per-part descriptive fields are keyed by part
/// number; an absent entry means "unknown" for that part.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovieFile {
    pub file: FileNode,
    pub first_part: u32,
    pub last_part: u32,
    /// Set when the file was newly discovered this run, or forced by the
    /// recheck policy to make episode enrichment re-run.
    pub new_file: bool,

    pub part_titles: HashMap<u32, String>,
    pub part_plots: HashMap<u32, String>,
    pub part_air_dates: HashMap<u32, String>,
    pub part_ratings: HashMap<u32, i32>,
    pub part_image_urls: HashMap<u32, String>,
    /// Origin source per (per-part field name, part number). Run-scoped
    /// provenance, not persisted.
    #[serde(skip)]
    pub part_sources: HashMap<(String, u32), String>,

    pub watched: bool,
    pub watched_date: Option<DateTime<Utc>>,

    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

impl MovieFile {
    pub fn new(file: FileNode, first_part: u32, last_part: u32) -> Self {
        let size = file.len();
        let last_modified = file.modified();
        Self {
            file,
            first_part,
            last_part,
            new_file: true,
            part_titles: HashMap::new(),
            part_plots: HashMap::new(),
            part_air_dates: HashMap::new(),
            part_ratings: HashMap::new(),
            part_image_urls: HashMap::new(),
            part_sources: HashMap::new(),
            watched: false,
            watched_date: None,
            size,
            last_modified,
        }
    }

    /// Part numbers covered by this file, in order.
    pub fn parts(&self) -> impl Iterator<Item = u32> + '_ {
        self.first_part..=self.last_part
    }
}

/// A trailer or other non-primary playable asset attached to a movie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtraFile {
    pub title: String,
    pub file: FileNode,
}

impl ExtraFile {
    pub fn new(title: impl Into<String>, file: FileNode) -> Self {
        Self {
            title: title.into(),
            file,
        }
    }
}
