use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::merge::Field;
use crate::model::{is_unknown, Attachment, ExtraFile, MovieFile, UNKNOWN};
use crate::vfs::FileNode;

/// Physical layout of the content backing a movie unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatType {
    /// Ordinary file(s) on disk (or inside an archive).
    Single,
    /// `VIDEO_TS` disc folder scanned as one unit.
    Dvd,
    /// `BDMV` disc folder scanned as one unit.
    BluRay,
}

/// Broad classification used by enrichment and recheck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    TvShow,
    Extra,
}

/// Aspects of a movie that changed this run and must be re-persisted.
///
/// The scan/enrichment core only ever sets these; the render/persist stage
/// clears them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirtyFlag {
    Info,
    Nfo,
    Poster,
    Fanart,
    Banner,
    Watched,
    Recheck,
}

/// The central aggregate: one logical playable work.
///
/// String-typed descriptive fields default to the [`UNKNOWN`] sentinel and
/// are only ever written through the override merge engine, which records
/// the origin source per field in `field_sources`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Movie {
    /// Sanitized base name, unique within the run (hash-suffixed when
    /// configured).
    pub base_name: String,
    /// Path relative to the library root this unit was found under.
    pub library_path: String,
    /// The content file or disc-folder directory backing this unit.
    pub container_file: FileNode,
    pub format_type: FormatType,
    pub media_type: MediaType,

    pub title: String,
    pub original_title: String,
    pub year: String,
    pub plot: String,
    pub outline: String,
    pub runtime: String,
    pub resolution: String,
    pub aspect_ratio: String,
    pub video_source: String,
    pub container: String,
    pub video_codec: String,
    pub audio_codec: String,
    pub fps: String,
    pub language: String,
    pub subtitles: String,
    pub certification: String,
    pub release_date: String,
    pub edition: String,
    pub poster_url: String,
    pub fanart_url: String,
    pub banner_url: String,

    pub genres: Vec<String>,
    pub cast: Vec<String>,
    pub directors: Vec<String>,
    pub writers: Vec<String>,
    /// Site name -> rating (0-100).
    pub ratings: HashMap<String, i32>,
    /// Provider name -> external identifier.
    pub ids: HashMap<String, String>,
    /// Set membership: (set title, optional index within the set).
    pub sets: Vec<(String, Option<u32>)>,

    pub season: Option<u16>,

    /// One entry per physical part/episode file, ordered by part number.
    pub movie_files: Vec<MovieFile>,
    pub extra_files: Vec<ExtraFile>,
    pub attachments: Vec<Attachment>,

    /// Origin source per field, written by the merge engine only.
    pub field_sources: HashMap<Field, String>,
    pub dirty: HashSet<DirtyFlag>,

    /// Modification time of the backing unit (disc folder mtime for
    /// DVD/BluRay).
    pub file_date: Option<DateTime<Utc>>,
    /// Total size in bytes, recursive for directory units.
    pub file_size: u64,
    /// Aggregate duration in seconds reported by the disc prober, if any.
    pub disc_duration_secs: Option<u32>,

    /// Tool version/revision stamped at persist time, compared on reload.
    pub scanner_version: String,
    pub scanner_revision: u32,
    /// When this movie was last fully enriched, for staleness checks.
    pub last_scanned: Option<DateTime<Utc>>,
}

impl Movie {
    pub fn new(base_name: impl Into<String>, container_file: FileNode) -> Self {
        Self {
            base_name: base_name.into(),
            library_path: String::new(),
            container_file,
            format_type: FormatType::Single,
            media_type: MediaType::Movie,
            title: UNKNOWN.to_string(),
            original_title: UNKNOWN.to_string(),
            year: UNKNOWN.to_string(),
            plot: UNKNOWN.to_string(),
            outline: UNKNOWN.to_string(),
            runtime: UNKNOWN.to_string(),
            resolution: UNKNOWN.to_string(),
            aspect_ratio: UNKNOWN.to_string(),
            video_source: UNKNOWN.to_string(),
            container: UNKNOWN.to_string(),
            video_codec: UNKNOWN.to_string(),
            audio_codec: UNKNOWN.to_string(),
            fps: UNKNOWN.to_string(),
            language: UNKNOWN.to_string(),
            subtitles: UNKNOWN.to_string(),
            certification: UNKNOWN.to_string(),
            release_date: UNKNOWN.to_string(),
            edition: UNKNOWN.to_string(),
            poster_url: UNKNOWN.to_string(),
            fanart_url: UNKNOWN.to_string(),
            banner_url: UNKNOWN.to_string(),
            genres: Vec::new(),
            cast: Vec::new(),
            directors: Vec::new(),
            writers: Vec::new(),
            ratings: HashMap::new(),
            ids: HashMap::new(),
            sets: Vec::new(),
            season: None,
            movie_files: Vec::new(),
            extra_files: Vec::new(),
            attachments: Vec::new(),
            field_sources: HashMap::new(),
            dirty: HashSet::new(),
            file_date: None,
            file_size: 0,
            disc_duration_secs: None,
            scanner_version: String::new(),
            scanner_revision: 0,
            last_scanned: None,
        }
    }

    pub fn is_tv(&self) -> bool {
        self.media_type == MediaType::TvShow
    }

    pub fn is_extra(&self) -> bool {
        self.media_type == MediaType::Extra
    }

    /// Origin source recorded for a field, when one has been accepted.
    pub fn source_of(&self, field: Field) -> Option<&str> {
        self.field_sources.get(&field).map(String::as_str)
    }

    pub fn mark_dirty(&mut self, flag: DirtyFlag) {
        self.dirty.insert(flag);
    }

    pub fn is_dirty(&self, flag: DirtyFlag) -> bool {
        self.dirty.contains(&flag)
    }

    /// A movie with no playable file left is pruned from the working set.
    pub fn has_playable_file(&self) -> bool {
        !self.movie_files.is_empty()
    }

    /// The movie file covering `part`, when one exists.
    pub fn file_for_part(&self, part: u32) -> Option<&MovieFile> {
        self.movie_files
            .iter()
            .find(|f| f.first_part <= part && part <= f.last_part)
    }

    pub fn file_for_part_mut(&mut self, part: u32) -> Option<&mut MovieFile> {
        self.movie_files
            .iter_mut()
            .find(|f| f.first_part <= part && part <= f.last_part)
    }

    /// Add a movie file keeping the collection ordered by part number.
    pub fn add_movie_file(&mut self, file: MovieFile) {
        self.movie_files.push(file);
        self.movie_files.sort_by_key(|f| f.first_part);
    }

    /// True when the string field named by `field` still carries the
    /// sentinel. List- and map-typed fields count as unknown when empty.
    pub fn field_is_unknown(&self, field: Field) -> bool {
        match field {
            Field::Title => is_unknown(&self.title),
            Field::OriginalTitle => is_unknown(&self.original_title),
            Field::Year => is_unknown(&self.year),
            Field::Plot => is_unknown(&self.plot),
            Field::Outline => is_unknown(&self.outline),
            Field::Runtime => is_unknown(&self.runtime),
            Field::Resolution => is_unknown(&self.resolution),
            Field::AspectRatio => is_unknown(&self.aspect_ratio),
            Field::VideoSource => is_unknown(&self.video_source),
            Field::Container => is_unknown(&self.container),
            Field::VideoCodec => is_unknown(&self.video_codec),
            Field::AudioCodec => is_unknown(&self.audio_codec),
            Field::Fps => is_unknown(&self.fps),
            Field::Language => is_unknown(&self.language),
            Field::Subtitles => is_unknown(&self.subtitles),
            Field::Certification => is_unknown(&self.certification),
            Field::ReleaseDate => is_unknown(&self.release_date),
            Field::Edition => is_unknown(&self.edition),
            Field::PosterUrl => is_unknown(&self.poster_url),
            Field::FanartUrl => is_unknown(&self.fanart_url),
            Field::BannerUrl => is_unknown(&self.banner_url),
            Field::Genres => self.genres.is_empty(),
            Field::Cast => self.cast.is_empty(),
            Field::Directors => self.directors.is_empty(),
            Field::Writers => self.writers.is_empty(),
            Field::Rating => self.ratings.is_empty(),
            Field::EpisodeTitle
            | Field::EpisodePlot
            | Field::EpisodeAirDate
            | Field::EpisodeRating
            | Field::EpisodeImage => true,
        }
    }
}
