use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use reelscan_parser::ParserConfig;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub libraries: Vec<LibraryRoot>,

    #[serde(default)]
    pub scanner: ScannerConfig,

    #[serde(default)]
    pub artwork: ArtworkConfig,

    #[serde(default)]
    pub nfo: NfoConfig,

    #[serde(default)]
    pub recheck: RecheckConfig,

    /// (field, source) pairs allowed to overwrite an already-set value.
    #[serde(default)]
    pub overrides: Vec<OverrideRule>,

    #[serde(default)]
    pub workers: WorkersConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub parser: ParserConfig,

    /// Where the run fingerprint document is kept.
    #[serde(default)]
    pub state_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LibraryRoot {
    pub path: PathBuf,

    /// Exclusion patterns evaluated against the lowercased path relative
    /// to this root. A pattern wrapped in slashes (`/re/.../`) is a regex,
    /// anything else is a substring match.
    #[serde(default)]
    pub excludes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScannerConfig {
    /// Extensions treated as playable video content.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Extensions checked for subtitle sidecars beside the video.
    #[serde(default = "default_subtitle_extensions")]
    pub subtitle_extensions: Vec<String>,

    /// Number of parent directories hashed into the base name suffix to
    /// disambiguate identical filenames (0 disables).
    #[serde(default)]
    pub hash_path_depth: usize,

    /// Honor NMJ sentinel files and skip `nmj_database` directories.
    #[serde(default)]
    pub nmj_compliant: bool,

    /// Point BluRay units at the disc root instead of the main stream.
    #[serde(default)]
    pub play_full_bluray: bool,

    /// Drop BluRay units whose disc prober reports multiple files.
    #[serde(default)]
    pub exclude_multipart_bluray: bool,

    /// Let the disc prober's aggregate duration land on the movie.
    #[serde(default = "default_true")]
    pub apply_disc_runtime: bool,

    /// Virtual archive members inherit the archive file's mtime instead of
    /// the packed entry's own stamp.
    #[serde(default)]
    pub use_rar_last_modified: bool,
}

fn default_extensions() -> Vec<String> {
    [
        "avi", "mkv", "mp4", "m4v", "mpg", "mpeg", "mov", "wmv", "ts", "ogm", "divx", "iso",
        "img", "vob", "m2ts",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_subtitle_extensions() -> Vec<String> {
    ["srt", "sub", "ssa", "smi"].iter().map(|s| s.to_string()).collect()
}

fn default_true() -> bool {
    true
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            subtitle_extensions: default_subtitle_extensions(),
            hash_path_depth: 0,
            nmj_compliant: false,
            play_full_bluray: false,
            exclude_multipart_bluray: false,
            apply_disc_runtime: true,
            use_rar_last_modified: false,
        }
    }
}

/// Filename tokens and image format used both to derive artwork filenames
/// and to classify embedded attachments.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArtworkConfig {
    #[serde(default = "default_poster_token")]
    pub poster_token: String,

    #[serde(default = "default_fanart_token")]
    pub fanart_token: String,

    #[serde(default = "default_banner_token")]
    pub banner_token: String,

    #[serde(default = "default_videoimage_token")]
    pub videoimage_token: String,

    #[serde(default = "default_image_format")]
    pub format: String,
}

fn default_poster_token() -> String {
    "poster".to_string()
}
fn default_fanart_token() -> String {
    "fanart".to_string()
}
fn default_banner_token() -> String {
    "banner".to_string()
}
fn default_videoimage_token() -> String {
    "videoimage".to_string()
}
fn default_image_format() -> String {
    "jpg".to_string()
}

impl Default for ArtworkConfig {
    fn default() -> Self {
        Self {
            poster_token: default_poster_token(),
            fanart_token: default_fanart_token(),
            banner_token: default_banner_token(),
            videoimage_token: default_videoimage_token(),
            format: default_image_format(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NfoConfig {
    /// Recognized sidecar extensions.
    #[serde(default = "default_nfo_extensions")]
    pub extensions: Vec<String>,

    /// Alternate directory probed for sidecars, relative names resolve
    /// against each library root.
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Accept any recognized-extension file in the unit's directory (and
    /// its parent for multi-part layouts) instead of name-matched files
    /// only.
    #[serde(default)]
    pub accept_all: bool,
}

fn default_nfo_extensions() -> Vec<String> {
    vec!["nfo".to_string()]
}

impl Default for NfoConfig {
    fn default() -> Self {
        Self {
            extensions: default_nfo_extensions(),
            directory: None,
            accept_all: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecheckConfig {
    /// Upper bound on rescans per run (0 disables bounded checks).
    #[serde(default = "default_recheck_max")]
    pub max: usize,

    /// Minimum days since the last scan before age-based rechecks fire.
    #[serde(default = "default_recheck_min_days")]
    pub min_days: i64,

    /// Days after which a movie is considered stale.
    #[serde(default = "default_recheck_days")]
    pub days: i64,

    /// Rescan on persisted tool version mismatch (always-on check).
    #[serde(default = "default_true")]
    pub version_check: bool,

    /// Revision drift beyond which a rescan fires.
    #[serde(default = "default_revision_tolerance")]
    pub revision_tolerance: u32,

    /// Rescan when cast is empty while people collection is enabled
    /// (always-on check).
    #[serde(default)]
    pub require_cast: bool,

    #[serde(default = "default_true")]
    pub require_plot: bool,

    #[serde(default = "default_true")]
    pub require_year: bool,

    #[serde(default = "default_true")]
    pub require_genres: bool,

    #[serde(default = "default_true")]
    pub require_poster: bool,

    #[serde(default = "default_true")]
    pub require_fanart: bool,

    /// TV shows only: banner artwork required.
    #[serde(default)]
    pub require_banner: bool,

    #[serde(default)]
    pub require_rating: bool,

    #[serde(default = "default_true")]
    pub episode_title: bool,

    #[serde(default)]
    pub episode_plot: bool,

    #[serde(default)]
    pub episode_air_date: bool,

    #[serde(default)]
    pub episode_rating: bool,

    #[serde(default)]
    pub episode_image: bool,
}

fn default_recheck_max() -> usize {
    50
}
fn default_recheck_min_days() -> i64 {
    7
}
fn default_recheck_days() -> i64 {
    45
}
fn default_revision_tolerance() -> u32 {
    25
}

impl Default for RecheckConfig {
    fn default() -> Self {
        Self {
            max: default_recheck_max(),
            min_days: default_recheck_min_days(),
            days: default_recheck_days(),
            version_check: true,
            revision_tolerance: default_revision_tolerance(),
            require_cast: false,
            require_plot: true,
            require_year: true,
            require_genres: true,
            require_poster: true,
            require_fanart: true,
            require_banner: false,
            require_rating: false,
            episode_title: true,
            episode_plot: false,
            episode_air_date: false,
            episode_rating: false,
            episode_image: false,
        }
    }
}

/// One entry of the override allow-list.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OverrideRule {
    pub field: String,
    pub source: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkersConfig {
    /// Slots for CPU/local scan work.
    #[serde(default = "default_running")]
    pub running: usize,

    /// Slots for network/external-process work.
    #[serde(default = "default_io")]
    pub io: usize,

    /// Per-host concurrency limits: regex pattern -> limit,
    /// longest-pattern-wins.
    #[serde(default)]
    pub host_limits: Vec<HostLimit>,

    /// Movies fully rescanned per invocation (0 = unlimited).
    #[serde(default)]
    pub max_scans: usize,
}

fn default_running() -> usize {
    4
}
fn default_io() -> usize {
    8
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            running: default_running(),
            io: default_io(),
            host_limits: Vec::new(),
            max_scans: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HostLimit {
    pub pattern: String,
    pub limit: usize,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub mediainfo_path: Option<PathBuf>,

    #[serde(default)]
    pub mkvmerge_path: Option<PathBuf>,

    #[serde(default)]
    pub mkvextract_path: Option<PathBuf>,
}
