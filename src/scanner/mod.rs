//! Library tree walking and movie-unit construction.
//!
//! Per directory: `Enter -> FilterCheck -> (Recurse | ScanFile) -> Exit`.
//! Sentinel files and exclusion patterns suppress whole directories; disc
//! folders (`VIDEO_TS`/`BDMV`) turn their parent into a single unit; RAR
//! archives are expanded through the virtual filesystem so their members
//! scan like flat files.

pub mod disc;

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use regex::Regex;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use reelscan_parser::{parse_with, ParsedFilename, ParserConfig};

use crate::config::{ArtworkConfig, Config, LibraryRoot, ScannerConfig};
use crate::merge::{FieldUpdate, FieldUpdates, OverrideEngine};
use crate::model::{ExtraFile, FormatType, MediaType, Movie, MovieFile};
use crate::scanner::disc::{probe_disc, DiscStructure};
use crate::vfs::{DirectoryCache, FileNode, RarArchiveScanner, VirtualFileSystem};

/// Source name stamped on fields derived from paths and filenames.
pub const SOURCE_FILENAME: &str = "filename";
/// Source name for fields derived by the disc-structure prober.
pub const SOURCE_DISC: &str = "disc";

const IGNORE_SENTINEL: &str = ".mjbignore";
const NMJ_NO_ALL: &str = ".no_all.nmj";
const NMJ_NO_VIDEO: &str = ".no_video.nmj";
const NMJ_DATABASE: &str = "nmj_database";

enum ExcludeMatcher {
    Pattern(Regex),
    Substring(String),
}

impl ExcludeMatcher {
    fn compile(raw: &str) -> Self {
        if let Some(inner) = raw.strip_prefix('/').and_then(|p| p.strip_suffix('/')) {
            if let Ok(re) = Regex::new(&format!("(?i){inner}")) {
                return ExcludeMatcher::Pattern(re);
            }
            warn!(pattern = raw, "invalid exclusion regex treated as substring");
        }
        ExcludeMatcher::Substring(raw.to_ascii_lowercase())
    }

    fn matches(&self, relative_lower: &str) -> bool {
        match self {
            ExcludeMatcher::Pattern(re) => re.is_match(relative_lower),
            ExcludeMatcher::Substring(s) => relative_lower.contains(s.as_str()),
        }
    }
}

/// Walks library roots and produces draft movies.
pub struct DirectoryScanner {
    scanner: ScannerConfig,
    artwork: ArtworkConfig,
    parser: ParserConfig,
    engine: Arc<OverrideEngine>,
    cache: Arc<DirectoryCache>,
    vfs: VirtualFileSystem,
    /// Lowercased filenames this run generates (artwork), never scanned as
    /// content. Shared process-wide, append-only.
    generated: DashMap<String, ()>,
}

impl DirectoryScanner {
    pub fn new(config: &Config, engine: Arc<OverrideEngine>, cache: Arc<DirectoryCache>) -> Self {
        let vfs = VirtualFileSystem::new(vec![Box::new(RarArchiveScanner::new(
            config.scanner.use_rar_last_modified,
        ))]);
        Self {
            scanner: config.scanner.clone(),
            artwork: config.artwork.clone(),
            parser: config.parser.clone(),
            engine,
            cache,
            vfs,
            generated: DashMap::new(),
        }
    }

    /// Scan one library root, returning its movie units.
    pub fn scan_library(&self, library: &LibraryRoot) -> Vec<Movie> {
        let matchers: Vec<ExcludeMatcher> = library
            .excludes
            .iter()
            .map(|p| ExcludeMatcher::compile(p))
            .collect();

        let root = self.cache.node(&library.path);
        if !root.is_dir() {
            warn!(root = %library.path.display(), "library root is not a directory");
            return Vec::new();
        }

        let mut movies = Vec::new();
        self.scan_dir(&library.path, &root, &matchers, &mut movies);
        // a unit with no playable file is pruned
        movies.retain(Movie::has_playable_file);
        info!(root = %library.path.display(), movies = movies.len(), "library scanned");
        movies
    }

    fn excluded(&self, root: &Path, path: &Path, matchers: &[ExcludeMatcher]) -> bool {
        let relative = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .to_ascii_lowercase();
        matchers.iter().any(|m| m.matches(&relative))
    }

    fn scan_dir(
        &self,
        root: &Path,
        dir: &FileNode,
        matchers: &[ExcludeMatcher],
        out: &mut Vec<Movie>,
    ) {
        let children = self.cache.preload(dir);
        if children.is_empty() {
            return;
        }

        // FilterCheck: sentinel files suppress the directory before any
        // recursion
        for child in &children {
            let name = child.name();
            if name == IGNORE_SENTINEL {
                debug!(dir = %dir.path().display(), "ignore sentinel found, directory skipped");
                return;
            }
            if self.scanner.nmj_compliant && (name == NMJ_NO_ALL || name == NMJ_NO_VIDEO) {
                debug!(dir = %dir.path().display(), sentinel = %name, "nmj sentinel found, directory skipped");
                return;
            }
        }

        // a disc folder makes this directory one unit, no recursion below
        if let Some(disc) = probe_disc(dir.path(), &self.cache) {
            if let Some(movie) = self.build_disc_unit(root, dir, disc) {
                out.push(movie);
            }
            return;
        }

        let mut file_names: Vec<String> = Vec::new();
        let mut subdirs: Vec<FileNode> = Vec::new();
        for child in children {
            if child.is_dir() {
                subdirs.push(child);
            } else {
                file_names.push(child.name());
            }
        }

        // archive expansion consumes the volume names it understood
        let virtual_nodes = self.vfs.expand(dir.path(), &mut file_names, &self.cache);

        let mut content: Vec<FileNode> = Vec::new();
        for name in &file_names {
            let lower = name.to_ascii_lowercase();
            if self.generated.contains_key(&lower) {
                continue;
            }
            if !self.has_video_extension(&lower) {
                continue;
            }
            let node = self.cache.node(&dir.path().join(name));
            if self.excluded(root, node.path(), matchers) {
                debug!(file = %node.path().display(), "excluded by pattern");
                continue;
            }
            content.push(node);
        }
        for node in virtual_nodes {
            self.collect_virtual_content(&node, &mut content);
        }

        self.build_units(root, &content, out);

        for sub in subdirs {
            if self.scanner.nmj_compliant && sub.name() == NMJ_DATABASE {
                continue;
            }
            if self.excluded(root, sub.path(), matchers) {
                debug!(dir = %sub.path().display(), "excluded by pattern");
                continue;
            }
            self.scan_dir(root, &sub, matchers, out);
        }
    }

    fn collect_virtual_content(&self, node: &FileNode, content: &mut Vec<FileNode>) {
        if node.is_dir() {
            for child in node.children() {
                self.collect_virtual_content(&child, content);
            }
        } else if self.has_video_extension(&node.name().to_ascii_lowercase()) {
            content.push(node.clone());
        }
    }

    fn has_video_extension(&self, lower_name: &str) -> bool {
        lower_name
            .rsplit_once('.')
            .is_some_and(|(_, ext)| self.scanner.extensions.iter().any(|e| e == ext))
    }

    /// Group content files into logical units and build one movie each.
    fn build_units(&self, root: &Path, content: &[FileNode], out: &mut Vec<Movie>) {
        #[derive(PartialEq, Eq, Hash)]
        struct GroupKey(String, String, Option<u16>);

        let mut groups: Vec<(GroupKey, Vec<(FileNode, ParsedFilename)>)> = Vec::new();
        let mut extras: Vec<(FileNode, ParsedFilename)> = Vec::new();

        for node in content {
            let parsed = parse_with(&self.parser, &node.name(), true);
            if parsed.extra {
                extras.push((node.clone(), parsed));
                continue;
            }
            let key = GroupKey(
                parsed.title.to_ascii_lowercase(),
                parsed.year.map(|y| y.to_string()).unwrap_or_default(),
                parsed.season,
            );
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, members)) => members.push((node.clone(), parsed)),
                None => groups.push((key, vec![(node.clone(), parsed)])),
            }
        }

        let mut built: HashMap<String, usize> = HashMap::new();
        for (_, mut members) in groups {
            members.sort_by_key(|(_, p)| {
                p.part.or_else(|| p.first_episode().map(u32::from)).unwrap_or(1)
            });
            if let Some(movie) = self.build_file_unit(root, &members) {
                built.insert(movie.title.to_ascii_lowercase(), out.len());
                out.push(movie);
            }
        }

        // extras attach to a same-titled unit when one exists
        for (node, parsed) in extras {
            match built.get(&parsed.title.to_ascii_lowercase()) {
                Some(&idx) => out[idx]
                    .extra_files
                    .push(ExtraFile::new(parsed.title.clone(), node)),
                None => {
                    if let Some(mut movie) = self.build_file_unit(root, &[(node, parsed)]) {
                        movie.media_type = MediaType::Extra;
                        out.push(movie);
                    }
                }
            }
        }
    }

    fn build_file_unit(
        &self,
        root: &Path,
        members: &[(FileNode, ParsedFilename)],
    ) -> Option<Movie> {
        let (first_node, first_parsed) = members.first()?;

        let base = self.base_name(root, first_node);
        let mut movie = Movie::new(base, first_node.clone());
        movie.library_path = first_node
            .path()
            .strip_prefix(root)
            .unwrap_or(first_node.path())
            .to_string_lossy()
            .into_owned();
        movie.media_type = if first_parsed.is_tv() {
            MediaType::TvShow
        } else {
            MediaType::Movie
        };
        movie.season = first_parsed.season;
        movie.sets = first_parsed
            .sets
            .iter()
            .map(|s| (s.title.clone(), s.index))
            .collect();

        let mut next_part: u32 = 1;
        for (node, parsed) in members {
            if !node.exists() {
                warn!(file = %node.path().display(), "content entry vanished, skipped");
                continue;
            }
            let (first, last) =
                if let (Some(f), Some(l)) = (parsed.first_episode(), parsed.last_episode()) {
                    (u32::from(f), u32::from(l))
                } else {
                    let p = parsed.part.unwrap_or(next_part);
                    (p, p)
                };
            next_part = last + 1;
            let mut file = MovieFile::new(node.clone(), first, last);
            if let Some(title) = parsed.episode_title.as_ref().or(parsed.part_title.as_ref()) {
                file.part_titles.insert(first, title.clone());
                file.part_sources.insert(
                    ("episode_title".to_string(), first),
                    SOURCE_FILENAME.to_string(),
                );
            }
            movie.file_size += node.len();
            if movie.file_date.map(|d| Some(d) < node.modified()).unwrap_or(true) {
                movie.file_date = node.modified();
            }
            movie.add_movie_file(file);
        }
        if !movie.has_playable_file() {
            return None;
        }

        self.register_artwork_names(&movie.base_name);
        self.apply_parsed(&mut movie, first_parsed);
        self.detect_subtitles(&mut movie);
        Some(movie)
    }

    fn build_disc_unit(&self, root: &Path, dir: &FileNode, disc: DiscStructure) -> Option<Movie> {
        if disc.kind == FormatType::BluRay
            && self.scanner.exclude_multipart_bluray
            && disc.files.len() > 1
        {
            debug!(dir = %dir.path().display(), "multi-part BluRay excluded by configuration");
            return None;
        }

        let parsed = parse_with(&self.parser, &dir.name(), false);
        let base = self.base_name(root, dir);
        let mut movie = Movie::new(base, dir.clone());
        movie.format_type = disc.kind;
        movie.library_path = dir
            .path()
            .strip_prefix(root)
            .unwrap_or(dir.path())
            .to_string_lossy()
            .into_owned();
        movie.disc_duration_secs = disc.duration_secs;

        // disc units take the disc folder's mtime as the file date
        let marker = match disc.kind {
            FormatType::Dvd => dir.path().join("VIDEO_TS"),
            _ => dir.path().join("BDMV"),
        };
        movie.file_date = self.cache.node(&marker).modified();
        movie.file_size = directory_size(dir.path());

        if disc.kind == FormatType::BluRay && self.scanner.play_full_bluray {
            movie.add_movie_file(MovieFile::new(dir.clone(), 1, 1));
        } else {
            let mut part = 1u32;
            for file in disc.files {
                if !file.exists() {
                    warn!(file = %file.path().display(), "disc content entry missing, skipped");
                    continue;
                }
                movie.add_movie_file(MovieFile::new(file, part, part));
                part += 1;
            }
        }
        if !movie.has_playable_file() {
            warn!(dir = %dir.path().display(), "disc structure yielded no playable files");
            return None;
        }

        self.register_artwork_names(&movie.base_name);
        self.apply_parsed(&mut movie, &parsed);
        if self.scanner.apply_disc_runtime {
            if let Some(secs) = movie.disc_duration_secs {
                let mut updates = FieldUpdates::new(SOURCE_DISC);
                updates.push(FieldUpdate::Runtime(format!("{}", secs / 60)));
                self.engine.apply_all(&mut movie, updates);
            }
        }
        Some(movie)
    }

    /// Sanitized base name, optionally disambiguated with a hash of the
    /// last `hash_path_depth` parent directories.
    fn base_name(&self, root: &Path, node: &FileNode) -> String {
        let stem = node
            .path()
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| node.name());
        let mut base: String = stem
            .chars()
            .map(|c| match c {
                '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
                other => other,
            })
            .collect();

        if self.scanner.hash_path_depth > 0 {
            let mut components: Vec<String> = node
                .path()
                .parent()
                .map(|p| p.strip_prefix(root).unwrap_or(p))
                .iter()
                .flat_map(|p| p.components())
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            let keep = components.len().saturating_sub(self.scanner.hash_path_depth);
            components.drain(..keep);
            if !components.is_empty() {
                let mut hasher = DefaultHasher::new();
                components.hash(&mut hasher);
                base.push('_');
                base.push_str(&format!("{:08x}", hasher.finish() as u32));
            }
        }
        base
    }

    /// Artwork filenames derived for this unit are excluded from scanning.
    fn register_artwork_names(&self, base: &str) {
        for token in [
            &self.artwork.poster_token,
            &self.artwork.fanart_token,
            &self.artwork.banner_token,
            &self.artwork.videoimage_token,
        ] {
            let name = format!("{base}.{token}.{}", self.artwork.format).to_ascii_lowercase();
            self.generated.insert(name, ());
        }
    }

    /// Merge the filename draft through the override gate.
    fn apply_parsed(&self, movie: &mut Movie, parsed: &ParsedFilename) {
        let mut updates = FieldUpdates::new(SOURCE_FILENAME);
        if !parsed.title.is_empty() {
            updates.push(FieldUpdate::Title(parsed.title.clone()));
        }
        if let Some(year) = parsed.year {
            updates.push(FieldUpdate::Year(year.to_string()));
        }
        if !parsed.container.is_empty() {
            updates.push(FieldUpdate::Container(parsed.container.clone()));
        }
        if let Some(v) = &parsed.video_source {
            updates.push(FieldUpdate::VideoSource(v.clone()));
        }
        if let Some(v) = &parsed.video_codec {
            updates.push(FieldUpdate::VideoCodec(v.clone()));
        }
        if let Some(v) = &parsed.audio_codec {
            updates.push(FieldUpdate::AudioCodec(v.clone()));
        }
        if let Some(v) = &parsed.hd_resolution {
            updates.push(FieldUpdate::Resolution(v.clone()));
        }
        if let Some(v) = parsed.fps {
            updates.push(FieldUpdate::Fps(v.to_string()));
        }
        if let Some(v) = &parsed.edition {
            updates.push(FieldUpdate::Edition(v.clone()));
        }
        if !parsed.languages.is_empty() {
            updates.push(FieldUpdate::Language(parsed.languages.join(" / ")));
        }
        self.engine.apply_all(movie, updates);
    }

    /// A subtitle file beside the video sets the subtitles field.
    fn detect_subtitles(&self, movie: &mut Movie) {
        let found = movie.movie_files.iter().any(|mf| {
            let path = mf.file.path();
            self.scanner
                .subtitle_extensions
                .iter()
                .any(|ext| self.cache.file_exists(&path.with_extension(ext)))
        });
        if found {
            let mut updates = FieldUpdates::new(SOURCE_FILENAME);
            updates.push(FieldUpdate::Subtitles("YES".to_string()));
            self.engine.apply_all(movie, updates);
        }
    }
}

/// Recursive size of a directory-based unit.
fn directory_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter_map(|e| e.metadata().ok())
        .filter(|m| m.is_file())
        .map(|m| m.len())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scanner_for(config: &Config) -> DirectoryScanner {
        DirectoryScanner::new(
            config,
            Arc::new(OverrideEngine::from_rules(&config.overrides)),
            Arc::new(DirectoryCache::new()),
        )
    }

    fn library(path: &Path) -> LibraryRoot {
        LibraryRoot {
            path: path.to_path_buf(),
            excludes: Vec::new(),
        }
    }

    #[test]
    fn single_file_becomes_one_movie() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Inception (2010) 1080p.mkv"), b"x").unwrap();

        let config = Config::default();
        let movies = scanner_for(&config).scan_library(&library(dir.path()));
        assert_eq!(movies.len(), 1);
        assert_eq!(movies[0].title, "Inception");
        assert_eq!(movies[0].year, "2010");
        assert_eq!(movies[0].resolution, "1080p");
        assert_eq!(movies[0].movie_files.len(), 1);
    }

    #[test]
    fn ignore_sentinel_suppresses_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".mjbignore"), b"").unwrap();
        fs::write(dir.path().join("Valid Movie (2001).mkv"), b"x").unwrap();

        let config = Config::default();
        let movies = scanner_for(&config).scan_library(&library(dir.path()));
        assert!(movies.is_empty());
    }

    #[test]
    fn nmj_sentinels_respected_only_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".no_video.nmj"), b"").unwrap();
        fs::write(dir.path().join("Movie (2001).mkv"), b"x").unwrap();

        let mut config = Config::default();
        assert_eq!(
            scanner_for(&config).scan_library(&library(dir.path())).len(),
            1
        );

        config.scanner.nmj_compliant = true;
        assert!(scanner_for(&config)
            .scan_library(&library(dir.path()))
            .is_empty());
    }

    #[test]
    fn exclusion_patterns_match_relative_path() {
        let dir = tempfile::tempdir().unwrap();
        let sample = dir.path().join("Samples");
        fs::create_dir(&sample).unwrap();
        fs::write(sample.join("Some Movie (2001).mkv"), b"x").unwrap();
        fs::write(dir.path().join("Kept Movie (2002).mkv"), b"x").unwrap();

        let config = Config::default();
        let mut lib = library(dir.path());
        lib.excludes.push("samples".to_string());
        let movies = scanner_for(&config).scan_library(&lib);
        assert_eq!(movies.len(), 1);
        assert_eq!(movies[0].title, "Kept Movie");
    }

    #[test]
    fn multi_part_files_group_into_one_movie() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Long Film (1999) cd1.avi"), b"x").unwrap();
        fs::write(dir.path().join("Long Film (1999) cd2.avi"), b"y").unwrap();

        let config = Config::default();
        let movies = scanner_for(&config).scan_library(&library(dir.path()));
        assert_eq!(movies.len(), 1);
        assert_eq!(movies[0].movie_files.len(), 2);
        assert_eq!(movies[0].movie_files[0].first_part, 1);
        assert_eq!(movies[0].movie_files[1].first_part, 2);
    }

    #[test]
    fn trailer_attaches_to_its_movie() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Big Film (2005).mkv"), b"x").unwrap();
        fs::write(dir.path().join("Big Film (2005).trailer.mkv"), b"y").unwrap();

        let config = Config::default();
        let movies = scanner_for(&config).scan_library(&library(dir.path()));
        assert_eq!(movies.len(), 1);
        assert_eq!(movies[0].extra_files.len(), 1);
    }

    #[test]
    fn dvd_folder_scans_as_one_unit() {
        let dir = tempfile::tempdir().unwrap();
        let unit = dir.path().join("Gladiator (2000)");
        let video_ts = unit.join("VIDEO_TS");
        fs::create_dir_all(&video_ts).unwrap();
        fs::write(video_ts.join("VTS_01_1.VOB"), vec![0u8; 100]).unwrap();

        let config = Config::default();
        let movies = scanner_for(&config).scan_library(&library(dir.path()));
        assert_eq!(movies.len(), 1);
        assert_eq!(movies[0].format_type, FormatType::Dvd);
        assert_eq!(movies[0].title, "Gladiator");
        assert_eq!(movies[0].container, "DVD");
        assert!(movies[0].file_size >= 100);
    }

    #[test]
    fn subtitle_sidecar_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Subbed Movie (2003).mkv"), b"x").unwrap();
        fs::write(dir.path().join("Subbed Movie (2003).srt"), b"1").unwrap();

        let config = Config::default();
        let movies = scanner_for(&config).scan_library(&library(dir.path()));
        assert_eq!(movies[0].subtitles, "YES");
    }

    #[test]
    fn scan_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Stable Movie (2001) 720p.mkv"), b"x").unwrap();

        let config = Config::default();
        let first = scanner_for(&config).scan_library(&library(dir.path()));
        let second = scanner_for(&config).scan_library(&library(dir.path()));
        assert_eq!(first.len(), second.len());
        assert_eq!(first[0].title, second[0].title);
        assert_eq!(first[0].year, second[0].year);
        assert_eq!(first[0].resolution, second[0].resolution);
        assert_eq!(first[0].dirty, second[0].dirty);
    }

    #[test]
    fn hash_path_depth_disambiguates_identical_names() {
        let dir = tempfile::tempdir().unwrap();
        for sub in ["one", "two"] {
            let d = dir.path().join(sub);
            fs::create_dir(&d).unwrap();
            fs::write(d.join("movie (2001).mkv"), b"x").unwrap();
        }

        let mut config = Config::default();
        config.scanner.hash_path_depth = 1;
        let movies = scanner_for(&config).scan_library(&library(dir.path()));
        assert_eq!(movies.len(), 2);
        assert_ne!(movies[0].base_name, movies[1].base_name);
    }
}
