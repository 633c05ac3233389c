//! Sidecar NFO discovery and parsing.
//!
//! Candidate locations are probed in a strict priority order and all hits
//! accumulate; parsing then runs from the most general hit to the most
//! specific, so specific files override general ones through same-source
//! rewrites rather than merge-engine precedence.

use std::path::{Path, PathBuf};

use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::config::NfoConfig;
use crate::merge::{FieldUpdate, FieldUpdates, OverrideEngine};
use crate::model::{DirtyFlag, FormatType, MediaType, Movie};
use crate::vfs::DirectoryCache;

/// Source name stamped on NFO-derived fields.
pub const SOURCE_NFO: &str = "nfo";

pub struct NfoReader {
    config: NfoConfig,
}

impl NfoReader {
    pub fn new(config: NfoConfig) -> Self {
        Self { config }
    }

    /// Locate, parse and merge every sidecar for `movie`. Returns the
    /// number of files parsed.
    pub fn scan(
        &self,
        movie: &mut Movie,
        library_root: &Path,
        cache: &DirectoryCache,
        engine: &OverrideEngine,
    ) -> usize {
        // most specific first, then reversed so it parses last
        let mut candidates = self.locate(movie, library_root, cache);
        candidates.reverse();

        let mut parsed = 0;
        for path in candidates {
            let content = match std::fs::read_to_string(&path) {
                Ok(c) => c,
                Err(err) => {
                    warn!(nfo = %path.display(), %err, "unreadable sidecar skipped");
                    continue;
                }
            };
            debug!(nfo = %path.display(), movie = %movie.base_name, "parsing sidecar");
            apply_nfo_content(&content, movie, engine);
            parsed += 1;
        }
        if parsed > 0 {
            movie.mark_dirty(DirtyFlag::Nfo);
        }
        parsed
    }

    /// Accumulate candidate paths in priority order, most specific first.
    /// No short-circuiting: every location is probed.
    fn locate(&self, movie: &Movie, library_root: &Path, cache: &DirectoryCache) -> Vec<PathBuf> {
        let mut found: Vec<PathBuf> = Vec::new();
        let push = |found: &mut Vec<PathBuf>, path: PathBuf| {
            if cache.file_exists(&path) && !found.contains(&path) {
                found.push(path);
            }
        };

        let container = movie.container_file.path();
        let unit_dir = if movie.container_file.is_dir() {
            container.to_path_buf()
        } else {
            container.parent().unwrap_or(library_root).to_path_buf()
        };

        // (1) disc-folder-named files for disc units
        if movie.format_type != FormatType::Single {
            for ext in &self.config.extensions {
                if let Some(name) = container.file_name() {
                    let mut file = name.to_os_string();
                    file.push(format!(".{ext}"));
                    push(&mut found, container.join(file));
                }
                push(&mut found, container.join(format!("VIDEO_TS.{ext}")));
            }
        }

        // (2) show-level file for TV units
        if movie.media_type == MediaType::TvShow {
            for ext in &self.config.extensions {
                push(&mut found, unit_dir.join(format!("tvshow.{ext}")));
                if let Some(parent) = unit_dir.parent() {
                    push(&mut found, parent.join(format!("tvshow.{ext}")));
                }
            }
        }

        // (3) per-episode files
        for mf in &movie.movie_files {
            for ext in &self.config.extensions {
                push(&mut found, mf.file.path().with_extension(ext));
            }
        }

        // (4) same-basename file beside the video
        for ext in &self.config.extensions {
            push(&mut found, container.with_extension(ext));
        }

        // (5) configured alternate directory
        if let Some(dir) = &self.config.directory {
            let dir = if dir.is_absolute() {
                dir.clone()
            } else {
                library_root.join(dir)
            };
            for ext in &self.config.extensions {
                push(&mut found, dir.join(format!("{}.{ext}", movie.base_name)));
            }
        }

        if self.config.accept_all {
            // (6) any recognized-extension file in the directory and its
            // parent
            let mut dirs = vec![unit_dir.clone()];
            if let Some(parent) = unit_dir.parent() {
                if parent.starts_with(library_root) {
                    dirs.push(parent.to_path_buf());
                }
            }
            for dir in dirs {
                for entry in cache.preload(&cache.node(&dir)) {
                    let name = entry.name().to_ascii_lowercase();
                    if self
                        .config
                        .extensions
                        .iter()
                        .any(|ext| name.ends_with(&format!(".{ext}")))
                    {
                        push(&mut found, entry.path().to_path_buf());
                    }
                }
            }
        } else {
            // (7) directory-named files walking upward to the library root
            let mut dir = unit_dir.as_path();
            loop {
                if let Some(name) = dir.file_name() {
                    for ext in &self.config.extensions {
                        push(
                            &mut found,
                            dir.join(format!("{}.{ext}", name.to_string_lossy())),
                        );
                    }
                }
                if dir == library_root {
                    break;
                }
                match dir.parent() {
                    Some(parent) if parent.starts_with(library_root) => dir = parent,
                    _ => break,
                }
            }
        }

        found
    }
}

/// Parse one sidecar's content and merge it into the movie.
///
/// Well-formed XML goes through the element reader; anything else falls
/// back to sniffing the text for provider URLs/identifiers.
pub fn apply_nfo_content(content: &str, movie: &mut Movie, engine: &OverrideEngine) {
    let trimmed = content.trim_start_matches('\u{feff}').trim_start();
    if trimmed.starts_with('<') {
        match parse_xml(trimmed) {
            Ok(parsed) => {
                for (provider, id) in parsed.ids {
                    movie.ids.entry(provider).or_insert(id);
                }
                engine.apply_all(movie, parsed.updates);
                return;
            }
            Err(err) => debug!(%err, "sidecar is not well-formed XML, sniffing for ids"),
        }
    }
    sniff_ids(content, movie);
}

/// Pull provider identifiers out of free-form sidecar text.
fn sniff_ids(content: &str, movie: &mut Movie) {
    static IMDB_RE: OnceLock<Regex> = OnceLock::new();
    let re = IMDB_RE.get_or_init(|| Regex::new(r"tt\d{6,10}").expect("imdb id pattern"));
    if let Some(m) = re.find(content) {
        movie
            .ids
            .entry("imdb".to_string())
            .or_insert_with(|| m.as_str().to_string());
    }
}

struct ParsedNfo {
    updates: FieldUpdates,
    ids: Vec<(String, String)>,
}

fn parse_xml(content: &str) -> Result<ParsedNfo, quick_xml::Error> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut updates = FieldUpdates::new(SOURCE_NFO);
    let mut ids: Vec<(String, String)> = Vec::new();
    let mut genres: Vec<String> = Vec::new();
    let mut cast: Vec<String> = Vec::new();
    let mut directors: Vec<String> = Vec::new();

    let mut stack: Vec<String> = Vec::new();
    // episodedetails scope
    let mut episode: Option<u32> = None;
    let mut pending_episode: Vec<(String, String)> = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                stack.push(String::from_utf8_lossy(e.name().as_ref()).into_owned());
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if name == "episodedetails" {
                    if let Some(ep) = episode.take() {
                        for (tag, value) in pending_episode.drain(..) {
                            push_episode_update(&mut updates, &tag, ep, value);
                        }
                    } else {
                        pending_episode.clear();
                    }
                }
                stack.pop();
            }
            Event::Text(t) => {
                let value = t.unescape()?.trim().to_string();
                if value.is_empty() {
                    continue;
                }
                let Some(tag) = stack.last() else { continue };
                let in_episode = stack.iter().any(|s| s == "episodedetails");
                if in_episode {
                    match tag.as_str() {
                        "episode" => episode = value.parse().ok(),
                        "title" | "plot" | "aired" | "rating" | "thumb" => {
                            pending_episode.push((tag.clone(), value));
                        }
                        _ => {}
                    }
                    continue;
                }
                match tag.as_str() {
                    "title" => updates.push(FieldUpdate::Title(value)),
                    "originaltitle" => updates.push(FieldUpdate::OriginalTitle(value)),
                    "year" => updates.push(FieldUpdate::Year(value)),
                    "plot" => updates.push(FieldUpdate::Plot(value)),
                    "outline" => updates.push(FieldUpdate::Outline(value)),
                    "runtime" => updates.push(FieldUpdate::Runtime(value)),
                    "mpaa" => updates.push(FieldUpdate::Certification(value)),
                    "premiered" | "releasedate" => {
                        updates.push(FieldUpdate::ReleaseDate(value))
                    }
                    "genre" => genres.push(value),
                    "director" => directors.push(value),
                    "name" if stack.iter().any(|s| s == "actor") => cast.push(value),
                    "rating" => {
                        if let Ok(r) = value.parse::<f32>() {
                            updates.push(FieldUpdate::Rating(
                                SOURCE_NFO.to_string(),
                                (r * 10.0).round() as i32,
                            ));
                        }
                    }
                    "id" => ids.push(("imdb".to_string(), value)),
                    "thumb" if stack.iter().any(|s| s == "fanart") => {
                        updates.push(FieldUpdate::FanartUrl(value))
                    }
                    "thumb" => updates.push(FieldUpdate::PosterUrl(value)),
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !genres.is_empty() {
        updates.push(FieldUpdate::Genres(genres));
    }
    if !cast.is_empty() {
        updates.push(FieldUpdate::Cast(cast));
    }
    if !directors.is_empty() {
        updates.push(FieldUpdate::Directors(directors));
    }
    Ok(ParsedNfo { updates, ids })
}

fn push_episode_update(updates: &mut FieldUpdates, tag: &str, part: u32, value: String) {
    let update = match tag {
        "title" => FieldUpdate::EpisodeTitle { part, value },
        "plot" => FieldUpdate::EpisodePlot { part, value },
        "aired" => FieldUpdate::EpisodeAirDate { part, value },
        "thumb" => FieldUpdate::EpisodeImage { part, value },
        "rating" => match value.parse::<f32>() {
            Ok(r) => FieldUpdate::EpisodeRating {
                part,
                value: (r * 10.0).round() as i32,
            },
            Err(_) => return,
        },
        _ => return,
    };
    updates.push(update);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MovieFile;
    use crate::vfs::FileNode;
    use std::fs;

    fn movie_at(path: &Path) -> Movie {
        let node = FileNode::physical(path);
        let mut movie = Movie::new("test", node.clone());
        movie.add_movie_file(MovieFile::new(node, 1, 1));
        movie
    }

    #[test]
    fn movie_nfo_fields_merge() {
        let mut movie = movie_at(Path::new("/library/movie.mkv"));
        let engine = OverrideEngine::default();
        apply_nfo_content(
            r#"<movie>
                <title>Inception</title>
                <year>2010</year>
                <plot>A thief steals secrets through dreams.</plot>
                <genre>Sci-Fi</genre>
                <genre>Thriller</genre>
                <actor><name>Leonardo DiCaprio</name></actor>
                <director>Christopher Nolan</director>
                <id>tt1375666</id>
                <rating>8.8</rating>
            </movie>"#,
            &mut movie,
            &engine,
        );
        assert_eq!(movie.title, "Inception");
        assert_eq!(movie.year, "2010");
        assert_eq!(movie.genres, vec!["Sci-Fi", "Thriller"]);
        assert_eq!(movie.cast, vec!["Leonardo DiCaprio"]);
        assert_eq!(movie.directors, vec!["Christopher Nolan"]);
        assert_eq!(movie.ids.get("imdb").unwrap(), "tt1375666");
        assert_eq!(*movie.ratings.get(SOURCE_NFO).unwrap(), 88);
    }

    #[test]
    fn episode_details_land_on_the_part() {
        let mut movie = movie_at(Path::new("/library/show.s01e01.mkv"));
        let engine = OverrideEngine::default();
        apply_nfo_content(
            r#"<episodedetails>
                <episode>1</episode>
                <title>Pilot</title>
                <aired>2008-01-20</aired>
            </episodedetails>"#,
            &mut movie,
            &engine,
        );
        let file = movie.file_for_part(1).unwrap();
        assert_eq!(file.part_titles.get(&1).unwrap(), "Pilot");
        assert_eq!(file.part_air_dates.get(&1).unwrap(), "2008-01-20");
    }

    #[test]
    fn non_xml_sidecar_sniffs_imdb_id() {
        let mut movie = movie_at(Path::new("/library/movie.mkv"));
        let engine = OverrideEngine::default();
        apply_nfo_content(
            "great movie, see https://www.imdb.com/title/tt0137523/",
            &mut movie,
            &engine,
        );
        assert_eq!(movie.ids.get("imdb").unwrap(), "tt0137523");
        assert!(movie.title == crate::model::UNKNOWN);
    }

    #[test]
    fn same_basename_sidecar_is_found_and_specific_wins() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("movie.mkv");
        fs::write(&video, b"x").unwrap();
        fs::write(
            dir.path().join("movie.nfo"),
            "<movie><title>Specific</title></movie>",
        )
        .unwrap();
        // directory-named sidecar in the same directory is more general
        let dirname = dir.path().file_name().unwrap().to_string_lossy().into_owned();
        fs::write(
            dir.path().join(format!("{dirname}.nfo")),
            "<movie><title>General</title></movie>",
        )
        .unwrap();

        let mut movie = movie_at(&video);
        let reader = NfoReader::new(NfoConfig::default());
        let cache = DirectoryCache::new();
        let engine = OverrideEngine::default();
        let parsed = reader.scan(&mut movie, dir.path(), &cache, &engine);
        assert_eq!(parsed, 2);
        assert_eq!(movie.title, "Specific");
        assert!(movie.is_dirty(DirtyFlag::Nfo));
    }
}
