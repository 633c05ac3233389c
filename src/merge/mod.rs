//! Field-level override merge engine.
//!
//! Every field write from every enrichment component passes through
//! [`OverrideEngine::apply`]. The gate is binary: a candidate lands if the
//! field is still unknown, if it comes from the field's current origin
//! source (same-source rewrite), or if configuration explicitly allows that
//! (field, source) pair to overwrite. There is no trust ranking between
//! sources beyond this gate.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::config::OverrideRule;
use crate::model::{DirtyFlag, Movie};

/// Every field the merge engine gates.
///
/// Episode-scoped variants gate per-part values on the owning movie file
/// rather than the movie itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Title,
    OriginalTitle,
    Year,
    Plot,
    Outline,
    Runtime,
    Resolution,
    AspectRatio,
    VideoSource,
    Container,
    VideoCodec,
    AudioCodec,
    Fps,
    Language,
    Subtitles,
    Certification,
    ReleaseDate,
    Edition,
    PosterUrl,
    FanartUrl,
    BannerUrl,
    Genres,
    Cast,
    Directors,
    Writers,
    Rating,
    EpisodeTitle,
    EpisodePlot,
    EpisodeAirDate,
    EpisodeRating,
    EpisodeImage,
}

impl Field {
    /// Stable lowercase name used in configuration and per-part source
    /// maps.
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::OriginalTitle => "original_title",
            Field::Year => "year",
            Field::Plot => "plot",
            Field::Outline => "outline",
            Field::Runtime => "runtime",
            Field::Resolution => "resolution",
            Field::AspectRatio => "aspect_ratio",
            Field::VideoSource => "video_source",
            Field::Container => "container",
            Field::VideoCodec => "video_codec",
            Field::AudioCodec => "audio_codec",
            Field::Fps => "fps",
            Field::Language => "language",
            Field::Subtitles => "subtitles",
            Field::Certification => "certification",
            Field::ReleaseDate => "release_date",
            Field::Edition => "edition",
            Field::PosterUrl => "poster_url",
            Field::FanartUrl => "fanart_url",
            Field::BannerUrl => "banner_url",
            Field::Genres => "genres",
            Field::Cast => "cast",
            Field::Directors => "directors",
            Field::Writers => "writers",
            Field::Rating => "rating",
            Field::EpisodeTitle => "episode_title",
            Field::EpisodePlot => "episode_plot",
            Field::EpisodeAirDate => "episode_air_date",
            Field::EpisodeRating => "episode_rating",
            Field::EpisodeImage => "episode_image",
        }
    }

    fn parse(name: &str) -> Option<Field> {
        const ALL: &[Field] = &[
            Field::Title,
            Field::OriginalTitle,
            Field::Year,
            Field::Plot,
            Field::Outline,
            Field::Runtime,
            Field::Resolution,
            Field::AspectRatio,
            Field::VideoSource,
            Field::Container,
            Field::VideoCodec,
            Field::AudioCodec,
            Field::Fps,
            Field::Language,
            Field::Subtitles,
            Field::Certification,
            Field::ReleaseDate,
            Field::Edition,
            Field::PosterUrl,
            Field::FanartUrl,
            Field::BannerUrl,
            Field::Genres,
            Field::Cast,
            Field::Directors,
            Field::Writers,
            Field::Rating,
            Field::EpisodeTitle,
            Field::EpisodePlot,
            Field::EpisodeAirDate,
            Field::EpisodeRating,
            Field::EpisodeImage,
        ];
        let lower = name.to_ascii_lowercase();
        ALL.iter().find(|f| f.as_str() == lower).copied()
    }
}

/// One candidate value produced by an enrichment source.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    Title(String),
    OriginalTitle(String),
    Year(String),
    Plot(String),
    Outline(String),
    Runtime(String),
    Resolution(String),
    AspectRatio(String),
    VideoSource(String),
    Container(String),
    VideoCodec(String),
    AudioCodec(String),
    Fps(String),
    Language(String),
    Subtitles(String),
    Certification(String),
    ReleaseDate(String),
    Edition(String),
    PosterUrl(String),
    FanartUrl(String),
    BannerUrl(String),
    Genres(Vec<String>),
    Cast(Vec<String>),
    Directors(Vec<String>),
    Writers(Vec<String>),
    /// (site name, rating 0-100)
    Rating(String, i32),
    EpisodeTitle { part: u32, value: String },
    EpisodePlot { part: u32, value: String },
    EpisodeAirDate { part: u32, value: String },
    EpisodeRating { part: u32, value: i32 },
    EpisodeImage { part: u32, value: String },
}

impl FieldUpdate {
    pub fn field(&self) -> Field {
        match self {
            FieldUpdate::Title(_) => Field::Title,
            FieldUpdate::OriginalTitle(_) => Field::OriginalTitle,
            FieldUpdate::Year(_) => Field::Year,
            FieldUpdate::Plot(_) => Field::Plot,
            FieldUpdate::Outline(_) => Field::Outline,
            FieldUpdate::Runtime(_) => Field::Runtime,
            FieldUpdate::Resolution(_) => Field::Resolution,
            FieldUpdate::AspectRatio(_) => Field::AspectRatio,
            FieldUpdate::VideoSource(_) => Field::VideoSource,
            FieldUpdate::Container(_) => Field::Container,
            FieldUpdate::VideoCodec(_) => Field::VideoCodec,
            FieldUpdate::AudioCodec(_) => Field::AudioCodec,
            FieldUpdate::Fps(_) => Field::Fps,
            FieldUpdate::Language(_) => Field::Language,
            FieldUpdate::Subtitles(_) => Field::Subtitles,
            FieldUpdate::Certification(_) => Field::Certification,
            FieldUpdate::ReleaseDate(_) => Field::ReleaseDate,
            FieldUpdate::Edition(_) => Field::Edition,
            FieldUpdate::PosterUrl(_) => Field::PosterUrl,
            FieldUpdate::FanartUrl(_) => Field::FanartUrl,
            FieldUpdate::BannerUrl(_) => Field::BannerUrl,
            FieldUpdate::Genres(_) => Field::Genres,
            FieldUpdate::Cast(_) => Field::Cast,
            FieldUpdate::Directors(_) => Field::Directors,
            FieldUpdate::Writers(_) => Field::Writers,
            FieldUpdate::Rating(_, _) => Field::Rating,
            FieldUpdate::EpisodeTitle { .. } => Field::EpisodeTitle,
            FieldUpdate::EpisodePlot { .. } => Field::EpisodePlot,
            FieldUpdate::EpisodeAirDate { .. } => Field::EpisodeAirDate,
            FieldUpdate::EpisodeRating { .. } => Field::EpisodeRating,
            FieldUpdate::EpisodeImage { .. } => Field::EpisodeImage,
        }
    }
}

/// A batch of candidate values from one named source.
#[derive(Debug, Clone, Default)]
pub struct FieldUpdates {
    pub source: String,
    pub updates: Vec<FieldUpdate>,
}

impl FieldUpdates {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            updates: Vec::new(),
        }
    }

    pub fn push(&mut self, update: FieldUpdate) {
        self.updates.push(update);
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
}

/// The override gate, built once per run from configuration.
#[derive(Debug, Clone, Default)]
pub struct OverrideEngine {
    /// (field, lowercase source) pairs allowed to overwrite a set value.
    allowed: HashSet<(Field, String)>,
}

impl OverrideEngine {
    pub fn from_rules(rules: &[OverrideRule]) -> Self {
        let mut allowed = HashSet::new();
        for rule in rules {
            match Field::parse(&rule.field) {
                Some(field) => {
                    allowed.insert((field, rule.source.to_ascii_lowercase()));
                }
                None => {
                    tracing::warn!(field = %rule.field, "unknown field in override rule, ignored");
                }
            }
        }
        Self { allowed }
    }

    /// The gate itself: first writer wins, same source may rewrite, and
    /// configured (field, source) pairs may overwrite.
    pub fn should_accept(&self, movie: &Movie, field: Field, source: &str) -> bool {
        if movie.field_is_unknown(field) {
            return true;
        }
        if movie
            .source_of(field)
            .is_some_and(|origin| origin.eq_ignore_ascii_case(source))
        {
            return true;
        }
        self.allowed
            .contains(&(field, source.to_ascii_lowercase()))
    }

    /// Apply one candidate, returning whether it was accepted.
    pub fn apply(&self, movie: &mut Movie, update: FieldUpdate, source: &str) -> bool {
        let field = update.field();
        let accepted = match &update {
            FieldUpdate::EpisodeTitle { part, .. }
            | FieldUpdate::EpisodePlot { part, .. }
            | FieldUpdate::EpisodeAirDate { part, .. }
            | FieldUpdate::EpisodeRating { part, .. }
            | FieldUpdate::EpisodeImage { part, .. } => {
                self.should_accept_episode(movie, field, *part, source)
            }
            _ => self.should_accept(movie, field, source),
        };
        if !accepted {
            trace!(
                movie = %movie.base_name,
                field = field.as_str(),
                source,
                "candidate rejected by override gate"
            );
            return false;
        }

        match update {
            FieldUpdate::Title(v) => movie.title = v,
            FieldUpdate::OriginalTitle(v) => movie.original_title = v,
            FieldUpdate::Year(v) => movie.year = v,
            FieldUpdate::Plot(v) => movie.plot = v,
            FieldUpdate::Outline(v) => movie.outline = v,
            FieldUpdate::Runtime(v) => movie.runtime = v,
            FieldUpdate::Resolution(v) => movie.resolution = v,
            FieldUpdate::AspectRatio(v) => movie.aspect_ratio = v,
            FieldUpdate::VideoSource(v) => movie.video_source = v,
            FieldUpdate::Container(v) => movie.container = v,
            FieldUpdate::VideoCodec(v) => movie.video_codec = v,
            FieldUpdate::AudioCodec(v) => movie.audio_codec = v,
            FieldUpdate::Fps(v) => movie.fps = v,
            FieldUpdate::Language(v) => movie.language = v,
            FieldUpdate::Subtitles(v) => movie.subtitles = v,
            FieldUpdate::Certification(v) => movie.certification = v,
            FieldUpdate::ReleaseDate(v) => movie.release_date = v,
            FieldUpdate::Edition(v) => movie.edition = v,
            FieldUpdate::PosterUrl(v) => {
                movie.poster_url = v;
                movie.mark_dirty(DirtyFlag::Poster);
            }
            FieldUpdate::FanartUrl(v) => {
                movie.fanart_url = v;
                movie.mark_dirty(DirtyFlag::Fanart);
            }
            FieldUpdate::BannerUrl(v) => {
                movie.banner_url = v;
                movie.mark_dirty(DirtyFlag::Banner);
            }
            FieldUpdate::Genres(v) => movie.genres = v,
            FieldUpdate::Cast(v) => movie.cast = v,
            FieldUpdate::Directors(v) => movie.directors = v,
            FieldUpdate::Writers(v) => movie.writers = v,
            FieldUpdate::Rating(site, value) => {
                movie.ratings.insert(site, value);
            }
            FieldUpdate::EpisodeTitle { part, value } => {
                self.write_episode(movie, field, part, source, |f| {
                    f.part_titles.insert(part, value);
                });
                return true;
            }
            FieldUpdate::EpisodePlot { part, value } => {
                self.write_episode(movie, field, part, source, |f| {
                    f.part_plots.insert(part, value);
                });
                return true;
            }
            FieldUpdate::EpisodeAirDate { part, value } => {
                self.write_episode(movie, field, part, source, |f| {
                    f.part_air_dates.insert(part, value);
                });
                return true;
            }
            FieldUpdate::EpisodeRating { part, value } => {
                self.write_episode(movie, field, part, source, |f| {
                    f.part_ratings.insert(part, value);
                });
                return true;
            }
            FieldUpdate::EpisodeImage { part, value } => {
                self.write_episode(movie, field, part, source, |f| {
                    f.part_image_urls.insert(part, value);
                });
                return true;
            }
        }
        movie.field_sources.insert(field, source.to_string());
        movie.mark_dirty(DirtyFlag::Info);
        true
    }

    /// Apply a whole batch, returning how many candidates were accepted.
    pub fn apply_all(&self, movie: &mut Movie, updates: FieldUpdates) -> usize {
        let source = updates.source;
        updates
            .updates
            .into_iter()
            .filter(|u| self.apply(movie, u.clone(), &source))
            .count()
    }

    fn should_accept_episode(&self, movie: &Movie, field: Field, part: u32, source: &str) -> bool {
        let Some(file) = movie.file_for_part(part) else {
            return false;
        };
        let key = (field.as_str().to_string(), part);
        let current = match field {
            Field::EpisodeTitle => file.part_titles.contains_key(&part),
            Field::EpisodePlot => file.part_plots.contains_key(&part),
            Field::EpisodeAirDate => file.part_air_dates.contains_key(&part),
            Field::EpisodeRating => file.part_ratings.contains_key(&part),
            Field::EpisodeImage => file.part_image_urls.contains_key(&part),
            _ => false,
        };
        if !current {
            return true;
        }
        if file
            .part_sources
            .get(&key)
            .is_some_and(|origin| origin.eq_ignore_ascii_case(source))
        {
            return true;
        }
        self.allowed
            .contains(&(field, source.to_ascii_lowercase()))
    }

    fn write_episode<F>(&self, movie: &mut Movie, field: Field, part: u32, source: &str, write: F)
    where
        F: FnOnce(&mut crate::model::MovieFile),
    {
        if let Some(file) = movie.file_for_part_mut(part) {
            write(file);
            file.part_sources
                .insert((field.as_str().to_string(), part), source.to_string());
            movie.mark_dirty(DirtyFlag::Info);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MovieFile;
    use crate::vfs::FileNode;

    fn movie() -> Movie {
        let mut m = Movie::new("test", FileNode::physical("/library/test.mkv"));
        m.add_movie_file(MovieFile::new(FileNode::physical("/library/test.mkv"), 1, 2));
        m
    }

    fn engine(rules: &[(&str, &str)]) -> OverrideEngine {
        let rules: Vec<OverrideRule> = rules
            .iter()
            .map(|(f, s)| OverrideRule {
                field: f.to_string(),
                source: s.to_string(),
            })
            .collect();
        OverrideEngine::from_rules(&rules)
    }

    #[test]
    fn first_writer_wins_by_default() {
        let eng = engine(&[]);
        let mut m = movie();
        assert!(eng.apply(&mut m, FieldUpdate::Title("From Filename".into()), "filename"));
        assert!(!eng.apply(&mut m, FieldUpdate::Title("From Remote".into()), "remote"));
        assert_eq!(m.title, "From Filename");
        assert_eq!(m.source_of(Field::Title), Some("filename"));
    }

    #[test]
    fn configured_override_allows_second_writer() {
        let eng = engine(&[("title", "nfo")]);
        let mut m = movie();
        eng.apply(&mut m, FieldUpdate::Title("From Filename".into()), "filename");
        assert!(eng.apply(&mut m, FieldUpdate::Title("From NFO".into()), "nfo"));
        assert_eq!(m.title, "From NFO");
        assert_eq!(m.source_of(Field::Title), Some("nfo"));
    }

    #[test]
    fn same_source_may_rewrite() {
        let eng = engine(&[]);
        let mut m = movie();
        eng.apply(&mut m, FieldUpdate::Plot("general".into()), "nfo");
        assert!(eng.apply(&mut m, FieldUpdate::Plot("specific".into()), "nfo"));
        assert_eq!(m.plot, "specific");
    }

    #[test]
    fn artwork_updates_set_their_dirty_flags() {
        let eng = engine(&[]);
        let mut m = movie();
        eng.apply(&mut m, FieldUpdate::FanartUrl("http://x/f.jpg".into()), "remote");
        assert!(m.is_dirty(DirtyFlag::Fanart));
        assert!(!m.is_dirty(DirtyFlag::Poster));
    }

    #[test]
    fn episode_fields_gate_per_part() {
        let eng = engine(&[]);
        let mut m = movie();
        assert!(eng.apply(
            &mut m,
            FieldUpdate::EpisodeTitle {
                part: 1,
                value: "Pilot".into()
            },
            "nfo"
        ));
        // part 2 is still unknown even though part 1 is set
        assert!(eng.apply(
            &mut m,
            FieldUpdate::EpisodeTitle {
                part: 2,
                value: "Second".into()
            },
            "remote"
        ));
        // part 1 is set and remote has no override rule
        assert!(!eng.apply(
            &mut m,
            FieldUpdate::EpisodeTitle {
                part: 1,
                value: "Clobbered".into()
            },
            "remote"
        ));
        let file = m.file_for_part(1).unwrap();
        assert_eq!(file.part_titles.get(&1).unwrap(), "Pilot");
        assert_eq!(file.part_titles.get(&2).unwrap(), "Second");
    }

    #[test]
    fn episode_update_for_unmapped_part_is_rejected() {
        let eng = engine(&[]);
        let mut m = movie();
        assert!(!eng.apply(
            &mut m,
            FieldUpdate::EpisodeTitle {
                part: 9,
                value: "nowhere".into()
            },
            "nfo"
        ));
    }
}
