//! Staleness policy: decides whether a previously-processed movie gets
//! re-enriched this run.
//!
//! Checks run in a fixed priority order and the first positive one wins;
//! the per-episode iteration is the most expensive check and runs last.
//! Version and cast checks ignore the run-wide cap, everything else stops
//! firing once the cap is reached.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::config::RecheckConfig;
use crate::merge::Field;
use crate::model::{DirtyFlag, MediaType, Movie};

/// Tool version stamped on processed movies.
pub const SCANNER_VERSION: &str = env!("CARGO_PKG_VERSION");
/// Monotonic revision for drift checks.
pub const SCANNER_REVISION: u32 = 100;

pub struct RecheckPolicy {
    config: RecheckConfig,
    fired: AtomicUsize,
    cap_logged: AtomicBool,
}

impl RecheckPolicy {
    pub fn new(config: RecheckConfig) -> Self {
        Self {
            config,
            fired: AtomicUsize::new(0),
            cap_logged: AtomicBool::new(false),
        }
    }

    pub fn fired(&self) -> usize {
        self.fired.load(Ordering::SeqCst)
    }

    /// Evaluate the policy for one persisted movie.
    ///
    /// A `true` result marks the movie dirty for recheck; for episode
    /// shortfalls, the affected files are additionally marked new so
    /// episode enrichment re-runs.
    pub fn needs_rescan(&self, movie: &mut Movie, now: DateTime<Utc>) -> bool {
        // always-on: version mismatch
        if self.config.version_check && movie.scanner_version != SCANNER_VERSION {
            debug!(movie = %movie.base_name, persisted = %movie.scanner_version, "version mismatch");
            return self.fire(movie, false);
        }
        // always-on: missing cast while people collection is enabled
        if self.config.require_cast && movie.cast.is_empty() {
            debug!(movie = %movie.base_name, "cast missing");
            return self.fire(movie, false);
        }

        if self.config.max > 0 && self.fired.load(Ordering::SeqCst) >= self.config.max {
            if !self.cap_logged.swap(true, Ordering::SeqCst) {
                info!(max = self.config.max, "recheck cap reached, remaining movies skipped");
            }
            return false;
        }

        // cooldown gate for all bounded checks, inclusive at the boundary
        if let Some(last) = movie.last_scanned {
            let age_days = (now - last).num_days();
            if age_days <= self.config.min_days {
                return false;
            }
            if age_days >= self.config.days {
                debug!(movie = %movie.base_name, age_days, "stale by age");
                return self.fire(movie, true);
            }
        }

        // revision drift only matters while version checking is on
        if self.config.version_check
            && SCANNER_REVISION.saturating_sub(movie.scanner_revision)
                > self.config.revision_tolerance
        {
            debug!(movie = %movie.base_name, persisted = movie.scanner_revision, "revision drift");
            return self.fire(movie, true);
        }

        if let Some(field) = self.missing_required_field(movie) {
            debug!(movie = %movie.base_name, field = field.as_str(), "required field unknown");
            return self.fire(movie, true);
        }

        // per-episode checks, most expensive, last
        if movie.media_type == MediaType::TvShow && self.episodes_incomplete(movie) {
            debug!(movie = %movie.base_name, "episode data incomplete");
            return self.fire(movie, true);
        }

        false
    }

    fn fire(&self, movie: &mut Movie, bounded: bool) -> bool {
        if bounded {
            self.fired.fetch_add(1, Ordering::SeqCst);
        }
        movie.mark_dirty(DirtyFlag::Recheck);
        true
    }

    fn missing_required_field(&self, movie: &Movie) -> Option<Field> {
        let checks = [
            (self.config.require_plot, Field::Plot),
            (self.config.require_year, Field::Year),
            (self.config.require_genres, Field::Genres),
            (self.config.require_poster, Field::PosterUrl),
            (self.config.require_fanart, Field::FanartUrl),
            (
                self.config.require_banner && movie.media_type == MediaType::TvShow,
                Field::BannerUrl,
            ),
            (self.config.require_rating, Field::Rating),
        ];
        checks
            .into_iter()
            .find(|(enabled, field)| *enabled && movie.field_is_unknown(*field))
            .map(|(_, field)| field)
    }

    /// Mark files with missing per-episode data as new, so enrichment
    /// treats them like fresh discoveries.
    fn episodes_incomplete(&self, movie: &mut Movie) -> bool {
        let cfg = &self.config;
        let mut any = false;
        for file in &mut movie.movie_files {
            let incomplete = (file.first_part..=file.last_part).any(|part| {
                (cfg.episode_title && !file.part_titles.contains_key(&part))
                    || (cfg.episode_plot && !file.part_plots.contains_key(&part))
                    || (cfg.episode_air_date && !file.part_air_dates.contains_key(&part))
                    || (cfg.episode_rating && !file.part_ratings.contains_key(&part))
                    || (cfg.episode_image && !file.part_image_urls.contains_key(&part))
            });
            if incomplete {
                file.new_file = true;
                any = true;
            }
        }
        any
    }
}
