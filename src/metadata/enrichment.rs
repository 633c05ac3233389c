//! The enrichment pipeline: runs every metadata source over each movie in
//! a fixed order, all merges funneled through the override engine.
//!
//! Per movie the order is probe, sidecar NFOs, embedded attachments, then
//! remote providers. Movies are processed in parallel under the running
//! semaphore; each provider call trades the running slot for an io session
//! so slow remote hosts never starve local scanning.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::merge::{FieldUpdate, FieldUpdates, OverrideEngine};
use crate::metadata::{ProviderRegistry, ProviderResponse};
use crate::model::{ContentType, Movie};
use crate::probe::{MediaProber, ProbeReport, SOURCE_MEDIAINFO};
use crate::recheck::{RecheckPolicy, SCANNER_REVISION, SCANNER_VERSION};
use crate::sidecar::{apply_nfo_content, AttachmentService, NfoReader};
use crate::vfs::DirectoryCache;
use crate::workers::{ScanBudget, Throttle};

pub struct EnrichmentPipeline {
    prober: Arc<dyn MediaProber>,
    nfo: NfoReader,
    attachments: Arc<AttachmentService>,
    providers: ProviderRegistry,
    engine: Arc<OverrideEngine>,
    cache: Arc<DirectoryCache>,
    throttle: Arc<Throttle>,
    budget: ScanBudget,
    recheck: RecheckPolicy,
}

impl EnrichmentPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        prober: Arc<dyn MediaProber>,
        nfo: NfoReader,
        attachments: Arc<AttachmentService>,
        providers: ProviderRegistry,
        engine: Arc<OverrideEngine>,
        cache: Arc<DirectoryCache>,
        throttle: Arc<Throttle>,
        budget: ScanBudget,
        recheck: RecheckPolicy,
    ) -> Self {
        Self {
            prober,
            nfo,
            attachments,
            providers,
            engine,
            cache,
            throttle,
            budget,
            recheck,
        }
    }

    /// Enrich every movie, in parallel, returning them in completion
    /// order.
    ///
    /// Previously-processed movies (a stamped scanner version marks them)
    /// go through the staleness policy and the run budget first; new
    /// discoveries are always enriched.
    pub async fn run(self: Arc<Self>, movies: Vec<Movie>, library_root: PathBuf) -> Vec<Movie> {
        let mut set = JoinSet::new();
        let mut skipped: Vec<Movie> = Vec::new();

        for mut movie in movies {
            let previously_processed = !movie.scanner_version.is_empty();
            if previously_processed {
                if !self.recheck.needs_rescan(&mut movie, Utc::now()) {
                    skipped.push(movie);
                    continue;
                }
                if !self.budget.try_take() {
                    debug!(movie = %movie.base_name, "scan budget exhausted, deferred to next run");
                    skipped.push(movie);
                    continue;
                }
            }
            let pipeline = Arc::clone(&self);
            let root = library_root.clone();
            set.spawn(async move {
                pipeline.enrich_movie(&mut movie, &root).await;
                movie
            });
        }

        let mut done = skipped;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(movie) => done.push(movie),
                Err(err) => warn!(%err, "enrichment task panicked"),
            }
        }
        info!(enriched = done.len(), "enrichment pass complete");
        done
    }

    /// Run every source over one movie, local sources first.
    pub async fn enrich_movie(&self, movie: &mut Movie, library_root: &Path) {
        let guard = self.throttle.enter_running().await;

        self.probe_movie(movie).await;
        self.nfo.scan(movie, library_root, &self.cache, &self.engine);
        self.attachments.scan(movie).await;
        self.apply_nfo_attachments(movie).await;

        // remote lookups trade the running slot for an io session
        drop(guard);
        for provider in self.providers.iter() {
            let session = self.throttle.enter_io(provider.host(), None).await;
            let response = provider.enrich(movie).await;
            drop(session);
            match response {
                ProviderResponse::Updates(updates) => {
                    let accepted = self.engine.apply_all(movie, updates);
                    debug!(movie = %movie.base_name, provider = provider.name(), accepted, "provider merged");
                }
                ProviderResponse::NoUpdate => {
                    debug!(movie = %movie.base_name, provider = provider.name(), "no update")
                }
            }
        }
        let _guard = self.throttle.enter_running().await;

        movie.scanner_version = SCANNER_VERSION.to_string();
        movie.scanner_revision = SCANNER_REVISION;
        movie.last_scanned = Some(Utc::now());
        for file in &mut movie.movie_files {
            file.new_file = false;
        }
    }

    async fn probe_movie(&self, movie: &mut Movie) {
        if !self.prober.is_available() {
            return;
        }
        let Some(target) = movie
            .movie_files
            .iter()
            .find(|f| !f.file.is_virtual())
            .map(|f| f.file.path().to_path_buf())
        else {
            return;
        };
        match self.prober.probe(&target).await {
            Ok(report) => {
                let updates = probe_updates(&report, self.prober.name());
                let accepted = self.engine.apply_all(movie, updates);
                debug!(movie = %movie.base_name, accepted, "probe merged");
            }
            Err(err) => {
                warn!(movie = %movie.base_name, file = %target.display(), %err, "probe failed")
            }
        }
    }

    /// Embedded NFO attachments parse exactly like sidecar files.
    async fn apply_nfo_attachments(&self, movie: &mut Movie) {
        let nfo_attachments: Vec<_> = movie
            .attachments
            .iter()
            .filter(|a| a.content_type == ContentType::Nfo)
            .cloned()
            .collect();
        for attachment in nfo_attachments {
            let extracted = match self.attachments.extract(&attachment).await {
                Ok(path) => path,
                Err(err) => {
                    warn!(attachment = %attachment.filename, %err, "attachment extraction failed");
                    continue;
                }
            };
            match std::fs::read_to_string(&extracted) {
                Ok(content) => apply_nfo_content(&content, movie, &self.engine),
                Err(err) => {
                    warn!(attachment = %attachment.filename, %err, "extracted sidecar unreadable")
                }
            }
        }
    }
}

/// Translate a probe report into merge candidates.
pub fn probe_updates(report: &ProbeReport, source: &str) -> FieldUpdates {
    let mut updates = FieldUpdates::new(source);

    if let Some(duration) = report.general_value(&["Duration", "Durée"]) {
        if let Some(minutes) = parse_duration_minutes(duration) {
            updates.push(FieldUpdate::Runtime(minutes.to_string()));
        }
    }

    let width = report
        .video_value(0, &["Width", "Largeur"])
        .and_then(digits_only);
    let height = report
        .video_value(0, &["Height", "Hauteur"])
        .and_then(digits_only);
    if let (Some(w), Some(h)) = (width, height) {
        updates.push(FieldUpdate::Resolution(format!("{w}x{h}")));
    }

    if let Some(aspect) = report.video_value(0, &["Display aspect ratio", "Format à l'écran"]) {
        updates.push(FieldUpdate::AspectRatio(aspect.to_string()));
    }
    if let Some(codec) = report.video_value(0, &["Codec ID", "Format"]) {
        updates.push(FieldUpdate::VideoCodec(codec.to_string()));
    }
    if let Some(fps) = report.video_value(0, &["Frame rate", "Images par seconde"]) {
        if let Some(value) = fps.split_whitespace().next() {
            updates.push(FieldUpdate::Fps(value.to_string()));
        }
    }
    if let Some(track) = report.audio.first() {
        if let Some(codec) = track.get("Codec ID").or_else(|| track.get("Format")) {
            updates.push(FieldUpdate::AudioCodec(codec.clone()));
        }
    }

    let languages = report.audio_languages();
    if !languages.is_empty() {
        updates.push(FieldUpdate::Language(languages.join(" / ")));
    }
    let subtitles = report.text_languages();
    if !subtitles.is_empty() {
        updates.push(FieldUpdate::Subtitles(subtitles.join(" / ")));
    }

    updates
}

/// Strip grouping separators from numeric values like `1 920 pixels`.
fn digits_only(value: &str) -> Option<String> {
    let digits: String = value.chars().filter(char::is_ascii_digit).collect();
    (!digits.is_empty()).then_some(digits)
}

/// Parse tool durations like `2 h 28 min` or `148 min` into whole
/// minutes.
fn parse_duration_minutes(value: &str) -> Option<u32> {
    let mut minutes = 0u32;
    let mut seen = false;
    let tokens: Vec<&str> = value.split_whitespace().collect();
    for pair in tokens.windows(2) {
        let Ok(amount) = pair[0].parse::<u32>() else {
            continue;
        };
        match pair[1] {
            "h" => {
                minutes += amount * 60;
                seen = true;
            }
            unit if unit.starts_with("min") => {
                minutes += amount;
                seen = true;
            }
            _ => {}
        }
    }
    seen.then_some(minutes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ArtworkConfig, NfoConfig, RecheckConfig, ToolsConfig, WorkersConfig};
    use crate::merge::Field;
    use crate::metadata::RemoteMetadataProvider;
    use crate::model::{MovieFile, UNKNOWN};
    use crate::probe::MediaInfoProber;
    use crate::vfs::FileNode;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubProber {
        report: ProbeReport,
    }

    #[async_trait]
    impl MediaProber for StubProber {
        fn name(&self) -> &'static str {
            SOURCE_MEDIAINFO
        }
        fn is_available(&self) -> bool {
            true
        }
        async fn probe(&self, _path: &Path) -> anyhow::Result<ProbeReport> {
            Ok(self.report.clone())
        }
    }

    struct StubProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RemoteMetadataProvider for StubProvider {
        fn name(&self) -> &'static str {
            "stubdb"
        }
        fn host(&self) -> &str {
            "stubdb.example.com"
        }
        async fn enrich(&self, _movie: &Movie) -> ProviderResponse {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut updates = FieldUpdates::new("stubdb");
            updates.push(FieldUpdate::Plot("a dream within a dream".to_string()));
            updates.push(FieldUpdate::Year("1999".to_string()));
            ProviderResponse::Updates(updates)
        }
    }

    fn movie_with_file() -> Movie {
        let node = FileNode::physical("/library/Inception (2010).mkv");
        let mut m = Movie::new("inception_2010", node.clone());
        m.add_movie_file(MovieFile::new(node, 1, 1));
        m
    }

    fn pipeline(prober: Arc<dyn MediaProber>, providers: ProviderRegistry) -> Arc<EnrichmentPipeline> {
        Arc::new(EnrichmentPipeline::new(
            prober,
            NfoReader::new(NfoConfig::default()),
            Arc::new(AttachmentService::new(
                &ToolsConfig::default(),
                ArtworkConfig::default(),
            )),
            providers,
            Arc::new(OverrideEngine::from_rules(&[])),
            Arc::new(DirectoryCache::new()),
            Arc::new(Throttle::new(&WorkersConfig::default())),
            ScanBudget::new(0),
            RecheckPolicy::new(RecheckConfig::default()),
        ))
    }

    #[test]
    fn probe_report_translates_to_updates() {
        let mut report = ProbeReport::default();
        report
            .general
            .insert("Duration".to_string(), "2 h 28 min".to_string());
        let mut video = std::collections::HashMap::new();
        video.insert("Width".to_string(), "1 920 pixels".to_string());
        video.insert("Height".to_string(), "1 080 pixels".to_string());
        video.insert("Codec ID".to_string(), "V_MPEG4/ISO/AVC".to_string());
        video.insert("Frame rate".to_string(), "23.976 (24000/1001) FPS".to_string());
        report.video.push(video);
        let mut audio = std::collections::HashMap::new();
        audio.insert("Format".to_string(), "DTS".to_string());
        audio.insert("Language".to_string(), "English".to_string());
        report.audio.push(audio);

        let updates = probe_updates(&report, SOURCE_MEDIAINFO);
        assert!(updates
            .updates
            .contains(&FieldUpdate::Runtime("148".to_string())));
        assert!(updates
            .updates
            .contains(&FieldUpdate::Resolution("1920x1080".to_string())));
        assert!(updates
            .updates
            .contains(&FieldUpdate::Fps("23.976".to_string())));
        assert!(updates
            .updates
            .contains(&FieldUpdate::Language("English".to_string())));
    }

    #[test]
    fn duration_formats_parse() {
        assert_eq!(parse_duration_minutes("2 h 28 min"), Some(148));
        assert_eq!(parse_duration_minutes("95 min"), Some(95));
        assert_eq!(parse_duration_minutes("1 h"), Some(60));
        assert_eq!(parse_duration_minutes("unknown"), None);
    }

    #[tokio::test]
    async fn provider_values_fill_unknown_fields_only() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(StubProvider {
            calls: AtomicUsize::new(0),
        }));
        let pipeline = pipeline(Arc::new(MediaInfoProber::unavailable()), registry);

        let mut movie = movie_with_file();
        movie.year = "2010".to_string();
        movie
            .field_sources
            .insert(Field::Year, "filename".to_string());

        pipeline.enrich_movie(&mut movie, Path::new("/library")).await;
        assert_eq!(movie.plot, "a dream within a dream");
        // filename already owned the year, the provider may not replace it
        assert_eq!(movie.year, "2010");
        assert_eq!(movie.scanner_version, SCANNER_VERSION);
        assert!(movie.last_scanned.is_some());
    }

    #[tokio::test]
    async fn probe_fields_land_via_merge_engine() {
        let mut report = ProbeReport::default();
        let mut video = std::collections::HashMap::new();
        video.insert("Width".to_string(), "1920 pixels".to_string());
        video.insert("Height".to_string(), "1080 pixels".to_string());
        report.video.push(video);
        let pipeline = pipeline(Arc::new(StubProber { report }), ProviderRegistry::new());

        let mut movie = movie_with_file();
        pipeline.enrich_movie(&mut movie, Path::new("/library")).await;
        assert_eq!(movie.resolution, "1920x1080");
        assert_eq!(movie.source_of(Field::Resolution), Some(SOURCE_MEDIAINFO));
    }

    #[tokio::test]
    async fn fresh_movies_bypass_recheck_gating() {
        let pipeline = pipeline(Arc::new(MediaInfoProber::unavailable()), ProviderRegistry::new());
        let mut fresh = movie_with_file();
        fresh.plot = UNKNOWN.to_string();
        // fresh: no scanner_version stamped yet
        let done = Arc::clone(&pipeline)
            .run(vec![fresh], PathBuf::from("/library"))
            .await;
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].scanner_version, SCANNER_VERSION);
    }
}
