//! Scan plus enrichment over a real tree, with stubbed external
//! collaborators.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use reelscan::config::Config;
use reelscan::merge::{FieldUpdate, FieldUpdates, OverrideEngine};
use reelscan::metadata::{
    EnrichmentPipeline, ProviderRegistry, ProviderResponse, RemoteMetadataProvider,
};
use reelscan::model::Movie;
use reelscan::probe::MediaInfoProber;
use reelscan::recheck::{RecheckPolicy, SCANNER_VERSION};
use reelscan::scanner::DirectoryScanner;
use reelscan::sidecar::{AttachmentService, NfoReader};
use reelscan::vfs::DirectoryCache;
use reelscan::workers::{ScanBudget, Throttle};

struct FakeDb;

#[async_trait]
impl RemoteMetadataProvider for FakeDb {
    fn name(&self) -> &'static str {
        "fakedb"
    }
    fn host(&self) -> &str {
        "fakedb.example.com"
    }
    async fn enrich(&self, movie: &Movie) -> ProviderResponse {
        if movie.title != "Inception" {
            return ProviderResponse::NoUpdate;
        }
        let mut updates = FieldUpdates::new("fakedb");
        updates.push(FieldUpdate::Plot(
            "A thief enters dreams to plant an idea.".to_string(),
        ));
        updates.push(FieldUpdate::Year("1999".to_string()));
        updates.push(FieldUpdate::Genres(vec![
            "Sci-Fi".to_string(),
            "Thriller".to_string(),
        ]));
        ProviderResponse::Updates(updates)
    }
}

fn build_pipeline(config: &Config, cache: Arc<DirectoryCache>) -> Arc<EnrichmentPipeline> {
    let engine = Arc::new(OverrideEngine::from_rules(&config.overrides));
    let mut providers = ProviderRegistry::new();
    providers.register(Arc::new(FakeDb));
    Arc::new(EnrichmentPipeline::new(
        Arc::new(MediaInfoProber::unavailable()),
        NfoReader::new(config.nfo.clone()),
        Arc::new(AttachmentService::new(
            &config.tools,
            config.artwork.clone(),
        )),
        providers,
        engine,
        cache,
        Arc::new(Throttle::new(&config.workers)),
        ScanBudget::new(config.workers.max_scans),
        RecheckPolicy::new(config.recheck.clone()),
    ))
}

fn scan(config: &Config, root: &Path, cache: Arc<DirectoryCache>) -> Vec<Movie> {
    let engine = Arc::new(OverrideEngine::from_rules(&config.overrides));
    let scanner = DirectoryScanner::new(config, engine, cache);
    scanner.scan_library(&reelscan::config::LibraryRoot {
        path: root.to_path_buf(),
        excludes: Vec::new(),
    })
}

#[tokio::test]
async fn scan_then_enrich_respects_source_precedence() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("Inception (2010) 1080p.mkv"), b"x").unwrap();

    let config = Config::default();
    let cache = Arc::new(DirectoryCache::new());
    let movies = scan(&config, dir.path(), Arc::clone(&cache));
    assert_eq!(movies.len(), 1);

    let pipeline = build_pipeline(&config, cache);
    let done = pipeline.run(movies, dir.path().to_path_buf()).await;
    assert_eq!(done.len(), 1);
    let movie = &done[0];

    // provider filled what the filename could not
    assert_eq!(movie.plot, "A thief enters dreams to plant an idea.");
    assert_eq!(movie.genres, vec!["Sci-Fi", "Thriller"]);
    // but the filename keeps the year it already owned
    assert_eq!(movie.year, "2010");
    // completion stamps
    assert_eq!(movie.scanner_version, SCANNER_VERSION);
    assert!(movie.last_scanned.is_some());
    assert!(movie.movie_files.iter().all(|f| !f.new_file));
}

#[tokio::test]
async fn scan_budget_caps_rechecked_movies() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..6 {
        fs::write(dir.path().join(format!("Stale Movie {i} (2001).mkv")), b"x").unwrap();
    }

    let mut config = Config::default();
    config.workers.max_scans = 2;
    let cache = Arc::new(DirectoryCache::new());
    let mut movies = scan(&config, dir.path(), Arc::clone(&cache));
    assert_eq!(movies.len(), 6);

    // mark everything as a stale previous run, eligible for recheck
    for movie in &mut movies {
        movie.scanner_version = SCANNER_VERSION.to_string();
        movie.scanner_revision = reelscan::recheck::SCANNER_REVISION;
        movie.last_scanned = Some(chrono::Utc::now() - chrono::Duration::days(400));
    }

    let pipeline = build_pipeline(&config, cache);
    let done = pipeline.run(movies, dir.path().to_path_buf()).await;
    assert_eq!(done.len(), 6);

    // only the budgeted two were re-enriched this run
    let rescanned = done
        .iter()
        .filter(|m| {
            m.last_scanned
                .is_some_and(|t| (chrono::Utc::now() - t).num_days() < 1)
        })
        .count();
    assert_eq!(rescanned, 2);
}
