mod cli;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};

use reelscan::config::{self, Config, LibraryRoot};
use reelscan::merge::OverrideEngine;
use reelscan::metadata::{EnrichmentPipeline, ProviderRegistry};
use reelscan::model::Movie;
use reelscan::probe::MediaInfoProber;
use reelscan::recheck::RecheckPolicy;
use reelscan::scanner::DirectoryScanner;
use reelscan::sidecar::{AttachmentService, NfoReader};
use reelscan::state::RunFingerprint;
use reelscan::vfs::DirectoryCache;
use reelscan::workers::{ScanBudget, Throttle};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise derive defaults from the verbose
    // flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "reelscan=trace,reelscan_parser=debug".to_string()
        } else {
            "reelscan=info".to_string()
        }
    });
    tracing_subscriber::fmt().with_env_filter(&env_filter).init();

    match cli.command {
        Commands::Scan { library, dry_run } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(scan(cli.config.as_deref(), library, dry_run))
        }
        Commands::ParseName {
            name,
            directory,
            json,
        } => parse_name(cli.config.as_deref(), &name, directory, json),
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate(path.as_deref())
        }
    }
}

async fn scan(
    config_path: Option<&Path>,
    library_override: Option<PathBuf>,
    dry_run: bool,
) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;
    if let Some(path) = library_override {
        config.libraries = vec![LibraryRoot {
            path,
            excludes: Vec::new(),
        }];
        config::validate_config(&config)?;
    }

    let state_path = state_path(&config);
    let fingerprint = RunFingerprint::from_config(&config);
    let full_rebuild = match RunFingerprint::load(&state_path)? {
        Some(previous) => fingerprint.forces_rebuild(&previous),
        None => true,
    };
    if full_rebuild {
        tracing::info!("full rebuild: every unit will be enriched from scratch");
    }

    let engine = Arc::new(OverrideEngine::from_rules(&config.overrides));
    let cache = Arc::new(DirectoryCache::new());
    let scanner = DirectoryScanner::new(&config, Arc::clone(&engine), Arc::clone(&cache));

    let pipeline = Arc::new(EnrichmentPipeline::new(
        Arc::new(MediaInfoProber::new(config.tools.mediainfo_path.as_deref())),
        NfoReader::new(config.nfo.clone()),
        Arc::new(AttachmentService::new(
            &config.tools,
            config.artwork.clone(),
        )),
        ProviderRegistry::new(),
        Arc::clone(&engine),
        Arc::clone(&cache),
        Arc::new(Throttle::new(&config.workers)),
        ScanBudget::new(config.workers.max_scans),
        RecheckPolicy::new(config.recheck.clone()),
    ));

    let mut total: Vec<Movie> = Vec::new();
    for library in &config.libraries {
        tracing::info!(root = %library.path.display(), "scanning library");
        let movies = scanner.scan_library(library);
        if dry_run {
            total.extend(movies);
            continue;
        }
        let enriched = Arc::clone(&pipeline)
            .run(movies, library.path.clone())
            .await;
        total.extend(enriched);
    }

    print_summary(&total, dry_run);

    if !dry_run {
        fingerprint.save(&state_path)?;
    }
    Ok(())
}

fn print_summary(movies: &[Movie], dry_run: bool) {
    let tv = movies.iter().filter(|m| m.is_tv()).count();
    let extras = movies.iter().filter(|m| m.is_extra()).count();
    println!(
        "{} unit(s): {} movie(s), {} show(s), {} extra(s){}",
        movies.len(),
        movies.len() - tv - extras,
        tv,
        extras,
        if dry_run { " [dry run]" } else { "" }
    );
    for movie in movies {
        println!(
            "  {} ({}) - {} file(s)",
            movie.title,
            movie.year,
            movie.movie_files.len()
        );
    }
}

fn state_path(config: &Config) -> PathBuf {
    config
        .state_file
        .clone()
        .unwrap_or_else(|| PathBuf::from("reelscan-state.xml"))
}

fn parse_name(
    config_path: Option<&Path>,
    name: &str,
    directory: bool,
    json: bool,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let parsed = reelscan_parser::parse_with(&config.parser, name, !directory);

    if json {
        println!("{}", serde_json::to_string_pretty(&parsed)?);
        return Ok(());
    }
    println!(
        "Title:    {}",
        if parsed.title.is_empty() {
            "-"
        } else {
            &parsed.title
        }
    );
    if let Some(year) = parsed.year {
        println!("Year:     {year}");
    }
    if let Some(season) = parsed.season {
        println!("Season:   {season}");
    }
    if !parsed.episodes.is_empty() {
        println!(
            "Episodes: {}",
            parsed
                .episodes
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    if let Some(part) = parsed.part {
        println!("Part:     {part}");
    }
    if let Some(ref title) = parsed.part_title {
        println!("Subtitle: {title}");
    }
    if !parsed.container.is_empty() {
        println!("Container: {}", parsed.container);
    }
    if let Some(ref source) = parsed.video_source {
        println!("Source:   {source}");
    }
    if let Some(ref codec) = parsed.video_codec {
        println!("Video:    {codec}");
    }
    if let Some(ref codec) = parsed.audio_codec {
        println!("Audio:    {codec}");
    }
    if parsed.extra {
        println!("Extra:    yes");
    }
    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    println!("Checking external tools...\n");

    let tools: [(&str, Option<&Path>); 3] = [
        ("mediainfo", config.tools.mediainfo_path.as_deref()),
        ("mkvmerge", config.tools.mkvmerge_path.as_deref()),
        ("mkvextract", config.tools.mkvextract_path.as_deref()),
    ];
    let mut all_ok = true;
    for (name, configured) in tools {
        let found = match configured {
            Some(path) if path.exists() => Some(path.to_path_buf()),
            Some(_) | None => which::which(name).ok(),
        };
        match found {
            Some(path) => println!("✓ {} - {}", name, path.display()),
            None => {
                all_ok = false;
                println!("✗ {name}");
            }
        }
    }

    println!();
    if all_ok {
        println!("All optional tools are available!");
    } else {
        println!("Missing tools disable their subsystem; scanning still works.");
    }
    Ok(())
}

fn validate(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            println!("  Libraries: {}", config.libraries.len());
            println!("  Extensions: {}", config.scanner.extensions.len());
            println!("  Override rules: {}", config.overrides.len());
            println!(
                "  Workers: {} running / {} io",
                config.workers.running, config.workers.io
            );
        }
        None => {
            println!("No config file specified, using defaults");
            let config = Config::default();
            println!("Default config:");
            println!(
                "  Workers: {} running / {} io",
                config.workers.running, config.workers.io
            );
        }
    }
    Ok(())
}
