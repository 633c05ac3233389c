//! End-to-end scanning over real directory trees.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use reelscan::config::{Config, LibraryRoot, OverrideRule};
use reelscan::merge::OverrideEngine;
use reelscan::model::MediaType;
use reelscan::scanner::DirectoryScanner;
use reelscan::sidecar::NfoReader;
use reelscan::vfs::DirectoryCache;

fn scan(config: &Config, root: &Path) -> Vec<reelscan::model::Movie> {
    scan_with(config, root, Vec::new())
}

fn scan_with(
    config: &Config,
    root: &Path,
    excludes: Vec<String>,
) -> Vec<reelscan::model::Movie> {
    let engine = Arc::new(OverrideEngine::from_rules(&config.overrides));
    let cache = Arc::new(DirectoryCache::new());
    let scanner = DirectoryScanner::new(config, engine, cache);
    scanner.scan_library(&LibraryRoot {
        path: root.to_path_buf(),
        excludes,
    })
}

#[test]
fn mixed_library_tree_scans_completely() {
    let dir = tempfile::tempdir().unwrap();
    let movies_dir = dir.path().join("Movies");
    fs::create_dir(&movies_dir).unwrap();
    fs::write(movies_dir.join("Inception (2010) 1080p.mkv"), b"x").unwrap();
    fs::write(movies_dir.join("Heat (1995) cd1.avi"), b"x").unwrap();
    fs::write(movies_dir.join("Heat (1995) cd2.avi"), b"x").unwrap();

    let tv_dir = dir.path().join("TV");
    fs::create_dir(&tv_dir).unwrap();
    fs::write(tv_dir.join("Show S01E01 - Pilot.mkv"), b"x").unwrap();
    fs::write(tv_dir.join("Show S01E02.mkv"), b"x").unwrap();

    let ignored = dir.path().join("Downloads");
    fs::create_dir(&ignored).unwrap();
    fs::write(ignored.join(".mjbignore"), b"").unwrap();
    fs::write(ignored.join("Unfinished (2020).mkv"), b"x").unwrap();

    let config = Config::default();
    let movies = scan(&config, dir.path());

    assert_eq!(movies.len(), 3);

    let inception = movies.iter().find(|m| m.title == "Inception").unwrap();
    assert_eq!(inception.year, "2010");
    assert_eq!(inception.resolution, "1080p");

    let heat = movies.iter().find(|m| m.title == "Heat").unwrap();
    assert_eq!(heat.movie_files.len(), 2);

    let show = movies.iter().find(|m| m.title == "Show").unwrap();
    assert_eq!(show.media_type, MediaType::TvShow);
    assert_eq!(show.season, Some(1));
    assert_eq!(show.movie_files.len(), 2);
    assert_eq!(
        show.movie_files[0].part_titles.get(&1).map(String::as_str),
        Some("Pilot")
    );
}

#[test]
fn exclusion_pattern_prunes_subtree() {
    let dir = tempfile::tempdir().unwrap();
    let sample = dir.path().join("sample");
    fs::create_dir(&sample).unwrap();
    fs::write(sample.join("Movie Sample (2001).mkv"), b"x").unwrap();
    fs::write(dir.path().join("Real Movie (2002).mkv"), b"x").unwrap();

    let config = Config::default();
    let movies = scan_with(&config, dir.path(), vec!["/^sample/".to_string()]);
    assert_eq!(movies.len(), 1);
    assert_eq!(movies[0].title, "Real Movie");
}

mod rar {
    use super::*;

    const SIGNATURE: [u8; 7] = [0x52, 0x61, 0x72, 0x21, 0x1a, 0x07, 0x00];
    const MHD_FIRSTVOLUME: u16 = 0x0100;
    const LHD_SPLIT_BEFORE: u16 = 0x0001;
    const LHD_SPLIT_AFTER: u16 = 0x0002;

    fn write_volume(path: &Path, main_flags: u16, files: &[(&str, u32, u16)]) {
        let mut out = Vec::new();
        out.extend_from_slice(&SIGNATURE);
        out.extend_from_slice(&0u16.to_le_bytes());
        out.push(0x73); // main header
        out.extend_from_slice(&main_flags.to_le_bytes());
        out.extend_from_slice(&13u16.to_le_bytes());
        out.extend_from_slice(&[0u8; 6]);

        for (name, unp, flags) in files {
            let pack: u32 = 4;
            let head_size = 7 + 25 + name.len() as u16;
            out.extend_from_slice(&0u16.to_le_bytes());
            out.push(0x74); // file header
            out.extend_from_slice(&flags.to_le_bytes());
            out.extend_from_slice(&head_size.to_le_bytes());
            out.extend_from_slice(&pack.to_le_bytes());
            out.extend_from_slice(&unp.to_le_bytes());
            out.push(0);
            out.extend_from_slice(&0u32.to_le_bytes());
            out.extend_from_slice(&0x5821_8000u32.to_le_bytes());
            out.push(29);
            out.push(0x30);
            out.extend_from_slice(&(name.len() as u16).to_le_bytes());
            out.extend_from_slice(&0u32.to_le_bytes());
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(&[0u8; 4]);
        }
        let mut f = fs::File::create(path).unwrap();
        f.write_all(&out).unwrap();
    }

    #[test]
    fn archived_movie_scans_like_a_flat_file() {
        let dir = tempfile::tempdir().unwrap();
        write_volume(
            &dir.path().join("Archived Film (2004).part01.rar"),
            MHD_FIRSTVOLUME,
            &[("Archived Film (2004).avi", 700_000, LHD_SPLIT_AFTER)],
        );
        write_volume(
            &dir.path().join("Archived Film (2004).part02.rar"),
            0,
            &[(
                "Archived Film (2004).avi",
                700_000,
                LHD_SPLIT_BEFORE | LHD_SPLIT_AFTER,
            )],
        );
        write_volume(
            &dir.path().join("Archived Film (2004).part03.rar"),
            0,
            &[("Archived Film (2004).avi", 700_000, LHD_SPLIT_BEFORE)],
        );

        let config = Config::default();
        let movies = scan(&config, dir.path());

        // the reassembled member appears exactly once
        assert_eq!(movies.len(), 1);
        assert_eq!(movies[0].title, "Archived Film");
        assert_eq!(movies[0].year, "2004");
        assert_eq!(movies[0].movie_files.len(), 1);
        assert!(movies[0].movie_files[0].file.is_virtual());
        assert_eq!(movies[0].movie_files[0].file.len(), 700_000);
    }
}

#[test]
fn nfo_sidecar_fills_and_overrides_per_configuration() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("Dream Film (2010).mkv"), b"x").unwrap();
    fs::write(
        dir.path().join("Dream Film (2010).nfo"),
        r#"<?xml version="1.0"?>
<movie>
  <title>Dream Film: The Real Title</title>
  <plot>A thief who steals secrets.</plot>
  <id>tt1375666</id>
</movie>"#,
    )
    .unwrap();

    let mut config = Config::default();
    config.overrides.push(OverrideRule {
        field: "title".to_string(),
        source: "nfo".to_string(),
    });

    let engine = Arc::new(OverrideEngine::from_rules(&config.overrides));
    let cache = Arc::new(DirectoryCache::new());
    let scanner = DirectoryScanner::new(&config, Arc::clone(&engine), Arc::clone(&cache));
    let mut movies = scanner.scan_library(&LibraryRoot {
        path: dir.path().to_path_buf(),
        excludes: Vec::new(),
    });
    assert_eq!(movies.len(), 1);
    let movie = &mut movies[0];
    assert_eq!(movie.title, "Dream Film");

    let reader = NfoReader::new(config.nfo.clone());
    let parsed = reader.scan(movie, dir.path(), &cache, &engine);
    assert_eq!(parsed, 1);

    // plot was unknown, lands; title was owned by filename but nfo is
    // allowed by the configured override rule
    assert_eq!(movie.plot, "A thief who steals secrets.");
    assert_eq!(movie.title, "Dream Film: The Real Title");
    assert_eq!(movie.ids.get("imdb").map(String::as_str), Some("tt1375666"));
    // year stays with the filename source
    assert_eq!(movie.year, "2010");
}
