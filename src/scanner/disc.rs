//! DVD/BluRay disc-folder probing.
//!
//! A `VIDEO_TS` or `BDMV` directory makes its parent one logical unit. The
//! prober returns the ordered content files for that unit plus an aggregate
//! duration when one can be derived (BluRay playlist analysis).

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::model::FormatType;
use crate::vfs::{DirectoryCache, FileNode};

/// Ordered content files and aggregate duration for a disc unit.
#[derive(Debug)]
pub struct DiscStructure {
    pub kind: FormatType,
    /// Ordered playable files; may be empty for malformed discs.
    pub files: Vec<FileNode>,
    /// Aggregate duration in seconds, when derivable.
    pub duration_secs: Option<u32>,
}

/// Probe the disc folder under `parent`, if any.
pub fn probe_disc(parent: &Path, cache: &DirectoryCache) -> Option<DiscStructure> {
    let video_ts = parent.join("VIDEO_TS");
    if cache.node(&video_ts).is_dir() {
        return Some(probe_dvd(&video_ts, cache));
    }
    let bdmv = parent.join("BDMV");
    if cache.node(&bdmv).is_dir() {
        return Some(probe_bluray(&bdmv, cache));
    }
    None
}

/// DVD: the main title set is taken to be the largest VTS group by total
/// VOB size; its VOBs are the content files, in number order.
fn probe_dvd(video_ts: &Path, cache: &DirectoryCache) -> DiscStructure {
    let mut groups: std::collections::HashMap<String, Vec<FileNode>> =
        std::collections::HashMap::new();

    for entry in cache.preload(&cache.node(video_ts)) {
        let name = entry.name().to_ascii_uppercase();
        // VTS_nn_m.VOB; VTS_nn_0.VOB holds menus, not the feature
        if name.starts_with("VTS_") && name.ends_with(".VOB") && !name.ends_with("_0.VOB") {
            if let Some(set) = name.get(4..6) {
                groups.entry(set.to_string()).or_default().push(entry);
            }
        }
    }

    let mut main = groups
        .into_values()
        .max_by_key(|vobs| vobs.iter().map(FileNode::len).sum::<u64>())
        .unwrap_or_default();
    main.sort_by_key(|f| f.name());

    if main.is_empty() {
        warn!(dir = %video_ts.display(), "no title-set VOBs found");
    }
    DiscStructure {
        kind: FormatType::Dvd,
        files: main,
        duration_secs: None,
    }
}

/// BluRay: the longest playlist decides both the stream files and the
/// duration; without a readable playlist, fall back to the largest stream.
fn probe_bluray(bdmv: &Path, cache: &DirectoryCache) -> DiscStructure {
    let playlist_dir = bdmv.join("PLAYLIST");
    let stream_dir = bdmv.join("STREAM");

    let mut best: Option<Playlist> = None;
    for entry in cache.preload(&cache.node(&playlist_dir)) {
        if !entry.name().to_ascii_lowercase().ends_with(".mpls") {
            continue;
        }
        match parse_mpls(entry.path()) {
            Ok(playlist) => {
                if best
                    .as_ref()
                    .map(|b| playlist.duration_secs > b.duration_secs)
                    .unwrap_or(true)
                {
                    best = Some(playlist);
                }
            }
            Err(err) => debug!(playlist = %entry.path().display(), %err, "unreadable playlist"),
        }
    }

    if let Some(playlist) = best {
        let files: Vec<FileNode> = playlist
            .clips
            .iter()
            .map(|clip| cache.node(&stream_dir.join(format!("{clip}.m2ts"))))
            .filter(FileNode::exists)
            .collect();
        if !files.is_empty() {
            return DiscStructure {
                kind: FormatType::BluRay,
                files,
                duration_secs: Some(playlist.duration_secs),
            };
        }
    }

    // no usable playlist: largest stream wins
    let mut streams: Vec<FileNode> = cache
        .preload(&cache.node(&stream_dir))
        .into_iter()
        .filter(|f| f.name().to_ascii_lowercase().ends_with(".m2ts"))
        .collect();
    streams.sort_by_key(|f| std::cmp::Reverse(f.len()));
    streams.truncate(1);

    if streams.is_empty() {
        warn!(dir = %bdmv.display(), "no stream files found");
    }
    DiscStructure {
        kind: FormatType::BluRay,
        files: streams,
        duration_secs: None,
    }
}

struct Playlist {
    clips: Vec<String>,
    duration_secs: u32,
}

/// Minimal MPLS reader: play items only, enough for clip names and the
/// summed in/out durations (45 kHz clock).
fn parse_mpls(path: &Path) -> std::io::Result<Playlist> {
    let data = fs::read(path)?;
    let bad = || std::io::Error::new(std::io::ErrorKind::InvalidData, "malformed playlist");

    if data.len() < 12 || &data[0..4] != b"MPLS" {
        return Err(bad());
    }
    let playlist_start = u32::from_be_bytes([data[8], data[9], data[10], data[11]]) as usize;
    if data.len() < playlist_start + 10 {
        return Err(bad());
    }
    let item_count =
        u16::from_be_bytes([data[playlist_start + 6], data[playlist_start + 7]]) as usize;

    let mut clips = Vec::new();
    let mut ticks: u64 = 0;
    let mut offset = playlist_start + 10;
    for _ in 0..item_count {
        if data.len() < offset + 2 {
            return Err(bad());
        }
        let item_len = u16::from_be_bytes([data[offset], data[offset + 1]]) as usize;
        let item = data.get(offset + 2..offset + 2 + item_len).ok_or_else(bad)?;
        if item.len() < 20 {
            return Err(bad());
        }
        let clip = String::from_utf8_lossy(&item[0..5]).into_owned();
        let in_time = u32::from_be_bytes([item[12], item[13], item[14], item[15]]) as u64;
        let out_time = u32::from_be_bytes([item[16], item[17], item[18], item[19]]) as u64;
        ticks += out_time.saturating_sub(in_time);
        if !clips.contains(&clip) {
            clips.push(clip);
        }
        offset += 2 + item_len;
    }

    Ok(Playlist {
        clips,
        duration_secs: (ticks / 45_000) as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_mpls(path: &Path, items: &[(&str, u32, u32)]) {
        let mut body = Vec::new();
        // playlist section: length, reserved, counts
        let mut items_bytes = Vec::new();
        for (clip, in_time, out_time) in items {
            let mut item = Vec::new();
            item.extend_from_slice(clip.as_bytes()); // 5 bytes
            item.extend_from_slice(b"M2TS");
            item.extend_from_slice(&[0, 0, 0]); // flags + stc id
            item.extend_from_slice(&in_time.to_be_bytes());
            item.extend_from_slice(&out_time.to_be_bytes());
            items_bytes.extend_from_slice(&(item.len() as u16).to_be_bytes());
            items_bytes.extend_from_slice(&item);
        }
        body.extend_from_slice(&0u32.to_be_bytes()); // section length
        body.extend_from_slice(&[0, 0]); // reserved
        body.extend_from_slice(&(items.len() as u16).to_be_bytes());
        body.extend_from_slice(&0u16.to_be_bytes()); // subpaths
        body.extend_from_slice(&items_bytes);

        let mut out = Vec::new();
        out.extend_from_slice(b"MPLS0200");
        out.extend_from_slice(&40u32.to_be_bytes()); // playlist start
        out.resize(40, 0);
        out.extend_from_slice(&body);
        fs::write(path, out).unwrap();
    }

    #[test]
    fn bluray_playlist_selects_streams_and_duration() {
        let dir = tempfile::tempdir().unwrap();
        let bdmv = dir.path().join("BDMV");
        fs::create_dir_all(bdmv.join("PLAYLIST")).unwrap();
        fs::create_dir_all(bdmv.join("STREAM")).unwrap();
        fs::write(bdmv.join("STREAM/00001.m2ts"), vec![0u8; 100]).unwrap();
        fs::write(bdmv.join("STREAM/00002.m2ts"), vec![0u8; 50]).unwrap();
        // 90 minutes over one clip
        write_mpls(
            &bdmv.join("PLAYLIST/00000.mpls"),
            &[("00001", 0, 90 * 60 * 45_000)],
        );

        let cache = DirectoryCache::new();
        let disc = probe_disc(dir.path(), &cache).unwrap();
        assert_eq!(disc.kind, FormatType::BluRay);
        assert_eq!(disc.files.len(), 1);
        assert_eq!(disc.files[0].name(), "00001.m2ts");
        assert_eq!(disc.duration_secs, Some(90 * 60));
    }

    #[test]
    fn dvd_main_title_set_by_size() {
        let dir = tempfile::tempdir().unwrap();
        let video_ts = dir.path().join("VIDEO_TS");
        fs::create_dir_all(&video_ts).unwrap();
        fs::write(video_ts.join("VTS_01_0.VOB"), vec![0u8; 10]).unwrap(); // menu
        fs::write(video_ts.join("VTS_01_1.VOB"), vec![0u8; 500]).unwrap();
        fs::write(video_ts.join("VTS_01_2.VOB"), vec![0u8; 500]).unwrap();
        fs::write(video_ts.join("VTS_02_1.VOB"), vec![0u8; 50]).unwrap(); // extras

        let cache = DirectoryCache::new();
        let disc = probe_disc(dir.path(), &cache).unwrap();
        assert_eq!(disc.kind, FormatType::Dvd);
        let names: Vec<String> = disc.files.iter().map(FileNode::name).collect();
        assert_eq!(names, vec!["VTS_01_1.VOB", "VTS_01_2.VOB"]);
    }

    #[test]
    fn plain_directory_is_not_a_disc() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DirectoryCache::new();
        assert!(probe_disc(dir.path(), &cache).is_none());
    }
}
