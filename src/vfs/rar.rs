//! RAR (v4 format) volume parsing and multi-volume expansion.
//!
//! Only the block headers are read; packed data is skipped, never
//! decompressed. That is enough to expose contained files as virtual nodes
//! with their name, size and modification time, and to follow multi-volume
//! chains via the split-before/split-after flags on each file header.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use crate::vfs::{ArchiveScanner, FileNode};

const SIGNATURE: [u8; 7] = [0x52, 0x61, 0x72, 0x21, 0x1a, 0x07, 0x00];

const MAIN_HEADER: u8 = 0x73;
const FILE_HEADER: u8 = 0x74;
const END_HEADER: u8 = 0x7b;

const MHD_PASSWORD: u16 = 0x0080;
const MHD_FIRSTVOLUME: u16 = 0x0100;

const LHD_SPLIT_BEFORE: u16 = 0x0001;
const LHD_SPLIT_AFTER: u16 = 0x0002;
const LHD_LARGE: u16 = 0x0100;
const LHD_UNICODE: u16 = 0x0200;
const LHD_WINDOW_MASK: u16 = 0x00e0;
const LHD_DIRECTORY: u16 = 0x00e0;

/// Generic block flag: an additional data area follows the header.
const SKIP_IF_UNKNOWN_ADD_SIZE: u16 = 0x8000;

#[derive(Debug, Error)]
pub enum RarError {
    #[error("not a RAR archive")]
    BadSignature,
    #[error("archive main header reports encryption")]
    Encrypted,
    #[error("truncated archive")]
    Truncated,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One file entry read from a volume's headers.
#[derive(Debug, Clone)]
pub struct VolumeEntry {
    pub name: String,
    pub unpacked_size: u64,
    pub split_before: bool,
    pub split_after: bool,
    pub is_dir: bool,
    pub mtime: DateTime<Utc>,
}

/// Headers of a single parsed volume.
#[derive(Debug)]
pub struct Volume {
    pub main_flags: u16,
    pub entries: Vec<VolumeEntry>,
}

impl Volume {
    pub fn is_first_volume(&self) -> bool {
        self.main_flags & MHD_FIRSTVOLUME != 0
    }

    pub fn has_split_before(&self) -> bool {
        self.entries.iter().any(|e| e.split_before)
    }

    /// The chain continues when the last entry spills into the next
    /// volume.
    pub fn continues(&self) -> bool {
        self.entries.last().is_some_and(|e| e.split_after)
    }
}

fn read_u8(r: &mut impl Read) -> Result<u8, RarError> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf).map_err(|_| RarError::Truncated)?;
    Ok(buf[0])
}

fn read_u16(r: &mut impl Read) -> Result<u16, RarError> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf).map_err(|_| RarError::Truncated)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32(r: &mut impl Read) -> Result<u32, RarError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf).map_err(|_| RarError::Truncated)?;
    Ok(u32::from_le_bytes(buf))
}

/// Decode an MS-DOS date/time stamp.
fn decode_dos_time(stamp: u32) -> DateTime<Utc> {
    let time = (stamp & 0xffff) as u16;
    let date = (stamp >> 16) as u16;
    let year = 1980 + i32::from(date >> 9);
    let month = u32::from((date >> 5) & 0x0f);
    let day = u32::from(date & 0x1f);
    let hour = u32::from(time >> 11);
    let minute = u32::from((time >> 5) & 0x3f);
    let second = u32::from((time & 0x1f) * 2);
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, minute, second))
        .map(|dt| Utc.from_utc_datetime(&dt))
        .unwrap_or_else(|| Utc.timestamp_opt(0, 0).single().unwrap_or_default())
}

/// Parse the headers of one volume.
///
/// Fails with [`RarError::Encrypted`] when the main header carries the
/// password flag; file names are unreadable in that case.
pub fn parse_volume(path: &Path) -> Result<Volume, RarError> {
    let mut reader = BufReader::new(File::open(path)?);

    let mut sig = [0u8; 7];
    reader.read_exact(&mut sig).map_err(|_| RarError::Truncated)?;
    if sig != SIGNATURE {
        return Err(RarError::BadSignature);
    }

    let mut main_flags = 0u16;
    let mut entries = Vec::new();

    loop {
        let header_start = reader.stream_position()?;
        // generic block header: crc, type, flags, size
        let _crc = match read_u16(&mut reader) {
            Ok(v) => v,
            Err(_) => break, // clean EOF between blocks
        };
        let head_type = read_u8(&mut reader)?;
        let head_flags = read_u16(&mut reader)?;
        let head_size = u64::from(read_u16(&mut reader)?);
        if head_size < 7 {
            return Err(RarError::Truncated);
        }

        match head_type {
            MAIN_HEADER => {
                main_flags = head_flags;
                if main_flags & MHD_PASSWORD != 0 {
                    return Err(RarError::Encrypted);
                }
                reader.seek(SeekFrom::Start(header_start + head_size))?;
            }
            FILE_HEADER => {
                let pack_size = u64::from(read_u32(&mut reader)?);
                let unp_size = u64::from(read_u32(&mut reader)?);
                let _host_os = read_u8(&mut reader)?;
                let _file_crc = read_u32(&mut reader)?;
                let ftime = read_u32(&mut reader)?;
                let _unp_ver = read_u8(&mut reader)?;
                let _method = read_u8(&mut reader)?;
                let name_size = usize::from(read_u16(&mut reader)?);
                let _attr = read_u32(&mut reader)?;

                let (pack_size, unp_size) = if head_flags & LHD_LARGE != 0 {
                    let high_pack = u64::from(read_u32(&mut reader)?);
                    let high_unp = u64::from(read_u32(&mut reader)?);
                    (pack_size | (high_pack << 32), unp_size | (high_unp << 32))
                } else {
                    (pack_size, unp_size)
                };

                let mut name_buf = vec![0u8; name_size];
                reader
                    .read_exact(&mut name_buf)
                    .map_err(|_| RarError::Truncated)?;
                // unicode names store the plain name before a NUL byte
                let plain = if head_flags & LHD_UNICODE != 0 {
                    name_buf.split(|b| *b == 0).next().unwrap_or(&name_buf)
                } else {
                    &name_buf[..]
                };
                let name = String::from_utf8_lossy(plain).into_owned();

                entries.push(VolumeEntry {
                    name,
                    unpacked_size: unp_size,
                    split_before: head_flags & LHD_SPLIT_BEFORE != 0,
                    split_after: head_flags & LHD_SPLIT_AFTER != 0,
                    is_dir: head_flags & LHD_WINDOW_MASK == LHD_DIRECTORY,
                    mtime: decode_dos_time(ftime),
                });

                // packed data follows the header
                reader.seek(SeekFrom::Start(header_start + head_size + pack_size))?;
            }
            END_HEADER => break,
            _ => {
                // unknown block: honor the optional trailing data area
                let add_size = if head_flags & SKIP_IF_UNKNOWN_ADD_SIZE != 0 {
                    u64::from(read_u32(&mut reader)?)
                } else {
                    0
                };
                reader.seek(SeekFrom::Start(header_start + head_size + add_size))?;
            }
        }
    }

    Ok(Volume {
        main_flags,
        entries,
    })
}

/// Name of the volume following `name` in a multi-volume chain.
///
/// Handles the `.partNN.rar` convention (width-preserving increment), the
/// old `.rar` -> `.r00` -> `.r01` letter/number scheme, and plain numeric
/// extensions (`.000` -> `.001`).
pub fn next_volume_name(name: &str) -> Option<String> {
    let lower = name.to_ascii_lowercase();

    // .partNN.rar
    if let Some(idx) = lower.rfind(".part") {
        if lower.ends_with(".rar") {
            let digits = &name[idx + 5..name.len() - 4];
            if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
                let next = digits.parse::<u64>().ok()? + 1;
                return Some(format!(
                    "{}.part{:0width$}.rar",
                    &name[..idx],
                    next,
                    width = digits.len()
                ));
            }
        }
    }

    let (stem, ext) = name.rsplit_once('.')?;

    // .rar -> .r00
    if ext.eq_ignore_ascii_case("rar") {
        return Some(format!("{stem}.r00"));
    }

    // .r00 -> .r01, .r99 -> .s00
    let mut chars = ext.chars();
    if let Some(letter) = chars.next() {
        let digits: String = chars.collect();
        if letter.is_ascii_alphabetic() && digits.len() == 2 && digits.chars().all(|c| c.is_ascii_digit()) {
            let n: u32 = digits.parse().ok()?;
            if n < 99 {
                return Some(format!("{stem}.{letter}{:02}", n + 1));
            }
            let next_letter = (letter as u8 + 1) as char;
            return Some(format!("{stem}.{next_letter}00"));
        }
    }

    // .000 -> .001
    if ext.len() == 3 && ext.chars().all(|c| c.is_ascii_digit()) {
        let n: u32 = ext.parse().ok()?;
        return Some(format!("{stem}.{:03}", n + 1));
    }

    None
}

/// True when this filename can open a multi-volume chain.
fn is_head_candidate(lower: &str) -> bool {
    if lower.ends_with(".000") || lower.ends_with(".001") {
        return true;
    }
    if !lower.ends_with(".rar") {
        return false;
    }
    // among .partNN.rar volumes only part 1 is a candidate
    match part_number(lower) {
        Some(n) => n == 1,
        None => true,
    }
}

fn part_number(lower: &str) -> Option<u64> {
    let idx = lower.rfind(".part")?;
    let digits = lower.get(idx + 5..lower.len() - 4)?;
    if !lower.ends_with(".rar") || digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Expands RAR archives found among a directory's files into virtual
/// nodes.
#[derive(Debug, Clone)]
pub struct RarArchiveScanner {
    /// When set, virtual nodes inherit the archive file's modification
    /// time instead of the packed entry's own stamp.
    pub use_archive_mtime: bool,
}

impl RarArchiveScanner {
    pub fn new(use_archive_mtime: bool) -> Self {
        Self { use_archive_mtime }
    }

    /// Follow a volume chain starting at `head`, collecting entries and
    /// the names of every volume consumed.
    fn collect_chain(
        &self,
        dir: &Path,
        head_name: &str,
        head: Volume,
    ) -> (Vec<VolumeEntry>, Vec<String>) {
        let mut entries: Vec<VolumeEntry> = Vec::new();
        let mut consumed = vec![head_name.to_string()];

        let mut current = head;
        let mut current_name = head_name.to_string();
        loop {
            for entry in &current.entries {
                // a split-before entry is the tail of a file already seen
                if entry.split_before && entries.iter().any(|e| e.name == entry.name) {
                    continue;
                }
                entries.push(entry.clone());
            }
            if !current.continues() {
                break;
            }
            let Some(next_name) = next_volume_name(&current_name) else {
                warn!(volume = %current_name, "cannot derive next volume name, chain truncated");
                break;
            };
            let next_path = dir.join(&next_name);
            match parse_volume(&next_path) {
                Ok(volume) => {
                    consumed.push(next_name.clone());
                    current_name = next_name;
                    current = volume;
                }
                Err(err) => {
                    warn!(volume = %next_path.display(), %err, "volume chain broken mid-read");
                    break;
                }
            }
        }
        (entries, consumed)
    }

    /// Materialize virtual nodes for the collected entries, rooted at the
    /// archive's own directory.
    fn build_nodes(&self, dir: &Path, entries: &[VolumeEntry], archive_mtime: Option<DateTime<Utc>>) -> Vec<FileNode> {
        let mut dirs: std::collections::HashMap<PathBuf, FileNode> = std::collections::HashMap::new();
        let mut roots: Vec<FileNode> = Vec::new();

        for entry in entries {
            let relative: PathBuf = entry.name.split(['\\', '/']).collect();
            let mtime = if self.use_archive_mtime {
                archive_mtime.unwrap_or(entry.mtime)
            } else {
                entry.mtime
            };
            let full = dir.join(&relative);

            let node = if entry.is_dir {
                let node = FileNode::virtual_dir(&full, mtime);
                dirs.insert(full.clone(), node.clone());
                node
            } else {
                FileNode::virtual_file(&full, entry.unpacked_size, mtime)
            };

            match full.parent().and_then(|p| dirs.get(p)) {
                Some(parent) => parent.push_child(node),
                None => roots.push(node),
            }
        }
        roots
    }
}

impl ArchiveScanner for RarArchiveScanner {
    fn scan(&self, dir: &Path, candidates: &mut Vec<String>) -> Vec<FileNode> {
        let mut produced = Vec::new();
        let mut consumed_all: Vec<String> = Vec::new();

        let mut heads: Vec<String> = candidates
            .iter()
            .filter(|n| is_head_candidate(&n.to_ascii_lowercase()))
            .cloned()
            .collect();
        heads.sort();

        for head_name in heads {
            if consumed_all.iter().any(|c| c.eq_ignore_ascii_case(&head_name)) {
                continue;
            }
            let head_path = dir.join(&head_name);
            let volume = match parse_volume(&head_path) {
                Ok(v) => v,
                Err(RarError::Encrypted) => {
                    warn!(archive = %head_path.display(), "encrypted archive skipped");
                    continue;
                }
                Err(err) => {
                    warn!(archive = %head_path.display(), %err, "unreadable archive skipped");
                    continue;
                }
            };
            // Legacy archives may omit the first-volume flag; accept the
            // volume as a head only when none of its file headers are
            // continuations. Known to be incomplete for some edge-case
            // archives.
            if !volume.is_first_volume() && volume.has_split_before() {
                debug!(archive = %head_path.display(), "not a first volume, skipped");
                continue;
            }

            let archive_mtime = FileNode::physical(&head_path).modified();
            let (entries, consumed) = self.collect_chain(dir, &head_name, volume);
            debug!(
                archive = %head_path.display(),
                files = entries.len(),
                volumes = consumed.len(),
                "archive expanded"
            );
            produced.extend(self.build_nodes(dir, &entries, archive_mtime));
            consumed_all.extend(consumed);
        }

        candidates.retain(|n| !consumed_all.iter().any(|c| c.eq_ignore_ascii_case(n)));
        produced
    }
}
