//! Embedded container attachments: discovery, classification, lazy
//! extraction.
//!
//! Classification is deliberately strict: MIME type and filename token
//! must both agree, otherwise the attachment is dropped rather than
//! guessed. Extraction to a local file happens only on first request and
//! is memoized per (content type, part).

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::Context;
use dashmap::DashMap;
use regex::Regex;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::{ArtworkConfig, ToolsConfig};
use crate::model::{Attachment, ContentType, Movie};

const TEXT_MIME_TYPES: &[&str] = &["text/xml", "application/xml", "text/html"];

/// (MIME type, expected extension) pairs for image attachments.
const IMAGE_MIME_TYPES: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/x-ms-bmp", "bmp"),
];

/// Classify an attachment from MIME type plus filename tokens.
///
/// Returns `None` for anything undetermined; callers drop those.
pub fn classify(filename: &str, mime_type: &str, artwork: &ArtworkConfig) -> Option<ContentType> {
    let mime = mime_type.to_ascii_lowercase();
    let lower = filename.to_ascii_lowercase();

    if TEXT_MIME_TYPES.contains(&mime.as_str()) {
        return if lower.ends_with(".nfo") {
            Some(ContentType::Nfo)
        } else {
            None
        };
    }

    if IMAGE_MIME_TYPES.iter().any(|(m, _)| *m == mime) {
        let stem = lower.rsplit_once('.').map(|(s, _)| s).unwrap_or(&lower);
        let matches_token = |token: &str| {
            let token = token.to_ascii_lowercase();
            stem == token || stem.ends_with(&format!(".{token}"))
        };
        if matches_token(&artwork.fanart_token) {
            return Some(ContentType::Fanart);
        }
        if matches_token(&artwork.poster_token) {
            return Some(ContentType::Poster);
        }
        if matches_token(&artwork.banner_token) {
            return Some(ContentType::Banner);
        }
        if matches_token(&artwork.videoimage_token) {
            return Some(ContentType::VideoImage);
        }
    }
    None
}

/// Discovers and materializes embedded attachments via the mkvtoolnix
/// tools.
///
/// Missing tools disable the whole subsystem for the run instead of
/// failing it.
pub struct AttachmentService {
    mkvmerge: Option<PathBuf>,
    mkvextract: Option<PathBuf>,
    artwork: ArtworkConfig,
    /// (container path, content type, part) -> materialized file.
    extracted: DashMap<(PathBuf, ContentType, u32), PathBuf>,
    workdir: Option<TempDir>,
}

impl AttachmentService {
    pub fn new(tools: &ToolsConfig, artwork: ArtworkConfig) -> Self {
        let mkvmerge = locate_tool(tools.mkvmerge_path.as_deref(), "mkvmerge");
        let mkvextract = locate_tool(tools.mkvextract_path.as_deref(), "mkvextract");
        if mkvmerge.is_none() || mkvextract.is_none() {
            warn!("mkvtoolnix not fully available, attachment scanning disabled for this run");
        }
        let workdir = match TempDir::new() {
            Ok(dir) => Some(dir),
            Err(err) => {
                warn!(%err, "cannot create attachment work directory, extraction disabled");
                None
            }
        };
        Self {
            mkvmerge,
            mkvextract,
            artwork,
            extracted: DashMap::new(),
            workdir,
        }
    }

    pub fn is_available(&self) -> bool {
        self.mkvmerge.is_some() && self.mkvextract.is_some() && self.workdir.is_some()
    }

    /// Enumerate classified attachments in every matroska part of `movie`.
    pub async fn scan(&self, movie: &mut Movie) {
        if !self.is_available() {
            return;
        }
        let Some(mkvmerge) = &self.mkvmerge else { return };

        let mut found: Vec<Attachment> = Vec::new();
        for mf in &movie.movie_files {
            let path = mf.file.path();
            if mf.file.is_virtual()
                || !path
                    .extension()
                    .is_some_and(|e| e.eq_ignore_ascii_case("mkv"))
            {
                continue;
            }
            let output = match Command::new(mkvmerge).arg("-i").arg(path).output().await {
                Ok(o) if o.status.success() => o,
                Ok(o) => {
                    debug!(file = %path.display(), status = %o.status, "mkvmerge identify failed");
                    continue;
                }
                Err(err) => {
                    warn!(file = %path.display(), %err, "mkvmerge could not run");
                    continue;
                }
            };
            for line in String::from_utf8_lossy(&output.stdout).lines() {
                let Some((id, mime, name)) = parse_identify_line(line) else {
                    continue;
                };
                match classify(&name, &mime, &self.artwork) {
                    Some(content_type) => found.push(Attachment {
                        id,
                        filename: name,
                        mime_type: mime,
                        content_type,
                        source_file: path.to_path_buf(),
                        part: mf.first_part,
                    }),
                    None => {
                        debug!(file = %path.display(), attachment = %name, "undetermined attachment dropped")
                    }
                }
            }
        }
        debug!(movie = %movie.base_name, count = found.len(), "attachments discovered");
        movie.attachments = found;
    }

    /// Materialize an attachment, lazily and at most once per
    /// (container, content type, part).
    ///
    /// The extracted file inherits the container's modification time so
    /// downstream freshness checks stay consistent.
    pub async fn extract(&self, attachment: &Attachment) -> anyhow::Result<PathBuf> {
        let key = (
            attachment.source_file.clone(),
            attachment.content_type,
            attachment.part,
        );
        if let Some(existing) = self.extracted.get(&key) {
            return Ok(existing.clone());
        }

        let mkvextract = self
            .mkvextract
            .as_ref()
            .context("mkvextract not available")?;
        let workdir = self.workdir.as_ref().context("work directory not available")?;
        let dest = workdir.path().join(format!(
            "{}-{}-{}",
            attachment.part, attachment.id, attachment.filename
        ));

        let status = Command::new(mkvextract)
            .arg("attachments")
            .arg(&attachment.source_file)
            .arg(format!("{}:{}", attachment.id, dest.display()))
            .status()
            .await
            .with_context(|| format!("failed to run mkvextract on {}", attachment.source_file.display()))?;
        if !status.success() {
            anyhow::bail!(
                "mkvextract exited with {} for {}",
                status,
                attachment.source_file.display()
            );
        }

        inherit_mtime(&attachment.source_file, &dest)?;
        self.extracted.insert(key, dest.clone());
        Ok(dest)
    }
}

fn locate_tool(configured: Option<&Path>, name: &str) -> Option<PathBuf> {
    match configured {
        Some(path) if path.exists() => Some(path.to_path_buf()),
        Some(path) => {
            warn!(tool = name, path = %path.display(), "configured tool path does not exist");
            None
        }
        None => which::which(name).ok(),
    }
}

/// Parse one `mkvmerge -i` attachment line:
/// `Attachment ID 1: type 'image/jpeg', size 1234 bytes, file name 'x.jpg'`
fn parse_identify_line(line: &str) -> Option<(u32, String, String)> {
    static LINE_RE: OnceLock<Regex> = OnceLock::new();
    let re = LINE_RE.get_or_init(|| {
        Regex::new(r"^Attachment ID (\d+): type '([^']+)'.*file name '([^']+)'")
            .expect("identify line pattern")
    });
    let caps = re.captures(line)?;
    Some((caps[1].parse().ok()?, caps[2].to_string(), caps[3].to_string()))
}

fn inherit_mtime(source: &Path, dest: &Path) -> anyhow::Result<()> {
    let mtime = std::fs::metadata(source)
        .and_then(|m| m.modified())
        .with_context(|| format!("cannot read mtime of {}", source.display()))?;
    let file = std::fs::File::options()
        .write(true)
        .open(dest)
        .with_context(|| format!("cannot open extracted file {}", dest.display()))?;
    file.set_times(std::fs::FileTimes::new().set_modified(mtime))
        .with_context(|| format!("cannot set mtime on {}", dest.display()))?;
    Ok(())
}
