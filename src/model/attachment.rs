use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Classification of an embedded container attachment.
///
/// Attachments whose MIME type and filename do not resolve to one of these
/// are dropped during discovery, never guessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Nfo,
    Poster,
    Fanart,
    Banner,
    VideoImage,
}

/// A sidecar payload embedded inside a container file.
///
/// The attachment is not materialized on disk until first requested; `id`
/// is the container-assigned ordinal used by the extraction tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    /// Ordinal within the source container, stable across runs.
    pub id: u32,
    pub filename: String,
    pub mime_type: String,
    pub content_type: ContentType,
    /// The container file holding this attachment.
    pub source_file: PathBuf,
    /// Part number of the movie file the container belongs to.
    pub part: u32,
}
