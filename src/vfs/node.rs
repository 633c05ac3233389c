use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Memoized stat results for a physical node.
///
/// Queried from the OS at most once per node instance; staleness within a
/// run is an accepted tradeoff for avoiding repeated stat calls over large
/// libraries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct Stat {
    exists: bool,
    is_dir: bool,
    is_file: bool,
    len: u64,
    mtime: Option<DateTime<Utc>>,
}

impl Stat {
    fn absent() -> Self {
        Self {
            exists: false,
            is_dir: false,
            is_file: false,
            len: 0,
            mtime: None,
        }
    }

    fn query(path: &Path) -> Self {
        match fs::metadata(path) {
            Ok(meta) => Self {
                exists: true,
                is_dir: meta.is_dir(),
                is_file: meta.is_file(),
                len: meta.len(),
                mtime: meta.modified().ok().map(DateTime::<Utc>::from),
            },
            Err(_) => Self::absent(),
        }
    }
}

/// A real filesystem entry with lazily memoized metadata.
#[derive(Debug)]
pub struct PhysicalNode {
    path: PathBuf,
    stat: OnceLock<Stat>,
}

impl PhysicalNode {
    fn stat(&self) -> &Stat {
        self.stat.get_or_init(|| Stat::query(&self.path))
    }
}

/// A file or directory exposed from inside an archive or disc structure.
///
/// Virtual nodes are immutable: fixed length, fixed modification time,
/// always existing. Directory children are appended as archive volumes are
/// parsed.
#[derive(Debug)]
pub struct VirtualNode {
    /// Where the node appears to live on disk (the archive's directory).
    path: PathBuf,
    len: u64,
    mtime: DateTime<Utc>,
    is_dir: bool,
    children: RwLock<Vec<FileNode>>,
}

/// A file-like node: either a real filesystem entry or a virtual member of
/// an expanded archive/disc structure.
#[derive(Debug, Clone)]
pub enum FileNode {
    Physical(Arc<PhysicalNode>),
    Virtual(Arc<VirtualNode>),
}

impl FileNode {
    pub fn physical(path: impl Into<PathBuf>) -> Self {
        FileNode::Physical(Arc::new(PhysicalNode {
            path: path.into(),
            stat: OnceLock::new(),
        }))
    }

    pub fn virtual_file(
        path: impl Into<PathBuf>,
        len: u64,
        mtime: DateTime<Utc>,
    ) -> Self {
        FileNode::Virtual(Arc::new(VirtualNode {
            path: path.into(),
            len,
            mtime,
            is_dir: false,
            children: RwLock::new(Vec::new()),
        }))
    }

    pub fn virtual_dir(path: impl Into<PathBuf>, mtime: DateTime<Utc>) -> Self {
        FileNode::Virtual(Arc::new(VirtualNode {
            path: path.into(),
            len: 0,
            mtime,
            is_dir: true,
            children: RwLock::new(Vec::new()),
        }))
    }

    pub fn path(&self) -> &Path {
        match self {
            FileNode::Physical(n) => &n.path,
            FileNode::Virtual(n) => &n.path,
        }
    }

    pub fn name(&self) -> String {
        self.path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self, FileNode::Virtual(_))
    }

    pub fn exists(&self) -> bool {
        match self {
            FileNode::Physical(n) => n.stat().exists,
            FileNode::Virtual(_) => true,
        }
    }

    pub fn is_dir(&self) -> bool {
        match self {
            FileNode::Physical(n) => n.stat().is_dir,
            FileNode::Virtual(n) => n.is_dir,
        }
    }

    pub fn is_file(&self) -> bool {
        match self {
            FileNode::Physical(n) => n.stat().is_file,
            FileNode::Virtual(n) => !n.is_dir,
        }
    }

    pub fn len(&self) -> u64 {
        match self {
            FileNode::Physical(n) => n.stat().len,
            FileNode::Virtual(n) => n.len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn modified(&self) -> Option<DateTime<Utc>> {
        match self {
            FileNode::Physical(n) => n.stat().mtime,
            FileNode::Virtual(n) => Some(n.mtime),
        }
    }

    /// Children of a directory node. Physical directories list straight
    /// from the OS (unmemoized; the directory cache batches these);
    /// virtual directories return the accumulated members.
    pub fn children(&self) -> Vec<FileNode> {
        match self {
            FileNode::Physical(n) => match fs::read_dir(&n.path) {
                Ok(entries) => entries
                    .filter_map(|e| e.ok())
                    .map(|e| FileNode::physical(e.path()))
                    .collect(),
                Err(_) => Vec::new(),
            },
            FileNode::Virtual(n) => n.children.read().clone(),
        }
    }

    /// Append a member to a virtual directory; no-op on other nodes.
    pub fn push_child(&self, child: FileNode) {
        if let FileNode::Virtual(n) = self {
            if n.is_dir {
                n.children.write().push(child);
            }
        }
    }
}

impl Serialize for FileNode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.path().to_string_lossy().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FileNode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let path = PathBuf::deserialize(deserializer)?;
        Ok(FileNode::physical(path))
    }
}
