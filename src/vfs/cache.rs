use std::path::{Path, PathBuf};

use dashmap::DashMap;
use tracing::debug;

use crate::vfs::FileNode;

/// Process-wide directory-entry cache: absolute path -> node.
///
/// Constructed once per run and passed by reference to the components that
/// need it. Append-mostly: entries are inserted during preloads and lookups
/// and never removed during a run, so concurrent readers are safe.
#[derive(Debug, Default)]
pub struct DirectoryCache {
    entries: DashMap<PathBuf, FileNode>,
}

impl DirectoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Node for `path`, creating a physical node on first sight.
    pub fn node(&self, path: &Path) -> FileNode {
        if let Some(node) = self.entries.get(path) {
            return node.clone();
        }
        let node = FileNode::physical(path);
        self.entries.insert(path.to_path_buf(), node.clone());
        node
    }

    /// Register a node (virtual nodes from archive expansion land here so
    /// later lookups by path resolve to them rather than to the OS).
    pub fn insert(&self, node: FileNode) {
        self.entries.insert(node.path().to_path_buf(), node);
    }

    /// Preload a directory's entries in one batch, avoiding per-file stat
    /// calls during the scan. Returns the children, cached nodes included.
    pub fn preload(&self, dir: &FileNode) -> Vec<FileNode> {
        let mut children = Vec::new();
        for child in dir.children() {
            let path = child.path().to_path_buf();
            let node = match self.entries.get(&path) {
                Some(existing) => existing.clone(),
                None => {
                    self.entries.insert(path, child.clone());
                    child
                }
            };
            children.push(node);
        }
        debug!(dir = %dir.path().display(), count = children.len(), "preloaded directory");
        children
    }

    /// Whether a file with this exact path exists, answered from the cache
    /// when possible.
    pub fn file_exists(&self, path: &Path) -> bool {
        self.node(path).exists()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn virtual_nodes_win_over_the_os() {
        let cache = DirectoryCache::new();
        let ghost = PathBuf::from("/nowhere/archive/movie.avi");
        cache.insert(FileNode::virtual_file(&ghost, 42, Utc::now()));
        assert!(cache.file_exists(&ghost));
        assert_eq!(cache.node(&ghost).len(), 42);
    }

    #[test]
    fn preload_registers_children() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.mkv"), b"x").unwrap();
        std::fs::write(dir.path().join("b.mkv"), b"xy").unwrap();

        let cache = DirectoryCache::new();
        let children = cache.preload(&FileNode::physical(dir.path()));
        assert_eq!(children.len(), 2);
        assert_eq!(cache.len(), 2);
        assert!(cache.file_exists(&dir.path().join("a.mkv")));
    }
}
