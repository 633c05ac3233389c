//! Virtual filesystem: archive members and disc structures exposed as
//! ordinary file-like nodes.
//!
//! Upstream code (the directory scanner, enrichment) only ever sees
//! [`FileNode`] values and never special-cases container formats. Archive
//! expansion is pluggable through [`ArchiveScanner`].

mod cache;
mod node;
pub mod rar;

use std::path::Path;

pub use cache::DirectoryCache;
pub use node::FileNode;
pub use rar::RarArchiveScanner;

/// An archive expander plugin.
///
/// Given a directory and the mutable list of candidate filenames found in
/// it, the plugin returns virtual nodes for every archive it could expand
/// and removes from the list each filename it consumed. Names left in the
/// list fall through to normal flat-file handling.
pub trait ArchiveScanner: Send + Sync {
    fn scan(&self, dir: &Path, candidates: &mut Vec<String>) -> Vec<FileNode>;
}

/// Runs the configured archive scanners over a directory's entries.
pub struct VirtualFileSystem {
    scanners: Vec<Box<dyn ArchiveScanner>>,
}

impl VirtualFileSystem {
    pub fn new(scanners: Vec<Box<dyn ArchiveScanner>>) -> Self {
        Self { scanners }
    }

    /// Expand archives among `names`, registering produced virtual nodes
    /// in the directory cache. Consumed names are removed from `names`.
    pub fn expand(&self, dir: &Path, names: &mut Vec<String>, cache: &DirectoryCache) -> Vec<FileNode> {
        let mut produced = Vec::new();
        for scanner in &self.scanners {
            for node in scanner.scan(dir, names) {
                register_tree(&node, cache);
                produced.push(node);
            }
        }
        produced
    }
}

fn register_tree(node: &FileNode, cache: &DirectoryCache) {
    cache.insert(node.clone());
    if node.is_dir() {
        for child in node.children() {
            register_tree(&child, cache);
        }
    }
}
