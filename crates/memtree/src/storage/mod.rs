//! Backing store of record for memory files
//!
//! The store owns file content. Everything above it (engine, tier router,
//! reorganizer) addresses nodes by already-resolved [`VirtualPath`]s and
//! picks an implementation once at construction time.

pub mod local;
pub mod lockfile;
pub mod locks;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::{BackendKind, StorageConfig};
use crate::error::Result;
use crate::memory::types::{DirEntry, NodeKind};
use crate::path::VirtualPath;

pub use local::LocalStore;
pub use lockfile::StoreLock;
pub use locks::{LockTable, PathGuard};
pub use memory::InMemoryStore;

/// Metadata for a single node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeStat {
    pub kind: NodeKind,
    /// Content size for files, 0 for directories
    pub size_bytes: u64,
    pub modified: DateTime<Utc>,
}

impl NodeStat {
    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }
}

/// A file found by [`MemoryStore::walk_files`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub path: VirtualPath,
    pub size_bytes: u64,
    pub modified: DateTime<Utc>,
}

/// Storage backend for the memory tree.
///
/// Implementations must make `write` and `rename` atomic: a concurrent or
/// subsequent reader sees either the old state or the new one, never a
/// partial file.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Short backend name for logs and stats
    fn name(&self) -> &'static str;

    /// Stat a node, `None` if it does not exist
    async fn stat(&self, path: &VirtualPath) -> Result<Option<NodeStat>>;

    /// Read a file's full text
    async fn read(&self, path: &VirtualPath) -> Result<String>;

    /// Create or replace a file, creating missing parent directories
    async fn write(&self, path: &VirtualPath, content: &str) -> Result<()>;

    /// Create a directory and any missing parents
    async fn create_dir_all(&self, path: &VirtualPath) -> Result<()>;

    /// List a directory's children sorted by name
    async fn list(&self, path: &VirtualPath) -> Result<Vec<DirEntry>>;

    /// Remove a file or a directory with its whole subtree
    async fn remove(&self, path: &VirtualPath) -> Result<()>;

    /// Move a file or subtree; fails if the destination exists
    async fn rename(&self, from: &VirtualPath, to: &VirtualPath) -> Result<()>;

    /// Every file at or below `root`, sorted by path
    async fn walk_files(&self, root: &VirtualPath) -> Result<Vec<FileMeta>>;
}

/// Open the backend selected in the storage config
pub async fn open_store(config: &StorageConfig) -> Result<Arc<dyn MemoryStore>> {
    match config.backend {
        BackendKind::Local => {
            let store = LocalStore::open(config.memories_dir()).await?;
            Ok(Arc::new(store))
        }
        BackendKind::Memory => Ok(Arc::new(InMemoryStore::new())),
    }
}
