//! Ephemeral in-process store
//!
//! Nodes live in a `BTreeMap` keyed by [`VirtualPath`]. Because paths sort
//! segment-wise, a subtree is always a contiguous key range starting at its
//! root, which keeps listing, removal and rename cheap.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::{FileMeta, MemoryStore, NodeStat};
use crate::error::{MemoryError, Result};
use crate::memory::types::{DirEntry, NodeKind};
use crate::path::VirtualPath;

#[derive(Debug, Clone)]
enum Node {
    File {
        content: String,
        modified: DateTime<Utc>,
    },
    Directory {
        modified: DateTime<Utc>,
    },
}

impl Node {
    fn stat(&self) -> NodeStat {
        match self {
            Node::File { content, modified } => NodeStat {
                kind: NodeKind::File,
                size_bytes: content.len() as u64,
                modified: *modified,
            },
            Node::Directory { modified } => NodeStat {
                kind: NodeKind::Directory,
                size_bytes: 0,
                modified: *modified,
            },
        }
    }
}

/// In-memory store. Thread-safe via an internal `RwLock`; all data is lost
/// when dropped.
#[derive(Debug)]
pub struct InMemoryStore {
    nodes: RwLock<BTreeMap<VirtualPath, Node>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Create an empty tree holding only the root directory
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            VirtualPath::root(),
            Node::Directory {
                modified: Utc::now(),
            },
        );
        Self {
            nodes: RwLock::new(nodes),
        }
    }

    /// Ensure every proper ancestor of `path` is a directory, creating the
    /// missing ones
    fn ensure_parents(nodes: &mut BTreeMap<VirtualPath, Node>, path: &VirtualPath) -> Result<()> {
        for ancestor in path.ancestors() {
            match nodes.get(&ancestor) {
                Some(Node::Directory { .. }) => {}
                Some(Node::File { .. }) => {
                    return Err(MemoryError::NotADirectory(ancestor.to_string()));
                }
                None => {
                    nodes.insert(
                        ancestor,
                        Node::Directory {
                            modified: Utc::now(),
                        },
                    );
                }
            }
        }
        Ok(())
    }

    fn subtree_keys(nodes: &BTreeMap<VirtualPath, Node>, root: &VirtualPath) -> Vec<VirtualPath> {
        nodes
            .range(root.clone()..)
            .take_while(|(k, _)| k.starts_with(root))
            .map(|(k, _)| k.clone())
            .collect()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn stat(&self, path: &VirtualPath) -> Result<Option<NodeStat>> {
        Ok(self.nodes.read().get(path).map(Node::stat))
    }

    async fn read(&self, path: &VirtualPath) -> Result<String> {
        match self.nodes.read().get(path) {
            Some(Node::File { content, .. }) => Ok(content.clone()),
            Some(Node::Directory { .. }) => Err(MemoryError::IsADirectory(path.to_string())),
            None => Err(MemoryError::NotFound(path.to_string())),
        }
    }

    async fn write(&self, path: &VirtualPath, content: &str) -> Result<()> {
        let mut nodes = self.nodes.write();
        if matches!(nodes.get(path), Some(Node::Directory { .. })) {
            return Err(MemoryError::IsADirectory(path.to_string()));
        }
        Self::ensure_parents(&mut nodes, path)?;
        nodes.insert(
            path.clone(),
            Node::File {
                content: content.to_string(),
                modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn create_dir_all(&self, path: &VirtualPath) -> Result<()> {
        let mut nodes = self.nodes.write();
        match nodes.get(path) {
            Some(Node::Directory { .. }) => return Ok(()),
            Some(Node::File { .. }) => return Err(MemoryError::NotADirectory(path.to_string())),
            None => {}
        }
        Self::ensure_parents(&mut nodes, path)?;
        nodes.insert(
            path.clone(),
            Node::Directory {
                modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn list(&self, path: &VirtualPath) -> Result<Vec<DirEntry>> {
        let nodes = self.nodes.read();
        match nodes.get(path) {
            Some(Node::Directory { .. }) => {}
            Some(Node::File { .. }) => return Err(MemoryError::NotADirectory(path.to_string())),
            None => return Err(MemoryError::NotFound(path.to_string())),
        }

        let depth = path.depth() + 1;
        let entries = nodes
            .range(path.clone()..)
            .take_while(|(k, _)| k.starts_with(path))
            .filter(|(k, _)| k.depth() == depth)
            .filter_map(|(k, node)| {
                let stat = node.stat();
                k.name().map(|name| DirEntry {
                    name: name.to_string(),
                    kind: stat.kind,
                    size_bytes: stat.size_bytes,
                })
            })
            .collect();
        Ok(entries)
    }

    async fn remove(&self, path: &VirtualPath) -> Result<()> {
        let mut nodes = self.nodes.write();
        let keys = Self::subtree_keys(&nodes, path);
        if keys.is_empty() {
            return Err(MemoryError::NotFound(path.to_string()));
        }
        for key in keys {
            nodes.remove(&key);
        }
        Ok(())
    }

    async fn rename(&self, from: &VirtualPath, to: &VirtualPath) -> Result<()> {
        let mut nodes = self.nodes.write();
        if !nodes.contains_key(from) {
            return Err(MemoryError::NotFound(from.to_string()));
        }
        if nodes.contains_key(to) {
            return Err(MemoryError::AlreadyExists(to.to_string()));
        }
        if to.starts_with(from) {
            return Err(MemoryError::InvalidPath(format!(
                "cannot move {from} into its own subtree"
            )));
        }
        Self::ensure_parents(&mut nodes, to)?;

        for key in Self::subtree_keys(&nodes, from) {
            if let (Some(node), Some(target)) = (nodes.remove(&key), key.rebase(from, to)) {
                nodes.insert(target, node);
            }
        }
        Ok(())
    }

    async fn walk_files(&self, root: &VirtualPath) -> Result<Vec<FileMeta>> {
        let nodes = self.nodes.read();
        let files = nodes
            .range(root.clone()..)
            .take_while(|(k, _)| k.starts_with(root))
            .filter_map(|(k, node)| match node {
                Node::File { content, modified } => Some(FileMeta {
                    path: k.clone(),
                    size_bytes: content.len() as u64,
                    modified: *modified,
                }),
                Node::Directory { .. } => None,
            })
            .collect();
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::path::PathResolver;

    fn p(raw: &str) -> VirtualPath {
        PathResolver::default().resolve(raw).unwrap()
    }

    #[tokio::test]
    async fn test_write_creates_parents() {
        let store = InMemoryStore::new();
        store.write(&p("a/b/c.md"), "hello").await.unwrap();

        assert!(store.stat(&p("a")).await.unwrap().unwrap().is_dir());
        assert!(store.stat(&p("a/b")).await.unwrap().unwrap().is_dir());
        assert_eq!(store.read(&p("a/b/c.md")).await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_write_under_file_is_not_a_directory() {
        let store = InMemoryStore::new();
        store.write(&p("a"), "file").await.unwrap();
        let err = store.write(&p("a/b"), "x").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotADirectory);
    }

    #[tokio::test]
    async fn test_write_over_directory_fails() {
        let store = InMemoryStore::new();
        store.create_dir_all(&p("dir")).await.unwrap();
        let err = store.write(&p("dir"), "x").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IsADirectory);
    }

    #[tokio::test]
    async fn test_list_only_direct_children() {
        let store = InMemoryStore::new();
        store.write(&p("notes/b.md"), "bb").await.unwrap();
        store.write(&p("notes/a.md"), "a").await.unwrap();
        store.write(&p("notes/sub/deep.md"), "deep").await.unwrap();
        store.write(&p("notesX.md"), "sibling").await.unwrap();

        let entries = store.list(&p("notes")).await.unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["a.md", "b.md", "sub"]);
        assert_eq!(entries[1].size_bytes, 2);
        assert_eq!(entries[2].kind, NodeKind::Directory);
    }

    #[tokio::test]
    async fn test_remove_subtree() {
        let store = InMemoryStore::new();
        store.write(&p("x/1"), "1").await.unwrap();
        store.write(&p("x/y/2"), "2").await.unwrap();
        store.write(&p("xy"), "keep").await.unwrap();

        store.remove(&p("x")).await.unwrap();
        assert!(store.stat(&p("x")).await.unwrap().is_none());
        assert!(store.stat(&p("x/y/2")).await.unwrap().is_none());
        assert!(store.stat(&p("xy")).await.unwrap().is_some());

        let err = store.remove(&p("x")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_rename_moves_subtree() {
        let store = InMemoryStore::new();
        store.write(&p("src/a.md"), "a").await.unwrap();
        store.write(&p("src/deep/b.md"), "b").await.unwrap();

        store.rename(&p("src"), &p("dst/moved")).await.unwrap();

        assert!(store.stat(&p("src")).await.unwrap().is_none());
        assert_eq!(store.read(&p("dst/moved/a.md")).await.unwrap(), "a");
        assert_eq!(store.read(&p("dst/moved/deep/b.md")).await.unwrap(), "b");
    }

    #[tokio::test]
    async fn test_rename_refuses_existing_destination() {
        let store = InMemoryStore::new();
        store.write(&p("a"), "a").await.unwrap();
        store.write(&p("b"), "b").await.unwrap();

        let err = store.rename(&p("a"), &p("b")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(store.read(&p("a")).await.unwrap(), "a");
        assert_eq!(store.read(&p("b")).await.unwrap(), "b");
    }

    #[tokio::test]
    async fn test_walk_files_sorted() {
        let store = InMemoryStore::new();
        store.write(&p("b.md"), "bb").await.unwrap();
        store.write(&p("a/z.md"), "z").await.unwrap();
        store.create_dir_all(&p("empty")).await.unwrap();

        let files = store.walk_files(&VirtualPath::root()).await.unwrap();
        let paths: Vec<String> = files.iter().map(|f| f.path.to_string()).collect();
        assert_eq!(paths, ["/memories/a/z.md", "/memories/b.md"]);
    }
}
