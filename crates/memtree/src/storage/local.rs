//! Local filesystem store
//!
//! The virtual tree is mirrored one-to-one under a root directory: each
//! memory file is a regular file, each directory a real directory.
//! Symbolic links are never followed; meeting one on the way to a node is a
//! sandbox violation.

use std::fs::Metadata;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use uuid::Uuid;

use super::{FileMeta, MemoryStore, NodeStat};
use crate::error::{MemoryError, Result};
use crate::memory::types::{DirEntry, NodeKind};
use crate::path::{RESERVED_PREFIX, VirtualPath};

/// What lies at a virtual path on disk
enum Lookup {
    Missing,
    /// A proper ancestor is a regular file
    UnderFile(VirtualPath),
    File(Metadata),
    Dir(Metadata),
}

/// Store rooted at a directory on the local filesystem
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Open (and create if needed) a store rooted at `root`
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root: PathBuf = root.into();
        fs::create_dir_all(&root).await.map_err(|e| {
            MemoryError::Storage(format!(
                "Failed to create store root {}: {}",
                root.display(),
                e
            ))
        })?;
        let root = fs::canonicalize(&root).await?;
        tracing::debug!("Opened local store at {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, path: &VirtualPath) -> PathBuf {
        self.root.join(path.to_relative_path())
    }

    /// Walk the path component by component without following links.
    async fn lookup(&self, path: &VirtualPath) -> Result<Lookup> {
        let segments = path.segments();
        let mut current = self.root.clone();
        let mut virt = VirtualPath::root();
        let mut meta = fs::symlink_metadata(&current).await?;

        for segment in segments {
            if !meta.is_dir() {
                return Ok(Lookup::UnderFile(virt));
            }
            current.push(segment);
            virt = virt.join(segment);
            meta = match fs::symlink_metadata(&current).await {
                Ok(meta) => meta,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Lookup::Missing),
                Err(e) => return Err(e.into()),
            };
            if meta.file_type().is_symlink() {
                return Err(MemoryError::SandboxViolation(virt.to_string()));
            }
        }

        if meta.is_dir() {
            Ok(Lookup::Dir(meta))
        } else {
            Ok(Lookup::File(meta))
        }
    }

    /// Ensure the parent chain of `path` can hold a new node
    async fn prepare_parent(&self, path: &VirtualPath) -> Result<()> {
        let Some(parent) = path.parent() else {
            return Ok(());
        };
        match self.lookup(&parent).await? {
            Lookup::Dir(_) => Ok(()),
            Lookup::File(_) => Err(MemoryError::NotADirectory(parent.to_string())),
            Lookup::UnderFile(file) => Err(MemoryError::NotADirectory(file.to_string())),
            Lookup::Missing => {
                fs::create_dir_all(self.full_path(&parent)).await?;
                Ok(())
            }
        }
    }
}

fn modified_at(meta: &Metadata) -> DateTime<Utc> {
    meta.modified().map(DateTime::<Utc>::from).unwrap_or_else(|_| Utc::now())
}

fn is_reserved(name: &str) -> bool {
    name.starts_with(RESERVED_PREFIX)
}

#[async_trait]
impl MemoryStore for LocalStore {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn stat(&self, path: &VirtualPath) -> Result<Option<NodeStat>> {
        Ok(match self.lookup(path).await? {
            Lookup::File(meta) => Some(NodeStat {
                kind: NodeKind::File,
                size_bytes: meta.len(),
                modified: modified_at(&meta),
            }),
            Lookup::Dir(meta) => Some(NodeStat {
                kind: NodeKind::Directory,
                size_bytes: 0,
                modified: modified_at(&meta),
            }),
            Lookup::Missing | Lookup::UnderFile(_) => None,
        })
    }

    async fn read(&self, path: &VirtualPath) -> Result<String> {
        match self.lookup(path).await? {
            Lookup::File(_) => {
                let bytes = fs::read(self.full_path(path)).await?;
                String::from_utf8(bytes)
                    .map_err(|_| MemoryError::Storage(format!("{path} is not valid UTF-8")))
            }
            Lookup::Dir(_) => Err(MemoryError::IsADirectory(path.to_string())),
            Lookup::Missing | Lookup::UnderFile(_) => Err(MemoryError::NotFound(path.to_string())),
        }
    }

    async fn write(&self, path: &VirtualPath, content: &str) -> Result<()> {
        match self.lookup(path).await? {
            Lookup::Dir(_) => return Err(MemoryError::IsADirectory(path.to_string())),
            Lookup::UnderFile(file) => return Err(MemoryError::NotADirectory(file.to_string())),
            Lookup::File(_) | Lookup::Missing => {}
        }
        self.prepare_parent(path).await?;

        let target = self.full_path(path);
        let tmp = match target.parent() {
            Some(dir) => dir.join(format!("{RESERVED_PREFIX}tmp-{}", Uuid::new_v4())),
            None => return Err(MemoryError::InvalidPath(path.to_string())),
        };

        fs::write(&tmp, content).await?;
        if let Err(e) = fs::rename(&tmp, &target).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn create_dir_all(&self, path: &VirtualPath) -> Result<()> {
        match self.lookup(path).await? {
            Lookup::Dir(_) => Ok(()),
            Lookup::File(_) => Err(MemoryError::NotADirectory(path.to_string())),
            Lookup::UnderFile(file) => Err(MemoryError::NotADirectory(file.to_string())),
            Lookup::Missing => {
                fs::create_dir_all(self.full_path(path)).await?;
                Ok(())
            }
        }
    }

    async fn list(&self, path: &VirtualPath) -> Result<Vec<DirEntry>> {
        match self.lookup(path).await? {
            Lookup::Dir(_) => {}
            Lookup::File(_) => return Err(MemoryError::NotADirectory(path.to_string())),
            Lookup::Missing | Lookup::UnderFile(_) => {
                return Err(MemoryError::NotFound(path.to_string()));
            }
        }

        let mut entries = Vec::new();
        let mut dir = fs::read_dir(self.full_path(path)).await?;
        while let Some(entry) = dir.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if is_reserved(&name) {
                continue;
            }
            let file_type = entry.file_type().await?;
            if file_type.is_symlink() {
                continue;
            }
            let (kind, size_bytes) = if file_type.is_dir() {
                (NodeKind::Directory, 0)
            } else {
                (NodeKind::File, entry.metadata().await?.len())
            };
            entries.push(DirEntry {
                name,
                kind,
                size_bytes,
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn remove(&self, path: &VirtualPath) -> Result<()> {
        let full = self.full_path(path);
        match self.lookup(path).await? {
            Lookup::Dir(_) => fs::remove_dir_all(&full).await?,
            Lookup::File(_) => fs::remove_file(&full).await?,
            Lookup::Missing | Lookup::UnderFile(_) => {
                return Err(MemoryError::NotFound(path.to_string()));
            }
        }
        Ok(())
    }

    async fn rename(&self, from: &VirtualPath, to: &VirtualPath) -> Result<()> {
        if matches!(
            self.lookup(from).await?,
            Lookup::Missing | Lookup::UnderFile(_)
        ) {
            return Err(MemoryError::NotFound(from.to_string()));
        }
        match self.lookup(to).await? {
            Lookup::File(_) | Lookup::Dir(_) => {
                return Err(MemoryError::AlreadyExists(to.to_string()));
            }
            Lookup::UnderFile(file) => return Err(MemoryError::NotADirectory(file.to_string())),
            Lookup::Missing => {}
        }
        if to.starts_with(from) {
            return Err(MemoryError::InvalidPath(format!(
                "cannot move {from} into its own subtree"
            )));
        }
        self.prepare_parent(to).await?;
        fs::rename(self.full_path(from), self.full_path(to)).await?;
        Ok(())
    }

    async fn walk_files(&self, root: &VirtualPath) -> Result<Vec<FileMeta>> {
        match self.lookup(root).await? {
            Lookup::Dir(_) | Lookup::File(_) => {}
            Lookup::Missing | Lookup::UnderFile(_) => return Ok(Vec::new()),
        }

        let base = self.root.clone();
        let start = self.full_path(root);
        let files = tokio::task::spawn_blocking(move || {
            let mut files = Vec::new();
            for entry in walkdir::WalkDir::new(&start).follow_links(false) {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        tracing::warn!("Skipping unreadable entry during walk: {}", e);
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }
                let Ok(relative) = entry.path().strip_prefix(&base) else {
                    continue;
                };

                let mut path = VirtualPath::root();
                let mut valid = true;
                for component in relative.components() {
                    match component.as_os_str().to_str() {
                        Some(name) if !is_reserved(name) => path = path.join(name),
                        _ => {
                            valid = false;
                            break;
                        }
                    }
                }
                if !valid {
                    continue;
                }

                let Ok(meta) = entry.metadata() else {
                    continue;
                };
                files.push(FileMeta {
                    path,
                    size_bytes: meta.len(),
                    modified: modified_at(&meta),
                });
            }
            files.sort_by(|a, b| a.path.cmp(&b.path));
            files
        })
        .await
        .map_err(|e| MemoryError::Storage(format!("Walk task failed: {e}")))?;

        Ok(files)
    }
}
