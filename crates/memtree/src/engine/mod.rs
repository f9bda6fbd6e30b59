//! Text editing engine
//!
//! Implements the six memory commands over a [`MemoryStore`]. Every raw
//! path is resolved before the store is touched, mutations hold the path
//! lock for their whole read-modify-write, and tier accounting is applied
//! after the store write without being able to fail the command.

pub mod command;
pub mod stats;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;

use crate::cache::{Fetch, TierRouter};
use crate::config::{BackendKind, Config, EditorConfig};
use crate::error::{MemoryError, Result};
use crate::memory::text;
use crate::memory::types::{DirEntry, MemoryFile, NodeKind};
use crate::path::{PathResolver, VirtualPath};
use crate::storage::{InMemoryStore, LockTable, MemoryStore, StoreLock, open_store};

pub use command::{COMMAND_NAMES, Command, CommandOutput};
pub use stats::{EngineStats, StatsSnapshot};

/// Result of viewing a path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    Directory(Vec<DirEntry>),
    /// Text and the 1-indexed line it starts at when a range was requested
    File { content: String, first_line: Option<usize> },
}

pub struct MemoryEngine {
    resolver: PathResolver,
    store: Arc<dyn MemoryStore>,
    router: TierRouter,
    locks: LockTable,
    editor: EditorConfig,
    stats: EngineStats,
    metadata_path: Option<PathBuf>,
    /// Held for the engine's lifetime, released on drop
    _owner: Option<StoreLock>,
}

impl MemoryEngine {
    /// Open the store and tier metadata described by `config`
    ///
    /// A local data directory is claimed for this process; a second opener
    /// fails with `StoreLocked` until the engine is dropped.
    pub async fn open(config: &Config) -> Result<Self> {
        config.validate()?;
        let resolver = PathResolver::new(config.storage.max_segment_len);

        let owner = match config.storage.backend {
            BackendKind::Local => Some(StoreLock::acquire(&config.storage.data_dir)?),
            BackendKind::Memory => None,
        };
        let store = open_store(&config.storage).await?;

        let (router, metadata_path) = match config.storage.backend {
            BackendKind::Local => {
                let path = config.storage.tier_metadata_path();
                let router = TierRouter::load(config.tiers.clone(), &resolver, &path).await;
                (router, Some(path))
            }
            BackendKind::Memory => (TierRouter::new(config.tiers.clone()), None),
        };

        let mut engine = Self::assemble(resolver, store, router, config.editor.clone(), metadata_path).await?;
        engine._owner = owner;
        Ok(engine)
    }

    /// Build an engine over an existing store, with an empty tier table and
    /// no metadata persistence
    pub async fn with_store(store: Arc<dyn MemoryStore>, config: &Config) -> Result<Self> {
        config.validate()?;
        let resolver = PathResolver::new(config.storage.max_segment_len);
        let router = TierRouter::new(config.tiers.clone());
        Self::assemble(resolver, store, router, config.editor.clone(), None).await
    }

    /// Engine over a fresh in-memory store
    pub async fn in_memory(config: &Config) -> Result<Self> {
        Self::with_store(Arc::new(InMemoryStore::new()), config).await
    }

    async fn assemble(
        resolver: PathResolver,
        store: Arc<dyn MemoryStore>,
        router: TierRouter,
        editor: EditorConfig,
        metadata_path: Option<PathBuf>,
    ) -> Result<Self> {
        store.create_dir_all(&VirtualPath::root()).await?;
        tracing::info!("Memory engine ready on {} store", store.name());
        Ok(Self {
            resolver,
            store,
            router,
            locks: LockTable::new(),
            editor,
            stats: EngineStats::default(),
            metadata_path,
            _owner: None,
        })
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn store(&self) -> &Arc<dyn MemoryStore> {
        &self.store
    }

    pub fn router(&self) -> &TierRouter {
        &self.router
    }

    pub fn locks(&self) -> &LockTable {
        &self.locks
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Resolve a raw caller path against the sandbox root
    pub fn resolve(&self, raw: &str) -> Result<VirtualPath> {
        self.resolver.resolve(raw)
    }

    /// Run a decoded command
    pub async fn dispatch(&self, command: Command) -> Result<CommandOutput> {
        let name = command.name();
        self.stats.record_command(name);

        let result = match command {
            Command::View { path, view_range } => {
                let range = view_range.map(|[start, end]| (start, end));
                let view = self.view(&path, range).await;
                view.and_then(|view| {
                    let path = self.resolve(&path)?.to_string();
                    Ok(match view {
                        View::Directory(entries) => CommandOutput::Directory { path, entries },
                        View::File { content, first_line } => CommandOutput::File {
                            path,
                            content,
                            first_line,
                        },
                    })
                })
            }
            Command::Create { path, file_text } => self
                .create(&path, &file_text)
                .await
                .map(|p| CommandOutput::Created { path: p.to_string() }),
            Command::StrReplace {
                path,
                old_str,
                new_str,
            } => self
                .str_replace(&path, &old_str, &new_str)
                .await
                .map(|p| CommandOutput::Replaced { path: p.to_string() }),
            Command::Insert {
                path,
                insert_line,
                insert_text,
            } => self
                .insert(&path, insert_line, &insert_text)
                .await
                .map(|p| CommandOutput::Inserted {
                    path: p.to_string(),
                    line: insert_line,
                }),
            Command::Delete { path } => self.delete(&path).await.map(|(p, kind)| CommandOutput::Deleted {
                path: p.to_string(),
                kind,
            }),
            Command::Rename { old_path, new_path } => {
                self.rename(&old_path, &new_path)
                    .await
                    .map(|(from, to)| CommandOutput::Renamed {
                        from: from.to_string(),
                        to: to.to_string(),
                    })
            }
        };

        if let Err(e) = &result {
            self.stats.record_failure();
            tracing::debug!("{} failed: {}", name, e);
        }
        result
    }

    /// Decode a JSON tool call and run it
    pub async fn dispatch_json(&self, input: &str) -> Result<CommandOutput> {
        let command = Command::from_json(input).inspect_err(|_| self.stats.record_failure())?;
        self.dispatch(command).await
    }

    /// List a directory, or read a file (optionally lines `start..=end`)
    #[tracing::instrument(skip(self), name = "memory.view")]
    pub async fn view(&self, raw: &str, range: Option<(usize, usize)>) -> Result<View> {
        let path = self.resolve(raw)?;
        if let Some((start, end)) = range {
            text::validate_range(start, end)?;
        }

        let _guard = self.locks.lock_shared(&path).await;

        let content = match self.router.fetch(&path) {
            Fetch::Hit { content, .. } => {
                self.stats.record_cache(true);
                content.to_string()
            }
            Fetch::Miss { tier } => {
                let Some(stat) = self.store.stat(&path).await? else {
                    if tier.is_some() {
                        tracing::debug!("Dropping stale tier entry for missing {}", path);
                        self.router.untrack(&path);
                    }
                    return Err(MemoryError::NotFound(path.to_string()));
                };
                if stat.is_dir() {
                    if tier.is_some() {
                        self.router.untrack(&path);
                    }
                    return Ok(View::Directory(self.store.list(&path).await?));
                }
                self.stats.record_cache(false);
                self.store.read(&path).await?
            }
        };

        self.router.record_access(&path, &content, Utc::now());

        match range {
            Some((start, end)) => Ok(View::File {
                content: text::select_lines(&content, start, end)?,
                first_line: Some(start),
            }),
            None => Ok(View::File {
                content,
                first_line: None,
            }),
        }
    }

    /// Read a file with its store metadata and tier, without counting an access
    pub async fn file(&self, raw: &str) -> Result<MemoryFile> {
        let path = self.resolve(raw)?;
        let _guard = self.locks.lock_shared(&path).await;

        let stat = self
            .store
            .stat(&path)
            .await?
            .ok_or_else(|| MemoryError::NotFound(path.to_string()))?;
        if stat.is_dir() {
            return Err(MemoryError::IsADirectory(path.to_string()));
        }
        let content = self.store.read(&path).await?;
        Ok(MemoryFile::new(&path, content, stat.modified, self.router.tier_of(&path)))
    }

    /// Create or overwrite a file, creating missing parents
    #[tracing::instrument(skip(self, file_text), name = "memory.create")]
    pub async fn create(&self, raw: &str, file_text: &str) -> Result<VirtualPath> {
        let path = self.resolve(raw)?;
        if path.is_root() {
            return Err(MemoryError::IsADirectory(path.to_string()));
        }
        self.router.check_admission(&path, file_text.len() as u64)?;

        let _guard = self.locks.lock_exclusive(&[&path]).await;
        self.store.write(&path, file_text).await?;
        self.router.clear_superseded(&path);
        self.router.place(&path, file_text, Utc::now());

        tracing::debug!("Created {} ({} bytes)", path, file_text.len());
        Ok(path)
    }

    /// Replace the single occurrence of `old` with `new`
    #[tracing::instrument(skip(self, old, new), name = "memory.str_replace")]
    pub async fn str_replace(&self, raw: &str, old: &str, new: &str) -> Result<VirtualPath> {
        let path = self.resolve(raw)?;
        let _guard = self.locks.lock_exclusive(&[&path]).await;

        let content = self.store.read(&path).await?;
        let updated = text::replace_unique(&path.to_string(), &content, old, new)?;
        self.commit_edit(&path, &updated).await?;
        Ok(path)
    }

    /// Insert `text` as a new line after line `line` (0 = top)
    #[tracing::instrument(skip(self, text), name = "memory.insert")]
    pub async fn insert(&self, raw: &str, line: usize, text: &str) -> Result<VirtualPath> {
        let path = self.resolve(raw)?;
        let _guard = self.locks.lock_exclusive(&[&path]).await;

        let content = self.store.read(&path).await?;
        let updated = text::insert_after_line(&content, line, text)?;
        self.commit_edit(&path, &updated).await?;
        Ok(path)
    }

    /// Write edited content under an already-held exclusive lock
    async fn commit_edit(&self, path: &VirtualPath, updated: &str) -> Result<()> {
        self.router.check_admission(path, updated.len() as u64)?;
        self.store.write(path, updated).await?;
        self.router.place(path, updated, Utc::now());
        Ok(())
    }

    /// Remove a file, or a directory with its subtree
    #[tracing::instrument(skip(self), name = "memory.delete")]
    pub async fn delete(&self, raw: &str) -> Result<(VirtualPath, NodeKind)> {
        let path = self.resolve(raw)?;
        if path.is_root() {
            return Err(MemoryError::InvalidPath(
                "cannot delete the root memories directory".to_string(),
            ));
        }

        let _guard = self.locks.lock_exclusive(&[&path]).await;
        let stat = self
            .store
            .stat(&path)
            .await?
            .ok_or_else(|| MemoryError::NotFound(path.to_string()))?;

        if stat.is_dir() && !self.editor.cascade_delete && !self.store.list(&path).await?.is_empty() {
            return Err(MemoryError::DirectoryNotEmpty(path.to_string()));
        }

        self.store.remove(&path).await?;
        let forgotten = self.router.forget_subtree(&path);
        tracing::debug!("Deleted {} ({} tracked entries dropped)", path, forgotten);
        Ok((path, stat.kind))
    }

    /// Move a file or subtree; never overwrites
    #[tracing::instrument(skip(self), name = "memory.rename")]
    pub async fn rename(&self, old_raw: &str, new_raw: &str) -> Result<(VirtualPath, VirtualPath)> {
        let from = self.resolve(old_raw)?;
        let to = self.resolve(new_raw)?;
        if from.is_root() || to.is_root() {
            return Err(MemoryError::InvalidPath(
                "cannot rename the root memories directory".to_string(),
            ));
        }

        let _guard = self.locks.lock_exclusive(&[&from, &to]).await;
        if self.store.stat(&from).await?.is_none() {
            return Err(MemoryError::NotFound(from.to_string()));
        }
        if self.store.stat(&to).await?.is_some() {
            return Err(MemoryError::AlreadyExists(to.to_string()));
        }
        if to.starts_with(&from) {
            return Err(MemoryError::InvalidPath(format!(
                "cannot move {from} into its own subtree"
            )));
        }

        self.store.rename(&from, &to).await?;
        self.router.rename_subtree(&from, &to);
        tracing::debug!("Renamed {} to {}", from, to);
        Ok((from, to))
    }

    /// Persist tier metadata if this engine has a metadata file
    pub async fn save_metadata(&self) -> Result<()> {
        match &self.metadata_path {
            Some(path) => self.router.save(path).await,
            None => Ok(()),
        }
    }
}
