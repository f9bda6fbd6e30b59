//! Test utilities for memtree - small-budget engines and mocks
//!
//! This module provides helpers shared by unit and integration tests:
//! - Engines with budgets small enough to exercise eviction quickly
//! - A scripted summarizer for reorganizer tests
//! - A store wrapper that interferes right after a read, to stage races
//!   between maintenance and foreground edits

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::config::{BackendKind, Config, TierConfig};
use crate::engine::MemoryEngine;
use crate::error::{MemoryError, Result};
use crate::memory::DirEntry;
use crate::path::VirtualPath;
use crate::reorganizer::Summarizer;
use crate::storage::{FileMeta, InMemoryStore, MemoryStore, NodeStat};

/// Config with tiny tier budgets and the in-memory backend
pub fn small_config() -> Config {
    let mut config = Config::default();
    config.storage.backend = BackendKind::Memory;
    config.tiers = TierConfig {
        working_budget_bytes: 256,
        archival_budget_bytes: 1024,
        persona_budget_bytes: 128,
        ..TierConfig::default()
    };
    config.reorganizer.global_budget_bytes = 1024;
    config
}

/// Engine over an in-memory store with [`small_config`] budgets
pub async fn memory_engine() -> Result<MemoryEngine> {
    MemoryEngine::open(&small_config()).await
}

/// Engine over a local store rooted at `dir`, persisting tier metadata there
pub async fn local_engine(dir: &Path) -> Result<MemoryEngine> {
    let mut config = small_config();
    config.storage.backend = BackendKind::Local;
    config.storage.data_dir = dir.to_path_buf();
    MemoryEngine::open(&config).await
}

/// Summarizer returning a fixed reply and recording every call.
///
/// Paths whose display form contains `fail_on` produce a storage error.
#[derive(Debug, Default)]
pub struct MockSummarizer {
    reply: String,
    fail_on: Option<String>,
    calls: Mutex<Vec<String>>,
}

impl MockSummarizer {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            ..Self::default()
        }
    }

    pub fn failing_on(mut self, fragment: impl Into<String>) -> Self {
        self.fail_on = Some(fragment.into());
        self
    }

    /// Paths summarized so far, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Summarizer for MockSummarizer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn summarize(&self, path: &VirtualPath, _content: &str) -> Result<String> {
        let path = path.to_string();
        self.calls.lock().push(path.clone());
        if self.fail_on.as_ref().is_some_and(|f| path.contains(f.as_str())) {
            return Err(MemoryError::Storage(format!("summarizer unavailable for {path}")));
        }
        Ok(self.reply.clone())
    }
}

enum ReadHook {
    Remove,
    Overwrite(String),
    Pause {
        reached: oneshot::Sender<()>,
        resume: oneshot::Receiver<()>,
    },
}

/// Parked read handed out by [`HookedStore::pause_after_read`]
pub struct ReadPause {
    reached: oneshot::Receiver<()>,
    resume: oneshot::Sender<()>,
}

impl ReadPause {
    /// Wait until the hooked read has happened and is parked
    pub async fn reached(&mut self) {
        let _ = (&mut self.reached).await;
    }

    /// Let the parked read return its (now possibly stale) content
    pub fn resume(self) {
        let _ = self.resume.send(());
    }
}

/// Store wrapper that runs a one-shot action after the next read of a path.
///
/// The read still returns what was there before the action, so the reader
/// holds a stale copy exactly as if another writer had raced it.
pub struct HookedStore {
    inner: Arc<dyn MemoryStore>,
    hooks: Mutex<Vec<(VirtualPath, ReadHook)>>,
}

impl Default for HookedStore {
    fn default() -> Self {
        Self::new(Arc::new(InMemoryStore::new()))
    }
}

impl HookedStore {
    pub fn new(inner: Arc<dyn MemoryStore>) -> Self {
        Self {
            inner,
            hooks: Mutex::new(Vec::new()),
        }
    }

    /// Delete `path` right after it is next read
    pub fn remove_after_read(&self, path: &VirtualPath) {
        self.hooks.lock().push((path.clone(), ReadHook::Remove));
    }

    /// Replace the content of `path` right after it is next read
    pub fn overwrite_after_read(&self, path: &VirtualPath, content: impl Into<String>) {
        self.hooks
            .lock()
            .push((path.clone(), ReadHook::Overwrite(content.into())));
    }

    /// Park the next read of `path` until the returned handle is resumed
    pub fn pause_after_read(&self, path: &VirtualPath) -> ReadPause {
        let (reached_tx, reached_rx) = oneshot::channel();
        let (resume_tx, resume_rx) = oneshot::channel();
        self.hooks.lock().push((
            path.clone(),
            ReadHook::Pause {
                reached: reached_tx,
                resume: resume_rx,
            },
        ));
        ReadPause {
            reached: reached_rx,
            resume: resume_tx,
        }
    }

    fn take_hook(&self, path: &VirtualPath) -> Option<ReadHook> {
        let mut hooks = self.hooks.lock();
        let index = hooks.iter().position(|(p, _)| p == path)?;
        Some(hooks.remove(index).1)
    }
}

#[async_trait]
impl MemoryStore for HookedStore {
    fn name(&self) -> &'static str {
        "hooked"
    }

    async fn stat(&self, path: &VirtualPath) -> Result<Option<NodeStat>> {
        self.inner.stat(path).await
    }

    async fn read(&self, path: &VirtualPath) -> Result<String> {
        let content = self.inner.read(path).await?;
        match self.take_hook(path) {
            Some(ReadHook::Remove) => self.inner.remove(path).await?,
            Some(ReadHook::Overwrite(replacement)) => self.inner.write(path, &replacement).await?,
            Some(ReadHook::Pause { reached, resume }) => {
                let _ = reached.send(());
                let _ = resume.await;
            }
            None => {}
        }
        Ok(content)
    }

    async fn write(&self, path: &VirtualPath, content: &str) -> Result<()> {
        self.inner.write(path, content).await
    }

    async fn create_dir_all(&self, path: &VirtualPath) -> Result<()> {
        self.inner.create_dir_all(path).await
    }

    async fn list(&self, path: &VirtualPath) -> Result<Vec<DirEntry>> {
        self.inner.list(path).await
    }

    async fn remove(&self, path: &VirtualPath) -> Result<()> {
        self.inner.remove(path).await
    }

    async fn rename(&self, from: &VirtualPath, to: &VirtualPath) -> Result<()> {
        self.inner.rename(from, to).await
    }

    async fn walk_files(&self, root: &VirtualPath) -> Result<Vec<FileMeta>> {
        self.inner.walk_files(root).await
    }
}
