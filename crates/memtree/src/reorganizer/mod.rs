//! Background reorganizer
//!
//! A periodic maintenance task that runs independently of foreground
//! commands. Each cycle performs, in order:
//!
//! 1. Compaction: merge near-duplicate sibling files
//! 2. Tier migration: demote idle Working entries, promote busy Archival ones
//! 3. Overflow: summarize low-importance Archival entries when the tracked
//!    set exceeds its global budget
//!
//! Per-entry failures are logged and skipped. Cancellation is checked
//! between entries, and every step's mutation is either a single tier table
//! swap or a locked store write, so stopping mid-cycle never leaves a half
//! applied change.

mod compaction;
pub mod summarizer;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ReorganizerConfig;
use crate::engine::MemoryEngine;
use crate::error::{MemoryError, Result};
use crate::memory::provenance::Provenance;
use crate::memory::text;
use crate::memory::types::Tier;
use crate::path::VirtualPath;

pub use summarizer::{ExtractiveSummarizer, Summarizer};

/// Marker inserted before the extension of summary files
const SUMMARY_MARKER: &str = "summary";

/// What one cycle did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub merged: usize,
    pub promoted: usize,
    pub demoted: usize,
    pub summarized: usize,
    /// Entries whose pre-cycle assumptions no longer held
    pub skipped: usize,
    /// Entries that failed with an error
    pub errors: usize,
    /// Idle lock handles dropped at the end of the cycle
    pub locks_pruned: usize,
    pub cancelled: bool,
}

impl CycleReport {
    pub fn changes(&self) -> usize {
        self.merged + self.promoted + self.demoted + self.summarized
    }
}

/// Handle to a spawned reorganizer task
pub struct ReorganizerHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl ReorganizerHandle {
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel the task and wait for it to stop
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.join.await {
            tracing::warn!("Reorganizer task ended abnormally: {}", e);
        }
    }
}

pub struct Reorganizer {
    engine: Arc<MemoryEngine>,
    config: ReorganizerConfig,
    summarizer: Arc<dyn Summarizer>,
}

impl Reorganizer {
    pub fn new(engine: Arc<MemoryEngine>, config: ReorganizerConfig) -> Self {
        let summarizer = Arc::new(ExtractiveSummarizer::new(config.summary_max_lines));
        Self {
            engine,
            config,
            summarizer,
        }
    }

    /// Replace the summary generator
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = summarizer;
        self
    }

    pub fn config(&self) -> &ReorganizerConfig {
        &self.config
    }

    /// Run cycles every `interval_secs` until cancelled
    pub fn spawn(self) -> ReorganizerHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let interval = self.config.interval_secs.max(1);

        let join = tokio::spawn(async move {
            tracing::info!(
                "Reorganizer started (every {}s, summarizer: {})",
                interval,
                self.summarizer.name()
            );
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval));
            // Skip the first immediate tick
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let report = self.run_cycle(&token).await;
                if report.changes() > 0 || report.errors > 0 {
                    tracing::info!(
                        merged = report.merged,
                        promoted = report.promoted,
                        demoted = report.demoted,
                        summarized = report.summarized,
                        skipped = report.skipped,
                        errors = report.errors,
                        "Reorganizer cycle complete"
                    );
                } else {
                    tracing::debug!("Reorganizer cycle complete, nothing to do");
                }
                if report.cancelled {
                    break;
                }
            }
            tracing::info!("Reorganizer stopped");
        });

        ReorganizerHandle { cancel, join }
    }

    pub async fn run_cycle(&self, cancel: &CancellationToken) -> CycleReport {
        self.run_cycle_at(Utc::now(), cancel).await
    }

    /// Run one cycle as of `now`
    pub async fn run_cycle_at(&self, now: DateTime<Utc>, cancel: &CancellationToken) -> CycleReport {
        let mut report = CycleReport::default();

        self.compact(now, cancel, &mut report).await;
        if !report.cancelled {
            self.migrate(now, cancel, &mut report).await;
        }
        if !report.cancelled {
            self.check_overflow(now, cancel, &mut report).await;
        }

        report.locks_pruned = self.engine.locks().prune();
        report
    }

    /// Yield to foreground work, then report whether to stop
    async fn should_stop(cancel: &CancellationToken, report: &mut CycleReport) -> bool {
        tokio::task::yield_now().await;
        if cancel.is_cancelled() {
            report.cancelled = true;
        }
        report.cancelled
    }

    async fn migrate(&self, now: DateTime<Utc>, cancel: &CancellationToken, report: &mut CycleReport) {
        let router = self.engine.router();
        router.refresh_importance(now);
        let idle_limit = Duration::seconds(self.config.demote_after_secs as i64);

        for (path, entry) in router.snapshot() {
            if Self::should_stop(cancel, report).await {
                return;
            }

            match entry.tier {
                Tier::Working if now - entry.last_access > idle_limit => {
                    if router.demote_if_idle(&path, now - idle_limit) {
                        tracing::debug!("Demoted idle {} to archival", path);
                        report.demoted += 1;
                    } else {
                        report.skipped += 1;
                    }
                }
                Tier::Archival => {
                    let windowed = router.windowed_accesses(&path, now);
                    if windowed < self.config.promote_min_accesses {
                        continue;
                    }
                    match self.promote(&path).await {
                        Ok(true) => report.promoted += 1,
                        Ok(false) => report.skipped += 1,
                        Err(e) => {
                            tracing::warn!("Skipping promotion of {}: {}", path, e);
                            report.errors += 1;
                        }
                    }
                }
                _ => {}
            }
        }
    }

    /// Move a busy Archival entry into Working if it fits without eviction
    async fn promote(&self, path: &VirtualPath) -> Result<bool> {
        let _guard = self.engine.locks().lock_shared(path).await;
        let content = self.engine.store().read(path).await?;
        let promoted = self
            .engine
            .router()
            .migrate(path, Tier::Archival, Tier::Working, Some(Arc::from(content)));
        if promoted {
            tracing::debug!("Promoted busy {} to working", path);
        }
        Ok(promoted)
    }

    async fn check_overflow(&self, now: DateTime<Utc>, cancel: &CancellationToken, report: &mut CycleReport) {
        let router = self.engine.router();
        let budget = self.config.global_budget_bytes;
        if router.total_tracked_bytes() <= budget {
            return;
        }

        let mut candidates: Vec<_> = router
            .snapshot()
            .into_iter()
            .filter(|(path, entry)| entry.tier == Tier::Archival && !is_summary(path))
            .collect();
        candidates.sort_by(|a, b| {
            a.1.importance
                .total_cmp(&b.1.importance)
                .then(a.1.last_access.cmp(&b.1.last_access))
        });

        for (path, _) in candidates {
            if router.total_tracked_bytes() <= budget {
                break;
            }
            if Self::should_stop(cancel, report).await {
                return;
            }

            match self.summarize(&path, now).await {
                Ok(true) => report.summarized += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    tracing::warn!("Skipping summarization of {}: {}", path, e);
                    report.errors += 1;
                }
            }
        }
    }

    /// Replace `path` in the tracked set with a summary file.
    ///
    /// The original is read under a shared lock, summarized without any
    /// lock held, and only written back if it is unchanged.
    async fn summarize(&self, path: &VirtualPath, now: DateTime<Utc>) -> Result<bool> {
        let engine = &self.engine;
        let summary_path = summary_path_for(engine, path)?;

        let original = {
            let _guard = engine.locks().lock_shared(path).await;
            engine.store().read(path).await?
        };
        let hash = text::content_hash(&original);

        let summary = self.summarizer.summarize(path, &original).await?;
        if summary.is_empty() || summary.len() >= original.len() {
            tracing::debug!("Summary of {} is not shorter, leaving it tracked", path);
            return Ok(false);
        }

        let _guard = engine.locks().lock_exclusive(&[path, &summary_path]).await;
        let current = match engine.store().read(path).await {
            Ok(current) => current,
            Err(MemoryError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        if text::content_hash(&current) != hash || engine.router().tier_of(path) != Some(Tier::Archival) {
            return Ok(false);
        }
        if engine.store().stat(&summary_path).await?.is_some() {
            tracing::debug!("{} already exists, not overwriting", summary_path);
            return Ok(false);
        }

        engine.store().write(&summary_path, &summary).await?;
        engine.router().untrack(path);
        engine.router().place(&summary_path, &summary, now);
        engine
            .router()
            .record_provenance(Provenance::superseded(path.to_string(), summary_path.to_string(), now));
        Ok(true)
    }
}

/// `notes.md` -> `notes.summary.md`, `notes` -> `notes.summary`
fn summary_name(name: &str) -> String {
    match name.rfind('.') {
        Some(dot) if dot > 0 => format!("{}.{SUMMARY_MARKER}{}", &name[..dot], &name[dot..]),
        _ => format!("{name}.{SUMMARY_MARKER}"),
    }
}

fn summary_path_for(engine: &MemoryEngine, path: &VirtualPath) -> Result<VirtualPath> {
    let (Some(parent), Some(name)) = (path.parent(), path.name()) else {
        return Err(MemoryError::InvalidPath(format!("{path} has no file name")));
    };
    engine.resolver().child(&parent, &summary_name(name))
}

/// Whether a file was produced by summarization
fn is_summary(path: &VirtualPath) -> bool {
    path.name().is_some_and(|name| {
        name.split('.')
            .skip(1)
            .any(|part| part == SUMMARY_MARKER)
    })
}
