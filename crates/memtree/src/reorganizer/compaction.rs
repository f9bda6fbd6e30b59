use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use super::{CycleReport, Reorganizer, is_summary};
use crate::error::{MemoryError, Result};
use crate::memory::provenance::{Provenance, ProvenanceKind};
use crate::memory::text;
use crate::path::VirtualPath;
use crate::storage::FileMeta;

/// A file captured at cycle start
struct Candidate {
    path: VirtualPath,
    content: String,
    hash: String,
}

impl Reorganizer {
    /// Merge near-duplicate files that share a directory.
    ///
    /// Siblings always share a namespace, so grouping by parent never
    /// merges across tenants. Within a group the older file absorbs the
    /// newer one.
    pub(super) async fn compact(&self, now: DateTime<Utc>, cancel: &CancellationToken, report: &mut CycleReport) {
        let files = match self.engine.store().walk_files(&VirtualPath::root()).await {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!("Compaction skipped, failed to walk store: {}", e);
                report.errors += 1;
                return;
            }
        };

        let superseded: HashSet<String> = self
            .engine
            .router()
            .provenance()
            .into_iter()
            .filter(|record| matches!(record.kind, ProvenanceKind::Superseded { .. }))
            .map(|record| record.path)
            .collect();

        let mut groups: BTreeMap<VirtualPath, Vec<FileMeta>> = BTreeMap::new();
        for meta in files {
            if is_summary(&meta.path) || superseded.contains(&meta.path.to_string()) {
                continue;
            }
            if let Some(parent) = meta.path.parent() {
                groups.entry(parent).or_default().push(meta);
            }
        }

        for (dir, mut metas) in groups {
            if metas.len() < 2 {
                continue;
            }
            if Self::should_stop(cancel, report).await {
                return;
            }
            metas.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));
            tracing::trace!("Comparing {} files in {}", metas.len(), dir);
            self.compact_group(metas, now, cancel, report).await;
            if report.cancelled {
                return;
            }
        }
    }

    async fn compact_group(
        &self,
        metas: Vec<FileMeta>,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
        report: &mut CycleReport,
    ) {
        let mut candidates = Vec::with_capacity(metas.len());
        for meta in metas {
            match self.engine.store().read(&meta.path).await {
                Ok(content) => {
                    let hash = text::content_hash(&content);
                    candidates.push(Candidate {
                        path: meta.path,
                        content,
                        hash,
                    });
                }
                Err(MemoryError::NotFound(_)) => report.skipped += 1,
                Err(e) => {
                    tracing::warn!("Skipping {} during compaction: {}", meta.path, e);
                    report.errors += 1;
                }
            }
        }

        let threshold = self.config.similarity_threshold;
        let mut absorbed = vec![false; candidates.len()];

        for keep in 0..candidates.len() {
            if absorbed[keep] {
                continue;
            }
            for drop in keep + 1..candidates.len() {
                if absorbed[drop] {
                    continue;
                }
                let similarity = text::line_similarity(&candidates[keep].content, &candidates[drop].content);
                if similarity < threshold {
                    continue;
                }
                if Self::should_stop(cancel, report).await {
                    return;
                }

                match self.merge_pair(&candidates[keep], &candidates[drop], now).await {
                    Ok(Some(merged)) => {
                        report.merged += 1;
                        absorbed[drop] = true;
                        candidates[keep].hash = text::content_hash(&merged);
                        candidates[keep].content = merged;
                    }
                    Ok(None) => report.skipped += 1,
                    Err(e) => {
                        tracing::warn!(
                            "Failed to merge {} into {}: {}",
                            candidates[drop].path,
                            candidates[keep].path,
                            e
                        );
                        report.errors += 1;
                    }
                }
            }
        }
    }

    /// Fold `drop` into `keep` under exclusive locks on both.
    ///
    /// Returns the merged content, or `None` when either file changed since
    /// it was captured.
    async fn merge_pair(&self, keep: &Candidate, drop: &Candidate, now: DateTime<Utc>) -> Result<Option<String>> {
        let engine = &self.engine;
        let store = engine.store();
        let _guard = engine.locks().lock_exclusive(&[&keep.path, &drop.path]).await;

        let (keep_now, drop_now) = match (store.read(&keep.path).await, store.read(&drop.path).await) {
            (Ok(a), Ok(b)) => (a, b),
            (Err(MemoryError::NotFound(_)), _) | (_, Err(MemoryError::NotFound(_))) => return Ok(None),
            (Err(e), _) | (_, Err(e)) => return Err(e),
        };
        if text::content_hash(&keep_now) != keep.hash || text::content_hash(&drop_now) != drop.hash {
            tracing::debug!("{} or {} changed during the cycle, not merging", keep.path, drop.path);
            return Ok(None);
        }

        let merged = text::merge_lines(&keep_now, &drop_now);
        if merged != keep_now {
            engine.router().check_admission(&keep.path, merged.len() as u64)?;
            store.write(&keep.path, &merged).await?;
        }
        store.remove(&drop.path).await?;

        engine.router().untrack(&drop.path);
        engine.router().update_content(&keep.path, &merged);
        engine
            .router()
            .record_provenance(Provenance::merged(drop.path.to_string(), keep.path.to_string(), now));
        Ok(Some(merged))
    }
}
