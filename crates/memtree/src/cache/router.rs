//! Tiered cache router
//!
//! Decides which tier a path belongs to and serves hot reads from cached
//! content. The router is a performance layer only: the store stays the
//! source of truth, and losing the router's state degrades every path to
//! cold store access without losing data.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::table::TierTable;
use crate::config::TierConfig;
use crate::error::Result;
use crate::memory::provenance::Provenance;
use crate::memory::types::{CacheEntry, Tier};
use crate::memory::weight::{WeightConfig, calculate_importance};
use crate::path::{PathResolver, VirtualPath};

/// Outcome of a cache lookup
#[derive(Debug, Clone, PartialEq)]
pub enum Fetch {
    /// Content served from a hot tier
    Hit { tier: Tier, content: Arc<str> },
    /// Caller must read the store; `tier` is the path's tier if tracked
    Miss { tier: Option<Tier> },
}

/// Occupancy of one tier
#[derive(Debug, Clone, Serialize)]
pub struct TierStats {
    pub tier: Tier,
    pub entries: usize,
    pub used_bytes: u64,
    pub budget_bytes: u64,
    /// used / budget (0.0 when the budget is zero)
    pub utilization: f32,
}

#[derive(Serialize, Deserialize)]
struct PersistedEntry {
    path: String,
    #[serde(flatten)]
    entry: CacheEntry,
}

#[derive(Serialize, Deserialize)]
struct PersistedTable {
    version: u32,
    entries: Vec<PersistedEntry>,
    #[serde(default)]
    provenance: Vec<Provenance>,
}

const METADATA_VERSION: u32 = 1;

/// Shared owner of the tier table.
///
/// Every read and write of tier membership goes through one mutex, so a
/// path is never observed in two tiers at once.
#[derive(Debug)]
pub struct TierRouter {
    config: TierConfig,
    weights: WeightConfig,
    persona_patterns: Vec<String>,
    table: Mutex<TierTable>,
}

impl TierRouter {
    pub fn new(config: TierConfig) -> Self {
        let table = TierTable::new(&config);
        Self::with_table(config, table)
    }

    fn with_table(config: TierConfig, table: TierTable) -> Self {
        let persona_patterns = config
            .persona_patterns
            .iter()
            .map(|p| p.to_lowercase())
            .collect();
        Self {
            config,
            weights: WeightConfig::default(),
            persona_patterns,
            table: Mutex::new(table),
        }
    }

    pub fn config(&self) -> &TierConfig {
        &self.config
    }

    fn window(&self) -> Duration {
        Duration::seconds(self.config.access_window_secs as i64)
    }

    /// Whether the path follows the identity/profile naming convention.
    ///
    /// Matches any directory segment, or a file stem, against the configured
    /// patterns (case-insensitive).
    pub fn is_persona_path(&self, path: &VirtualPath) -> bool {
        path.segments().iter().any(|segment| {
            let segment = segment.to_lowercase();
            let stem = segment.split('.').next().unwrap_or(&segment);
            self.persona_patterns
                .iter()
                .any(|pattern| *pattern == segment || pattern == stem)
        })
    }

    /// Tier for content at `path` given its current tier and windowed accesses.
    ///
    /// Working membership is sticky: only the reorganizer demotes idle entries.
    pub fn classify(&self, path: &VirtualPath, current: Option<Tier>, windowed: u32) -> Tier {
        if self.is_persona_path(path) {
            Tier::Persona
        } else if current == Some(Tier::Working) || windowed > self.config.promote_access_threshold {
            Tier::Working
        } else {
            Tier::Archival
        }
    }

    /// Fail with `EntryTooLarge` if new content of `size_bytes` at `path`
    /// could not be tracked. Called before a write is applied.
    pub fn check_admission(&self, path: &VirtualPath, size_bytes: u64) -> Result<()> {
        let table = self.table.lock();
        let current = table.get(path).map(|e| e.tier);
        let tier = self.classify(path, current, 0);
        table.check_admission(tier, size_bytes)
    }

    /// Track freshly written content. Returns the tier it landed in.
    pub fn place(&self, path: &VirtualPath, content: &str, now: DateTime<Utc>) -> Option<Tier> {
        let placed = self.track(path, content, now);
        tracing::debug!(
            "Placed {} ({} bytes) in {}",
            path,
            content.len(),
            placed.map_or("cold", |t| t.as_str())
        );
        placed
    }

    /// Record a read of `path`, promoting it when it becomes busy.
    pub fn record_access(&self, path: &VirtualPath, content: &str, now: DateTime<Utc>) -> Option<Tier> {
        self.track(path, content, now)
    }

    fn track(&self, path: &VirtualPath, content: &str, now: DateTime<Utc>) -> Option<Tier> {
        let size_bytes = content.len() as u64;
        let mut table = self.table.lock();

        let previous = table.remove(path);
        let current = previous.as_ref().map(|e| e.tier);
        let mut entry = previous.unwrap_or_else(|| CacheEntry::new(Tier::Archival, size_bytes, now));

        entry.size_bytes = size_bytes;
        entry.mark_accessed(now);
        let windowed = entry.windowed_accesses(now, self.window());
        let tier = self.classify(path, current, windowed);

        if tier.caches_content() {
            entry.content = Some(Arc::from(content));
        }
        entry.importance = calculate_importance(&entry, now, &self.weights);

        let placed = table.admit(path.clone(), entry, tier);
        if current == Some(Tier::Archival) && placed == Some(Tier::Working) {
            tracing::debug!("Promoted {} to working after {} recent accesses", path, windowed);
        }
        placed
    }

    /// Refresh size and cached content after a rewrite that is not an access.
    /// Untracked paths stay cold.
    pub fn update_content(&self, path: &VirtualPath, content: &str) -> Option<Tier> {
        let mut table = self.table.lock();
        let mut entry = table.remove(path)?;
        let tier = entry.tier;
        entry.size_bytes = content.len() as u64;
        if tier.caches_content() {
            entry.content = Some(Arc::from(content));
        }
        table.admit(path.clone(), entry, tier)
    }

    /// Look up `path` in Working, then Persona, then Archival.
    pub fn fetch(&self, path: &VirtualPath) -> Fetch {
        let table = self.table.lock();
        for tier in Tier::LOOKUP_ORDER {
            if !table.contains(tier, path) {
                continue;
            }
            return match table.get(path).and_then(|e| e.content.clone()) {
                Some(content) => Fetch::Hit { tier, content },
                None => Fetch::Miss { tier: Some(tier) },
            };
        }
        Fetch::Miss { tier: None }
    }

    pub fn tier_of(&self, path: &VirtualPath) -> Option<Tier> {
        self.table.lock().get(path).map(|e| e.tier)
    }

    /// Copy of the entry for `path`, without cached content
    pub fn entry(&self, path: &VirtualPath) -> Option<CacheEntry> {
        self.table.lock().get(path).map(|e| {
            let mut entry = e.clone();
            entry.content = None;
            entry
        })
    }

    /// Stop tracking everything at or below `root`. Returns how many
    /// entries were dropped.
    pub fn forget_subtree(&self, root: &VirtualPath) -> usize {
        let mut table = self.table.lock();
        let paths = table.paths_under(root);
        for path in &paths {
            table.remove(path);
        }
        paths.len()
    }

    /// Re-key entries moved by a rename, keeping their tiers
    pub fn rename_subtree(&self, from: &VirtualPath, to: &VirtualPath) -> usize {
        let mut table = self.table.lock();
        for stale in table.paths_under(to) {
            table.remove(&stale);
        }

        let mut moved = 0;
        for path in table.paths_under(from) {
            let (Some(entry), Some(target)) = (table.remove(&path), path.rebase(from, to)) else {
                continue;
            };
            let tier = entry.tier;
            table.admit(target, entry, tier);
            moved += 1;
        }
        moved
    }

    /// Atomically move `path` from `from` to `to`.
    ///
    /// Returns `false` without changing anything when the path is no longer
    /// in `from`, or when `to` is a hot tier without room for it. `content`
    /// seeds the cache when moving into a hot tier.
    pub fn migrate(&self, path: &VirtualPath, from: Tier, to: Tier, content: Option<Arc<str>>) -> bool {
        let mut table = self.table.lock();
        Self::move_entry(&mut table, path, from, to, content)
    }

    /// Demote a Working entry to Archival if it was last read before `idle_before`.
    ///
    /// Recency is read under the table lock, so an access landing after the
    /// caller's snapshot keeps the entry in Working.
    pub fn demote_if_idle(&self, path: &VirtualPath, idle_before: DateTime<Utc>) -> bool {
        let mut table = self.table.lock();
        match table.get(path) {
            Some(entry) if entry.tier == Tier::Working && entry.last_access < idle_before => {}
            _ => return false,
        }
        Self::move_entry(&mut table, path, Tier::Working, Tier::Archival, None)
    }

    fn move_entry(
        table: &mut TierTable,
        path: &VirtualPath,
        from: Tier,
        to: Tier,
        content: Option<Arc<str>>,
    ) -> bool {
        let size_bytes = match table.get(path) {
            Some(entry) if entry.tier == from => entry.size_bytes,
            _ => return false,
        };
        if from == to {
            return true;
        }
        if to.caches_content() && table.used(to) + size_bytes > table.budget(to) {
            return false;
        }

        let Some(mut entry) = table.remove(path) else {
            return false;
        };
        if to.caches_content() {
            entry.content = content;
        }
        let placed = table.admit(path.clone(), entry, to);
        tracing::debug!(
            "Migrated {} from {} to {}",
            path,
            from,
            placed.map_or("cold", |t| t.as_str())
        );
        placed == Some(to)
    }

    /// Stop tracking `path` (it becomes cold) and return its last entry
    pub fn untrack(&self, path: &VirtualPath) -> Option<CacheEntry> {
        self.table.lock().remove(path)
    }

    /// Re-score every entry's importance at `now`
    pub fn refresh_importance(&self, now: DateTime<Utc>) {
        let mut table = self.table.lock();
        for entry in table.entries_mut() {
            entry.importance = calculate_importance(entry, now, &self.weights);
        }
    }

    /// Prune window timestamps for `path` and return its windowed access count
    pub fn windowed_accesses(&self, path: &VirtualPath, now: DateTime<Utc>) -> u32 {
        let window = self.window();
        self.table
            .lock()
            .stats_mut(path)
            .map_or(0, |e| e.windowed_accesses(now, window))
    }

    /// Copies of all entries (without content), sorted by path
    pub fn snapshot(&self) -> Vec<(VirtualPath, CacheEntry)> {
        let table = self.table.lock();
        let mut entries: Vec<(VirtualPath, CacheEntry)> = table
            .iter()
            .map(|(path, entry)| {
                let mut entry = entry.clone();
                entry.content = None;
                (path.clone(), entry)
            })
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Paths of `tier` from least to most recently used
    pub fn lru_order(&self, tier: Tier) -> Vec<VirtualPath> {
        self.table.lock().lru_order(tier)
    }

    pub fn record_provenance(&self, record: Provenance) {
        tracing::info!("{}", record);
        self.table.lock().record_provenance(record);
    }

    /// Forget that `path` was superseded, so maintenance treats it as live again
    pub fn clear_superseded(&self, path: &VirtualPath) {
        let cleared = self.table.lock().clear_superseded(path);
        if cleared > 0 {
            tracing::debug!("Cleared {} superseded record(s) for {}", cleared, path);
        }
    }

    pub fn provenance(&self) -> Vec<Provenance> {
        self.table.lock().provenance().to_vec()
    }

    pub fn total_tracked_bytes(&self) -> u64 {
        self.table.lock().total_bytes()
    }

    pub fn tracked_count(&self) -> usize {
        self.table.lock().len()
    }

    pub fn within_budgets(&self) -> bool {
        self.table.lock().within_budgets()
    }

    pub fn stats(&self) -> Vec<TierStats> {
        let table = self.table.lock();
        [Tier::Working, Tier::Archival, Tier::Persona]
            .into_iter()
            .map(|tier| {
                let used_bytes = table.used(tier);
                let budget_bytes = table.budget(tier);
                TierStats {
                    tier,
                    entries: table.count(tier),
                    used_bytes,
                    budget_bytes,
                    utilization: if budget_bytes == 0 {
                        0.0
                    } else {
                        used_bytes as f32 / budget_bytes as f32
                    },
                }
            })
            .collect()
    }

    /// Persist tier membership (cached content excluded) as JSON.
    ///
    /// Entries are written least recently used first so a reload restores
    /// recency order.
    pub async fn save(&self, file: &Path) -> Result<()> {
        let json = {
            let table = self.table.lock();
            let mut entries: Vec<PersistedEntry> = table
                .iter()
                .map(|(path, entry)| {
                    let mut entry = entry.clone();
                    entry.content = None;
                    PersistedEntry {
                        path: path.to_string(),
                        entry,
                    }
                })
                .collect();
            entries.sort_by(|a, b| a.entry.last_access.cmp(&b.entry.last_access));
            serde_json::to_string_pretty(&PersistedTable {
                version: METADATA_VERSION,
                entries,
                provenance: table.provenance().to_vec(),
            })?
        };

        if let Some(dir) = file.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let tmp = file.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, file).await?;
        tracing::debug!("Saved tier metadata to {}", file.display());
        Ok(())
    }

    /// Rebuild the router from persisted metadata.
    ///
    /// A missing or unreadable file yields an empty (all cold) router.
    /// Entries are re-admitted under the current budgets.
    pub async fn load(config: TierConfig, resolver: &PathResolver, file: &Path) -> Self {
        let raw = match tokio::fs::read_to_string(file).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No tier metadata at {}, starting cold", file.display());
                return Self::new(config);
            }
            Err(e) => {
                tracing::warn!("Failed to read tier metadata {}: {}; starting cold", file.display(), e);
                return Self::new(config);
            }
        };

        let persisted: PersistedTable = match serde_json::from_str(&raw) {
            Ok(persisted) => persisted,
            Err(e) => {
                tracing::warn!("Corrupt tier metadata {}: {}; starting cold", file.display(), e);
                return Self::new(config);
            }
        };

        let mut table = TierTable::new(&config);
        let mut restored = 0;
        for record in persisted.entries {
            match resolver.resolve(&record.path) {
                Ok(path) => {
                    let tier = record.entry.tier;
                    if table.admit(path, record.entry, tier).is_some() {
                        restored += 1;
                    }
                }
                Err(e) => tracing::warn!("Skipping tier entry {}: {}", record.path, e),
            }
        }
        for record in persisted.provenance {
            table.record_provenance(record);
        }

        tracing::info!("Restored {} tier entries from {}", restored, file.display());
        Self::with_table(config, table)
    }
}
