//! Tier membership table
//!
//! Holds exactly one [`CacheEntry`] per tracked path plus a recency order
//! and byte accounting per tier. Admission enforces each tier's budget by
//! evicting the least recently used entries of that tier:
//!
//! - Working/Persona victims are demoted to Archival (cached content dropped)
//! - Archival victims become cold (untracked); their files stay in the store
//!
//! The table itself is not synchronized; [`super::TierRouter`] owns it
//! behind a mutex.

use std::collections::HashMap;

use lru::LruCache;

use crate::config::TierConfig;
use crate::error::{MemoryError, Result};
use crate::memory::provenance::{Provenance, ProvenanceKind};
use crate::memory::types::{CacheEntry, Tier};
use crate::path::VirtualPath;

/// Oldest provenance records are dropped past this many
pub const MAX_PROVENANCE: usize = 1024;

const TIERS: [Tier; 3] = [Tier::Working, Tier::Archival, Tier::Persona];

fn slot(tier: Tier) -> usize {
    match tier {
        Tier::Working => 0,
        Tier::Archival => 1,
        Tier::Persona => 2,
    }
}

#[derive(Debug)]
pub struct TierTable {
    budgets: [u64; 3],
    archival_overflow: bool,
    entries: HashMap<VirtualPath, CacheEntry>,
    recency: [LruCache<VirtualPath, ()>; 3],
    used: [u64; 3],
    provenance: Vec<Provenance>,
}

impl TierTable {
    pub fn new(config: &TierConfig) -> Self {
        Self {
            budgets: [
                config.working_budget_bytes,
                config.archival_budget_bytes,
                config.persona_budget_bytes,
            ],
            archival_overflow: config.archival_overflow,
            entries: HashMap::new(),
            recency: [
                LruCache::unbounded(),
                LruCache::unbounded(),
                LruCache::unbounded(),
            ],
            used: [0; 3],
            provenance: Vec::new(),
        }
    }

    pub fn budget(&self, tier: Tier) -> u64 {
        self.budgets[slot(tier)]
    }

    pub fn used(&self, tier: Tier) -> u64 {
        self.used[slot(tier)]
    }

    /// Number of entries in `tier`
    pub fn count(&self, tier: Tier) -> usize {
        self.recency[slot(tier)].len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: &VirtualPath) -> Option<&CacheEntry> {
        self.entries.get(path)
    }

    /// Whether `tier` currently holds `path`
    pub fn contains(&self, tier: Tier, path: &VirtualPath) -> bool {
        self.recency[slot(tier)].contains(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&VirtualPath, &CacheEntry)> {
        self.entries.iter()
    }

    /// Paths of `tier` from least to most recently used
    pub fn lru_order(&self, tier: Tier) -> Vec<VirtualPath> {
        self.recency[slot(tier)]
            .iter()
            .rev()
            .map(|(path, _)| path.clone())
            .collect()
    }

    /// Tracked paths at or below `root`
    pub fn paths_under(&self, root: &VirtualPath) -> Vec<VirtualPath> {
        self.entries
            .keys()
            .filter(|p| p.starts_with(root))
            .cloned()
            .collect()
    }

    /// Sum of tracked bytes across all tiers
    pub fn total_bytes(&self) -> u64 {
        self.used.iter().sum()
    }

    /// Every tier's used bytes is within its budget
    pub fn within_budgets(&self) -> bool {
        TIERS.iter().all(|t| self.used(*t) <= self.budget(*t))
    }

    /// Fail with `EntryTooLarge` when content of `size_bytes` destined for
    /// `tier` could not be tracked and Archival has no overflow path.
    pub fn check_admission(&self, tier: Tier, size_bytes: u64) -> Result<()> {
        if self.archival_overflow {
            return Ok(());
        }
        let fits_hot = tier.caches_content() && size_bytes <= self.budget(tier);
        let archival = self.budget(Tier::Archival);
        if !fits_hot && size_bytes > archival {
            return Err(MemoryError::EntryTooLarge {
                size_bytes,
                budget_bytes: archival,
            });
        }
        Ok(())
    }

    /// Mark `path` as most recently used in its tier
    pub fn touch(&mut self, path: &VirtualPath) {
        if let Some(entry) = self.entries.get(path) {
            self.recency[slot(entry.tier)].promote(path);
        }
    }

    /// Mutable access for bookkeeping that does not change the entry's size
    pub(crate) fn stats_mut(&mut self, path: &VirtualPath) -> Option<&mut CacheEntry> {
        self.entries.get_mut(path)
    }

    pub(crate) fn entries_mut(&mut self) -> impl Iterator<Item = &mut CacheEntry> {
        self.entries.values_mut()
    }

    /// Stop tracking `path`, returning its entry
    pub fn remove(&mut self, path: &VirtualPath) -> Option<CacheEntry> {
        let entry = self.entries.remove(path)?;
        let s = slot(entry.tier);
        self.recency[s].pop(path);
        self.used[s] = self.used[s].saturating_sub(entry.size_bytes);
        Some(entry)
    }

    /// Admit an untracked entry into `tier`, evicting as needed.
    ///
    /// Returns the tier the entry landed in, or `None` when it could not be
    /// tracked anywhere and went cold.
    pub fn admit(&mut self, path: VirtualPath, entry: CacheEntry, tier: Tier) -> Option<Tier> {
        if let Some(stale) = self.remove(&path) {
            tracing::warn!("Replacing stale tier entry for {} in {}", path, stale.tier);
        }

        if tier.caches_content() {
            if entry.size_bytes <= self.budget(tier) {
                self.make_room(tier, entry.size_bytes);
                self.insert(path, entry, tier);
                return Some(tier);
            }
            tracing::debug!(
                "{} ({} bytes) exceeds the {} budget, falling back to archival",
                path,
                entry.size_bytes,
                tier
            );
        }
        self.admit_archival(path, entry)
    }

    fn admit_archival(&mut self, path: VirtualPath, entry: CacheEntry) -> Option<Tier> {
        if entry.size_bytes > self.budget(Tier::Archival) {
            tracing::debug!(
                "{} ({} bytes) exceeds the archival budget, left untracked",
                path,
                entry.size_bytes
            );
            return None;
        }
        self.make_room(Tier::Archival, entry.size_bytes);
        self.insert(path, entry, Tier::Archival);
        Some(Tier::Archival)
    }

    fn insert(&mut self, path: VirtualPath, mut entry: CacheEntry, tier: Tier) {
        entry.tier = tier;
        if !tier.caches_content() {
            entry.content = None;
        }
        let s = slot(tier);
        self.used[s] += entry.size_bytes;
        self.recency[s].put(path.clone(), ());
        self.entries.insert(path, entry);
    }

    fn make_room(&mut self, tier: Tier, size_bytes: u64) {
        let s = slot(tier);
        while self.used[s] + size_bytes > self.budgets[s] {
            let Some((victim, ())) = self.recency[s].pop_lru() else {
                break;
            };
            let Some(mut entry) = self.entries.remove(&victim) else {
                continue;
            };
            self.used[s] = self.used[s].saturating_sub(entry.size_bytes);

            if tier.caches_content() {
                tracing::debug!("Evicted {} from {} to archival", victim, tier);
                entry.content = None;
                self.admit_archival(victim, entry);
            } else {
                tracing::debug!("Evicted {} from archival to cold storage", victim);
            }
        }
    }

    pub fn record_provenance(&mut self, record: Provenance) {
        self.provenance.push(record);
        if self.provenance.len() > MAX_PROVENANCE {
            let excess = self.provenance.len() - MAX_PROVENANCE;
            self.provenance.drain(..excess);
        }
    }

    /// Drop `Superseded` records for a path that was written again
    pub fn clear_superseded(&mut self, path: &VirtualPath) -> usize {
        let path = path.to_string();
        let before = self.provenance.len();
        self.provenance
            .retain(|record| !(record.path == path && matches!(record.kind, ProvenanceKind::Superseded { .. })));
        before - self.provenance.len()
    }

    pub fn provenance(&self) -> &[Provenance] {
        &self.provenance
    }
}
