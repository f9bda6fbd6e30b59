use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operation and cache counters, updated lock-free by every command
#[derive(Debug, Default)]
pub struct EngineStats {
    views: AtomicU64,
    creates: AtomicU64,
    str_replaces: AtomicU64,
    inserts: AtomicU64,
    deletes: AtomicU64,
    renames: AtomicU64,
    failures: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

/// Point-in-time copy of [`EngineStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub views: u64,
    pub creates: u64,
    pub str_replaces: u64,
    pub inserts: u64,
    pub deletes: u64,
    pub renames: u64,
    pub failures: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

impl StatsSnapshot {
    pub fn total_operations(&self) -> u64 {
        self.views + self.creates + self.str_replaces + self.inserts + self.deletes + self.renames
    }

    /// Share of file reads served from a hot tier (0.0 with no reads)
    pub fn hit_rate(&self) -> f64 {
        let reads = self.cache_hits + self.cache_misses;
        if reads == 0 {
            0.0
        } else {
            self.cache_hits as f64 / reads as f64
        }
    }
}

impl EngineStats {
    /// Count one invocation of the named command
    pub fn record_command(&self, name: &str) {
        let counter = match name {
            "view" => &self.views,
            "create" => &self.creates,
            "str_replace" => &self.str_replaces,
            "insert" => &self.inserts,
            "delete" => &self.deletes,
            "rename" => &self.renames,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache(&self, hit: bool) {
        if hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.cache_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            views: self.views.load(Ordering::Relaxed),
            creates: self.creates.load(Ordering::Relaxed),
            str_replaces: self.str_replaces.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            renames: self.renames.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
        }
    }
}
