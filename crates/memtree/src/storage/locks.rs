//! Per-path lock table
//!
//! Every operation locks the ancestors of the paths it touches in shared
//! mode and the paths themselves in the mode it needs. Exclusive ownership
//! of a directory therefore excludes every operation inside its subtree,
//! while operations on disjoint paths proceed concurrently.
//!
//! Locks are always acquired in path order (ancestors sort before their
//! descendants), so multi-path acquisitions cannot deadlock.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use crate::path::VirtualPath;

enum Held {
    Shared(OwnedRwLockReadGuard<()>),
    Exclusive(OwnedRwLockWriteGuard<()>),
}

/// Guards for one acquisition; dropping it releases every lock
pub struct PathGuard {
    held: Vec<Held>,
}

impl PathGuard {
    /// Number of path locks held
    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    /// Number of path locks held exclusively
    pub fn exclusive_count(&self) -> usize {
        self.held
            .iter()
            .filter(|h| matches!(h, Held::Exclusive(_)))
            .count()
    }
}

#[derive(Default)]
pub struct LockTable {
    locks: DashMap<VirtualPath, Arc<RwLock<()>>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, path: &VirtualPath) -> Arc<RwLock<()>> {
        self.locks.entry(path.clone()).or_default().clone()
    }

    async fn acquire(&self, plan: BTreeMap<VirtualPath, bool>) -> PathGuard {
        let mut held = Vec::with_capacity(plan.len());
        for (path, exclusive) in plan {
            let lock = self.handle(&path);
            if exclusive {
                held.push(Held::Exclusive(lock.write_owned().await));
            } else {
                held.push(Held::Shared(lock.read_owned().await));
            }
        }
        PathGuard { held }
    }

    /// Lock each target exclusively and all of their ancestors shared
    pub async fn lock_exclusive(&self, targets: &[&VirtualPath]) -> PathGuard {
        let mut plan = BTreeMap::new();
        for target in targets {
            for ancestor in target.ancestors() {
                plan.entry(ancestor).or_insert(false);
            }
        }
        for target in targets {
            plan.insert((*target).clone(), true);
        }
        self.acquire(plan).await
    }

    /// Lock a path and its ancestors shared, for reads
    pub async fn lock_shared(&self, target: &VirtualPath) -> PathGuard {
        let mut plan: BTreeMap<VirtualPath, bool> =
            target.ancestors().into_iter().map(|a| (a, false)).collect();
        plan.insert(target.clone(), false);
        self.acquire(plan).await
    }

    /// Drop lock handles nobody holds. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before.saturating_sub(self.locks.len())
    }

    /// Number of lock handles currently tracked
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
