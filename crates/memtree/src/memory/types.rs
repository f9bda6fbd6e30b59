//! Memory types for the memtree store
//!
//! Defines the file/directory model returned by the editing engine and the
//! per-path cache metadata tracked by the tier router.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::path::VirtualPath;

/// Memory block a tracked path belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Small, hot working set served from cached content
    Working,
    /// Larger warm set, metadata only, content read from the store
    Archival,
    /// Identity/profile content, pinned away from ordinary eviction pressure
    Persona,
}

impl Tier {
    /// Lookup order used by `fetch`
    pub const LOOKUP_ORDER: [Tier; 3] = [Tier::Working, Tier::Persona, Tier::Archival];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Working => "working",
            Tier::Archival => "archival",
            Tier::Persona => "persona",
        }
    }

    /// Whether entries in this tier keep a cached copy of their content
    pub fn caches_content(&self) -> bool {
        matches!(self, Tier::Working | Tier::Persona)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "working" => Ok(Tier::Working),
            "archival" => Ok(Tier::Archival),
            "persona" => Ok(Tier::Persona),
            other => Err(format!(
                "Unknown tier: {other}. Use working, archival, or persona."
            )),
        }
    }
}

/// Cache metadata for one tracked path.
///
/// The store owns the content; an entry only carries a reference (its key)
/// plus access statistics. Hot tiers additionally keep a non-authoritative
/// copy of the content to serve reads without touching the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Tier this path currently belongs to
    pub tier: Tier,
    /// Size of the file content in bytes
    pub size_bytes: u64,
    /// Lifetime access count
    pub access_count: u64,
    /// When the path was last read or written
    pub last_access: DateTime<Utc>,
    /// When the path started being tracked
    pub tracked_since: DateTime<Utc>,
    /// Importance score (0.0-1.0)
    pub importance: f32,
    /// Access timestamps inside the sliding window, oldest first
    #[serde(default)]
    pub recent_accesses: VecDeque<DateTime<Utc>>,
    #[serde(skip)]
    pub(crate) content: Option<Arc<str>>,
}

impl CacheEntry {
    pub fn new(tier: Tier, size_bytes: u64, now: DateTime<Utc>) -> Self {
        Self {
            tier,
            size_bytes,
            access_count: 0,
            last_access: now,
            tracked_since: now,
            importance: 0.5,
            recent_accesses: VecDeque::new(),
            content: None,
        }
    }

    /// Record one access at `now`
    pub fn mark_accessed(&mut self, now: DateTime<Utc>) {
        self.access_count += 1;
        self.last_access = now;
        self.recent_accesses.push_back(now);
    }

    /// Drop window timestamps older than `window` and return how many remain
    pub fn windowed_accesses(&mut self, now: DateTime<Utc>, window: Duration) -> u32 {
        let cutoff = now - window;
        while self
            .recent_accesses
            .front()
            .is_some_and(|t| *t < cutoff)
        {
            self.recent_accesses.pop_front();
        }
        self.recent_accesses.len() as u32
    }

    /// Whether a cached copy of the content is held
    pub fn is_cached(&self) -> bool {
        self.content.is_some()
    }
}

/// Kind of node in the memory tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Directory,
}

/// One child in a directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// Child name (unique among siblings)
    pub name: String,
    /// File or directory
    pub kind: NodeKind,
    /// Content size for files, 0 for directories
    pub size_bytes: u64,
}

/// A file read through the engine
#[derive(Debug, Clone, Serialize)]
pub struct MemoryFile {
    /// Canonical path
    pub path: String,
    /// Full text content
    pub content: String,
    /// Content size in bytes
    pub size_bytes: u64,
    /// Last modification time reported by the store
    pub modified: DateTime<Utc>,
    /// Tier the path is tracked in, `None` when cold
    pub tier: Option<Tier>,
}

impl MemoryFile {
    pub fn new(path: &VirtualPath, content: String, modified: DateTime<Utc>, tier: Option<Tier>) -> Self {
        Self {
            path: path.to_string(),
            size_bytes: content.len() as u64,
            content,
            modified,
            tier,
        }
    }

    pub fn line_count(&self) -> usize {
        self.content.lines().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_serialization() {
        for tier in [Tier::Working, Tier::Archival, Tier::Persona] {
            let json = serde_json::to_string(&tier).expect("Failed to serialize");
            assert_eq!(json, format!("\"{}\"", tier.as_str()));
            let deserialized: Tier = serde_json::from_str(&json).expect("Failed to deserialize");
            assert_eq!(tier, deserialized);
        }
    }

    #[test]
    fn test_tier_from_str() {
        assert_eq!("Working".parse::<Tier>().unwrap(), Tier::Working);
        assert_eq!("persona".parse::<Tier>().unwrap(), Tier::Persona);
        assert!("hot".parse::<Tier>().is_err());
    }

    #[test]
    fn test_only_hot_tiers_cache_content() {
        assert!(Tier::Working.caches_content());
        assert!(Tier::Persona.caches_content());
        assert!(!Tier::Archival.caches_content());
    }

    #[test]
    fn test_cache_entry_mark_accessed() {
        let now = Utc::now();
        let mut entry = CacheEntry::new(Tier::Archival, 10, now);
        assert_eq!(entry.access_count, 0);

        entry.mark_accessed(now + Duration::seconds(1));
        assert_eq!(entry.access_count, 1);
        assert_eq!(entry.last_access, now + Duration::seconds(1));
        assert_eq!(entry.recent_accesses.len(), 1);
    }

    #[test]
    fn test_windowed_accesses_prunes_old_timestamps() {
        let now = Utc::now();
        let mut entry = CacheEntry::new(Tier::Archival, 10, now);
        entry.mark_accessed(now - Duration::seconds(600));
        entry.mark_accessed(now - Duration::seconds(120));
        entry.mark_accessed(now - Duration::seconds(10));

        assert_eq!(entry.windowed_accesses(now, Duration::seconds(300)), 2);
        assert_eq!(entry.recent_accesses.len(), 2);
        assert_eq!(entry.access_count, 3);
    }

    #[test]
    fn test_cached_content_is_not_serialized() {
        let mut entry = CacheEntry::new(Tier::Working, 5, Utc::now());
        entry.content = Some(Arc::from("hello"));
        let json = serde_json::to_string(&entry).unwrap();
        let restored: CacheEntry = serde_json::from_str(&json).unwrap();
        assert!(entry.is_cached());
        assert!(!restored.is_cached());
        assert_eq!(restored.size_bytes, 5);
    }

    #[test]
    fn test_memory_file_lines() {
        let path = VirtualPath::root().join("a.md");
        let file = MemoryFile::new(&path, "one\ntwo\n".to_string(), Utc::now(), None);
        assert_eq!(file.line_count(), 2);
        assert_eq!(file.size_bytes, 8);
        assert_eq!(file.path, "/memories/a.md");
    }
}
