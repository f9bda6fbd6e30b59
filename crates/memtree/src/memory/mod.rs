//! Memory types and operations
//!
//! Defines the file and cache-entry model, the pure text operations behind
//! the editing commands, importance scoring and provenance records.

pub mod provenance;
pub mod text;
pub mod types;
pub mod weight;

pub use provenance::{Provenance, ProvenanceKind};
pub use types::{CacheEntry, DirEntry, MemoryFile, NodeKind, Tier};
pub use weight::{WeightConfig, calculate_importance};
