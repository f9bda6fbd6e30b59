//! Provenance records for files rewritten by the reorganizer
//!
//! When maintenance folds one file into another or replaces it with a
//! summary, a record is kept so the history of a path can be explained.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A provenance note about a path the reorganizer acted on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// Path the note is about
    pub path: String,
    /// When the action was applied
    pub recorded_at: DateTime<Utc>,
    /// What happened to the path
    pub kind: ProvenanceKind,
}

/// Why a path was rewritten or retired
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProvenanceKind {
    /// Content was merged into another near-duplicate file and removed
    Merged { into: String },
    /// A summary replaced the file in the tracked set; the file is now cold
    Superseded { by: String },
}

impl Provenance {
    pub fn merged(path: impl Into<String>, into: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            path: path.into(),
            recorded_at: now,
            kind: ProvenanceKind::Merged { into: into.into() },
        }
    }

    pub fn superseded(path: impl Into<String>, by: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            path: path.into(),
            recorded_at: now,
            kind: ProvenanceKind::Superseded { by: by.into() },
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let when = self.recorded_at.format("%Y-%m-%d %H:%M:%S");
        match &self.kind {
            ProvenanceKind::Merged { into } => {
                write!(f, "{} was merged into {} on {when}", self.path, into)
            }
            ProvenanceKind::Superseded { by } => {
                write!(f, "{} was superseded by {} on {when}", self.path, by)
            }
        }
    }
}
