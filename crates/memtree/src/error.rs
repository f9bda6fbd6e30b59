//! Error types for memtree

use serde::Serialize;
use thiserror::Error;

/// Main error type for memtree operations
#[derive(Error, Debug)]
pub enum MemoryError {
    /// Path is malformed (empty, NUL bytes, empty or reserved segments)
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Path resolves outside the sandbox root
    #[error("Sandbox violation: {0} escapes /memories")]
    SandboxViolation(String),

    /// File or directory does not exist
    #[error("Path does not exist: {0}")]
    NotFound(String),

    /// Destination is already occupied
    #[error("Destination already exists: {0}")]
    AlreadyExists(String),

    /// Line range or insert position is out of bounds
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// `old_str` matched zero or several times
    #[error("Ambiguous match: expected exactly one occurrence in {path}, found {occurrences}")]
    AmbiguousMatch { path: String, occurrences: usize },

    /// Entry does not fit any tier that can hold it
    #[error("Entry too large: {size_bytes} bytes exceeds the {budget_bytes} byte archival budget")]
    EntryTooLarge { size_bytes: u64, budget_bytes: u64 },

    /// Expected a file but found a directory
    #[error("Is a directory: {0}")]
    IsADirectory(String),

    /// A path component that must be a directory is a file
    #[error("Not a directory: {0}")]
    NotADirectory(String),

    /// Directory delete refused because cascading delete is disabled
    #[error("Directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// Command name not recognised by the dispatcher
    #[error("Unknown command '{0}'")]
    UnknownCommand(String),

    /// Another process already owns the data directory
    #[error("Store is in use by another process: {0}")]
    StoreLocked(String),

    /// Backing store errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stable, matchable classification of a [`MemoryError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidPath,
    SandboxViolation,
    NotFound,
    AlreadyExists,
    InvalidRange,
    AmbiguousMatch,
    EntryTooLarge,
    IsADirectory,
    NotADirectory,
    DirectoryNotEmpty,
    UnknownCommand,
    StoreLocked,
    Storage,
    Config,
    Serialization,
    Io,
}

impl MemoryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MemoryError::InvalidPath(_) => ErrorKind::InvalidPath,
            MemoryError::SandboxViolation(_) => ErrorKind::SandboxViolation,
            MemoryError::NotFound(_) => ErrorKind::NotFound,
            MemoryError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            MemoryError::InvalidRange(_) => ErrorKind::InvalidRange,
            MemoryError::AmbiguousMatch { .. } => ErrorKind::AmbiguousMatch,
            MemoryError::EntryTooLarge { .. } => ErrorKind::EntryTooLarge,
            MemoryError::IsADirectory(_) => ErrorKind::IsADirectory,
            MemoryError::NotADirectory(_) => ErrorKind::NotADirectory,
            MemoryError::DirectoryNotEmpty(_) => ErrorKind::DirectoryNotEmpty,
            MemoryError::UnknownCommand(_) => ErrorKind::UnknownCommand,
            MemoryError::StoreLocked(_) => ErrorKind::StoreLocked,
            MemoryError::Storage(_) => ErrorKind::Storage,
            MemoryError::Config(_) => ErrorKind::Config,
            MemoryError::Serialization(_) => ErrorKind::Serialization,
            MemoryError::Io(_) => ErrorKind::Io,
        }
    }

    /// Security-relevant failures must never be retried with a rewritten path
    pub fn is_security_violation(&self) -> bool {
        matches!(self, MemoryError::SandboxViolation(_))
    }
}

impl From<serde_json::Error> for MemoryError {
    fn from(e: serde_json::Error) -> Self {
        MemoryError::Serialization(e.to_string())
    }
}

/// Result type alias for memtree operations
pub type Result<T> = std::result::Result<T, MemoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        let err = MemoryError::AmbiguousMatch {
            path: "/memories/a.md".to_string(),
            occurrences: 2,
        };
        assert_eq!(err.kind(), ErrorKind::AmbiguousMatch);
        assert!(err.to_string().contains("found 2"));

        let err = MemoryError::SandboxViolation("/etc/passwd".to_string());
        assert!(err.is_security_violation());
        assert!(!MemoryError::NotFound("x".to_string()).is_security_violation());
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::EntryTooLarge).unwrap();
        assert_eq!(json, "\"entry_too_large\"");
    }
}
