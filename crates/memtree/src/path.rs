//! Virtual path resolution against the `/memories` sandbox root
//!
//! Every component that touches the backing store goes through
//! [`PathResolver::resolve`] first. Resolution is pure: it never looks at the
//! store, it only turns caller input into a canonical [`VirtualPath`] or a
//! typed failure.

use std::fmt;
use std::path::PathBuf;

use crate::error::{MemoryError, Result};

/// Logical root every virtual path lives under
pub const ROOT: &str = "/memories";

/// Segment prefix reserved for backing-store bookkeeping (temp files)
pub const RESERVED_PREFIX: &str = ".memtree-";

/// Default maximum length of a single path segment in bytes
pub const DEFAULT_MAX_SEGMENT_LEN: usize = 255;

/// A canonical path inside the sandbox root.
///
/// Holds the normalized segments below `/memories`; the root itself has no
/// segments. Ordering is lexicographic by segment, so an ancestor always
/// sorts before its descendants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VirtualPath {
    segments: Vec<String>,
}

impl VirtualPath {
    /// The sandbox root, `/memories`
    pub fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Final segment, `None` for the root
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Parent directory, `None` for the root
    pub fn parent(&self) -> Option<VirtualPath> {
        if self.is_root() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Proper ancestors ordered from the root down to the parent
    pub fn ancestors(&self) -> Vec<VirtualPath> {
        (0..self.segments.len())
            .map(|len| Self {
                segments: self.segments[..len].to_vec(),
            })
            .collect()
    }

    /// Append an already-validated segment.
    pub(crate) fn join(&self, name: &str) -> VirtualPath {
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Self { segments }
    }

    /// True when `self` equals `other` or lies inside it
    pub fn starts_with(&self, other: &VirtualPath) -> bool {
        self.segments.len() >= other.segments.len()
            && self.segments[..other.segments.len()] == other.segments[..]
    }

    /// Move `self` from under `from` to under `to`.
    ///
    /// Returns `None` when `self` is not inside `from`.
    pub fn rebase(&self, from: &VirtualPath, to: &VirtualPath) -> Option<VirtualPath> {
        if !self.starts_with(from) {
            return None;
        }
        let mut segments = to.segments.clone();
        segments.extend_from_slice(&self.segments[from.segments.len()..]);
        Some(Self { segments })
    }

    /// First segment below the root, used as the tenant namespace
    pub fn namespace(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    /// Path relative to the backend root (empty for `/memories`)
    pub fn to_relative_path(&self) -> PathBuf {
        self.segments.iter().collect()
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{ROOT}")?;
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

impl From<VirtualPath> for String {
    fn from(path: VirtualPath) -> Self {
        path.to_string()
    }
}

/// Validates and canonicalizes raw caller paths.
#[derive(Debug, Clone)]
pub struct PathResolver {
    max_segment_len: usize,
}

impl Default for PathResolver {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SEGMENT_LEN)
    }
}

impl PathResolver {
    pub fn new(max_segment_len: usize) -> Self {
        Self {
            max_segment_len: max_segment_len.max(1),
        }
    }

    pub fn max_segment_len(&self) -> usize {
        self.max_segment_len
    }

    /// Resolve a raw path to its canonical form.
    ///
    /// Accepts `/memories`, `/memories/...` and relative paths (taken to be
    /// under `/memories`). `.` segments are dropped and `..` segments pop the
    /// previous segment; popping past the root is a [`MemoryError::SandboxViolation`].
    pub fn resolve(&self, raw: &str) -> Result<VirtualPath> {
        if raw.is_empty() {
            return Err(MemoryError::InvalidPath("path is empty".to_string()));
        }
        if raw.contains('\0') {
            return Err(MemoryError::InvalidPath(format!(
                "{} contains a NUL byte",
                raw.escape_debug()
            )));
        }
        if raw.contains('\\') {
            return Err(MemoryError::InvalidPath(format!(
                "{raw} contains a backslash"
            )));
        }

        let rest = if raw.starts_with('/') {
            if raw == ROOT {
                ""
            } else if let Some(rest) = raw.strip_prefix(ROOT).and_then(|r| r.strip_prefix('/')) {
                rest
            } else {
                return Err(MemoryError::SandboxViolation(raw.to_string()));
            }
        } else {
            raw
        };
        let rest = rest.strip_suffix('/').unwrap_or(rest);

        let mut segments: Vec<String> = Vec::new();
        if rest.is_empty() {
            return Ok(VirtualPath { segments });
        }

        for segment in rest.split('/') {
            match segment {
                "" => {
                    return Err(MemoryError::InvalidPath(format!(
                        "{raw} contains an empty segment"
                    )));
                }
                "." => {}
                ".." => {
                    if segments.pop().is_none() {
                        return Err(MemoryError::SandboxViolation(raw.to_string()));
                    }
                }
                name => {
                    self.validate_segment(raw, name)?;
                    segments.push(name.to_string());
                }
            }
        }

        Ok(VirtualPath { segments })
    }

    /// Resolve a single child name under `parent`.
    pub fn child(&self, parent: &VirtualPath, name: &str) -> Result<VirtualPath> {
        if name.is_empty() || name == "." || name == ".." || name.contains('/') {
            return Err(MemoryError::InvalidPath(format!("{name:?} is not a file name")));
        }
        self.validate_segment(name, name)?;
        Ok(parent.join(name))
    }

    fn validate_segment(&self, raw: &str, segment: &str) -> Result<()> {
        if segment.len() > self.max_segment_len {
            return Err(MemoryError::InvalidPath(format!(
                "{raw}: segment exceeds {} bytes",
                self.max_segment_len
            )));
        }
        if segment.starts_with(RESERVED_PREFIX) {
            return Err(MemoryError::InvalidPath(format!(
                "{raw}: segment name {segment} is reserved"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn resolve(raw: &str) -> Result<VirtualPath> {
        PathResolver::default().resolve(raw)
    }

    #[test]
    fn test_root_forms() {
        assert!(resolve("/memories").unwrap().is_root());
        assert!(resolve("/memories/").unwrap().is_root());
        assert_eq!(resolve("/memories").unwrap().to_string(), "/memories");
    }

    #[test]
    fn test_absolute_and_relative_agree() {
        let abs = resolve("/memories/notes/todo.md").unwrap();
        let rel = resolve("notes/todo.md").unwrap();
        assert_eq!(abs, rel);
        assert_eq!(abs.to_string(), "/memories/notes/todo.md");
        assert_eq!(abs.name(), Some("todo.md"));
        assert_eq!(abs.namespace(), Some("notes"));
    }

    #[test]
    fn test_dot_segments_are_normalized() {
        let path = resolve("/memories/a/./b/../c.txt").unwrap();
        assert_eq!(path.to_string(), "/memories/a/c.txt");
    }

    #[test]
    fn test_traversal_is_sandbox_violation() {
        for raw in [
            "../../../etc/passwd",
            "/memories/../../../etc/passwd",
            "/memories/subdir/../../..",
            "/memories/..",
            "..",
        ] {
            let err = resolve(raw).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::SandboxViolation, "{raw}");
        }
    }

    #[test]
    fn test_absolute_outside_root_is_sandbox_violation() {
        for raw in ["/etc/passwd", "/memoriesX/a", "/", "/tmp/memories"] {
            let err = resolve(raw).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::SandboxViolation, "{raw}");
        }
    }

    #[test]
    fn test_malformed_paths_are_invalid() {
        for raw in [
            "",
            "a\0b",
            "..\\..\\windows\\system32",
            "/memories//a",
            "a//b",
            "/memories/.memtree-tmp-123",
        ] {
            let err = resolve(raw).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidPath, "{raw:?}");
        }
    }

    #[test]
    fn test_segment_length_limit() {
        let resolver = PathResolver::new(8);
        assert!(resolver.resolve("/memories/12345678").is_ok());
        let err = resolver.resolve("/memories/123456789").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPath);
    }

    #[test]
    fn test_ancestors_and_parent() {
        let path = resolve("/memories/a/b/c").unwrap();
        let ancestors: Vec<String> = path.ancestors().iter().map(|p| p.to_string()).collect();
        assert_eq!(ancestors, ["/memories", "/memories/a", "/memories/a/b"]);
        assert_eq!(path.parent().unwrap().to_string(), "/memories/a/b");
        assert!(VirtualPath::root().parent().is_none());
    }

    #[test]
    fn test_rebase_moves_subtree() {
        let from = resolve("/memories/a").unwrap();
        let to = resolve("/memories/z/y").unwrap();
        let child = resolve("/memories/a/b/c.md").unwrap();
        assert_eq!(
            child.rebase(&from, &to).unwrap().to_string(),
            "/memories/z/y/b/c.md"
        );
        let other = resolve("/memories/ab").unwrap();
        assert!(other.rebase(&from, &to).is_none());
    }

    #[test]
    fn test_ordering_puts_ancestors_first() {
        let mut paths = vec![
            resolve("/memories/a/b").unwrap(),
            resolve("/memories/b").unwrap(),
            resolve("/memories/a").unwrap(),
            VirtualPath::root(),
        ];
        paths.sort();
        let rendered: Vec<String> = paths.iter().map(|p| p.to_string()).collect();
        assert_eq!(
            rendered,
            ["/memories", "/memories/a", "/memories/a/b", "/memories/b"]
        );
    }

    #[test]
    fn test_child_rejects_separators() {
        let resolver = PathResolver::default();
        let root = VirtualPath::root();
        assert!(resolver.child(&root, "ok.md").is_ok());
        assert!(resolver.child(&root, "a/b").is_err());
        assert!(resolver.child(&root, "..").is_err());
    }
}
