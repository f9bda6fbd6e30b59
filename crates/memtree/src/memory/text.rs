//! Line-level text operations behind the editing commands
//!
//! All functions are pure: they take the current content and return the
//! new content (or a typed failure), so a failed edit never leaves a
//! partially modified buffer behind.

use std::collections::HashSet;

use sha2::{Digest, Sha256};

use crate::error::{MemoryError, Result};

/// Return lines `start..=end` (1-indexed) joined with `\n`.
///
/// `end` past the last line is clamped; a `start` past the last line yields
/// an empty selection.
pub fn select_lines(content: &str, start: usize, end: usize) -> Result<String> {
    validate_range(start, end)?;
    let selected: Vec<&str> = content
        .lines()
        .skip(start - 1)
        .take(end - start + 1)
        .collect();
    Ok(selected.join("\n"))
}

/// Check a 1-indexed inclusive line range
pub fn validate_range(start: usize, end: usize) -> Result<()> {
    if start < 1 {
        return Err(MemoryError::InvalidRange(format!(
            "start line {start} must be at least 1"
        )));
    }
    if start > end {
        return Err(MemoryError::InvalidRange(format!(
            "start line {start} is after end line {end}"
        )));
    }
    Ok(())
}

/// Count occurrences of `needle`, including overlapping ones.
///
/// The empty needle matches at every character boundary.
pub fn count_occurrences(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return haystack.chars().count() + 1;
    }

    let mut count = 0;
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(needle) {
        count += 1;
        let at = start + pos;
        start = at + haystack[at..].chars().next().map_or(1, char::len_utf8);
    }
    count
}

/// Replace the single occurrence of `old` with `new`.
///
/// Zero or multiple occurrences fail with [`MemoryError::AmbiguousMatch`].
pub fn replace_unique(path: &str, content: &str, old: &str, new: &str) -> Result<String> {
    let occurrences = count_occurrences(content, old);
    if occurrences != 1 {
        return Err(MemoryError::AmbiguousMatch {
            path: path.to_string(),
            occurrences,
        });
    }
    Ok(content.replacen(old, new, 1))
}

/// Insert `text` as a new line after 1-indexed line `line` (0 = top).
///
/// Existing lines are copied byte for byte, terminators included. The new
/// line uses the file's line ending (`\r\n` if its first terminated line
/// has one), a single trailing newline on `text` is dropped, and the file
/// keeps its own trailing newline if it had one.
pub fn insert_after_line(content: &str, line: usize, text: &str) -> Result<String> {
    let pieces: Vec<&str> = content.split_inclusive('\n').collect();
    if line > pieces.len() {
        return Err(MemoryError::InvalidRange(format!(
            "insert line {line} is past the end of the file ({} lines)",
            pieces.len()
        )));
    }

    let eol = match pieces.iter().find(|p| p.ends_with('\n')) {
        Some(p) if p.ends_with("\r\n") => "\r\n",
        _ => "\n",
    };
    let text = text
        .strip_suffix("\r\n")
        .or_else(|| text.strip_suffix('\n'))
        .unwrap_or(text);

    let mut out = String::with_capacity(content.len() + text.len() + eol.len() * 2);
    for piece in &pieces[..line] {
        out.push_str(piece);
    }
    if line > 0 && !pieces[line - 1].ends_with('\n') {
        out.push_str(eol);
    }
    out.push_str(text);
    if line < pieces.len() || content.ends_with('\n') {
        out.push_str(eol);
    }
    for piece in &pieces[line..] {
        out.push_str(piece);
    }
    Ok(out)
}

fn distinct_lines(content: &str) -> HashSet<&str> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect()
}

/// Jaccard similarity over distinct, trimmed, non-blank lines (0.0-1.0)
pub fn line_similarity(a: &str, b: &str) -> f32 {
    let a = distinct_lines(a);
    let b = distinct_lines(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(&b).count();
    let union = a.len() + b.len() - shared;
    shared as f32 / union as f32
}

/// Merge `secondary` into `primary`: primary stays intact and the lines of
/// secondary it does not already contain are appended in order.
pub fn merge_lines(primary: &str, secondary: &str) -> String {
    let known = distinct_lines(primary);
    let mut seen = HashSet::new();
    let extra: Vec<&str> = secondary
        .lines()
        .filter(|l| {
            let t = l.trim();
            !t.is_empty() && !known.contains(t) && seen.insert(t)
        })
        .collect();

    if extra.is_empty() {
        return primary.to_string();
    }

    let mut merged = primary.to_string();
    if !merged.is_empty() && !merged.ends_with('\n') {
        merged.push('\n');
    }
    merged.push_str(&extra.join("\n"));
    if primary.ends_with('\n') {
        merged.push('\n');
    }
    merged
}

/// Hex SHA-256 of the content, used for optimistic re-checks
pub fn content_hash(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}
