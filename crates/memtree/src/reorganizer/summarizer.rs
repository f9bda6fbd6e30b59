//! Summary generation for overflowing Archival entries
//!
//! Content generation is a collaborator behind the [`Summarizer`] trait so
//! an LLM-backed implementation can replace the built-in extractive one.

use async_trait::async_trait;

use crate::error::Result;
use crate::path::VirtualPath;

/// Longest line kept verbatim by the extractive summarizer
const MAX_LINE_CHARS: usize = 200;

#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Name for logs
    fn name(&self) -> &str;

    /// Produce a shorter replacement for `content`
    async fn summarize(&self, path: &VirtualPath, content: &str) -> Result<String>;
}

/// Keeps the first N non-blank lines, truncating very long ones
#[derive(Debug, Clone)]
pub struct ExtractiveSummarizer {
    max_lines: usize,
}

impl ExtractiveSummarizer {
    pub fn new(max_lines: usize) -> Self {
        Self {
            max_lines: max_lines.max(1),
        }
    }

    fn extract(&self, content: &str) -> String {
        let lines: Vec<String> = content
            .lines()
            .map(str::trim_end)
            .filter(|l| !l.trim().is_empty())
            .take(self.max_lines)
            .map(|line| {
                let truncated: String = line.chars().take(MAX_LINE_CHARS).collect();
                if truncated.len() < line.len() {
                    format!("{truncated}...")
                } else {
                    truncated
                }
            })
            .collect();
        lines.join("\n")
    }
}

impl Default for ExtractiveSummarizer {
    fn default() -> Self {
        Self::new(5)
    }
}

#[async_trait]
impl Summarizer for ExtractiveSummarizer {
    fn name(&self) -> &str {
        "extractive"
    }

    async fn summarize(&self, _path: &VirtualPath, content: &str) -> Result<String> {
        Ok(self.extract(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_keeps_first_non_blank_lines() {
        let summarizer = ExtractiveSummarizer::new(2);
        let summary = summarizer
            .summarize(&VirtualPath::root(), "\n\nfirst\n\nsecond\nthird\n")
            .await
            .unwrap();
        assert_eq!(summary, "first\nsecond");
    }

    #[tokio::test]
    async fn test_truncates_long_lines() {
        let summarizer = ExtractiveSummarizer::new(1);
        let long = "x".repeat(500);
        let summary = summarizer.summarize(&VirtualPath::root(), &long).await.unwrap();
        assert_eq!(summary.len(), MAX_LINE_CHARS + 3);
        assert!(summary.ends_with("..."));
    }

    #[test]
    fn test_zero_lines_is_clamped() {
        let summarizer = ExtractiveSummarizer::new(0);
        assert_eq!(summarizer.extract("a\nb"), "a");
    }
}
