use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{MemoryError, Result};

/// Main configuration structure for memtree
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// Backing store configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// Tier budgets and classification rules
    #[serde(default)]
    pub tiers: TierConfig,
    /// Editing engine policy
    #[serde(default)]
    pub editor: EditorConfig,
    /// Background reorganizer configuration
    #[serde(default)]
    pub reorganizer: ReorganizerConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MemoryError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| MemoryError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine and reorganizer cannot honour.
    ///
    /// Tracked bytes never exceed the sum of the tier budgets, so an overflow
    /// threshold at or above that sum would never trigger summarization.
    pub fn validate(&self) -> Result<()> {
        let tier_total = self.tiers.total_budget_bytes();
        if self.reorganizer.global_budget_bytes >= tier_total {
            return Err(MemoryError::Config(format!(
                "reorganizer.global_budget_bytes ({}) must be below the sum of the tier budgets ({})",
                self.reorganizer.global_budget_bytes, tier_total
            )));
        }
        if !(0.0..=1.0).contains(&self.reorganizer.similarity_threshold) {
            return Err(MemoryError::Config(format!(
                "reorganizer.similarity_threshold must be between 0.0 and 1.0, got {}",
                self.reorganizer.similarity_threshold
            )));
        }
        Ok(())
    }

    /// Load from an explicit path, or the first default location that exists.
    ///
    /// Falls back to [`Config::default`] when no file is found.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = config_path {
            tracing::info!("Loading config from: {}", path.display());
            return Self::from_file(path);
        }

        let default_paths = [
            dirs::home_dir().map(|h| h.join(".memtree").join("config.toml")),
            dirs::config_dir().map(|c| c.join("memtree").join("config.toml")),
            Some(PathBuf::from("config.toml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }
}

/// Which backing store implementation to construct
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Directory tree on the local filesystem
    #[default]
    Local,
    /// Ephemeral in-process tree
    Memory,
}

/// Backing store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Base directory for all storage data
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Store implementation
    #[serde(default)]
    pub backend: BackendKind,
    /// Maximum length of a single path segment in bytes
    #[serde(default = "default_max_segment_len")]
    pub max_segment_len: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            backend: BackendKind::default(),
            max_segment_len: default_max_segment_len(),
        }
    }
}

impl StorageConfig {
    /// Root of the file tree that mirrors `/memories`
    pub fn memories_dir(&self) -> PathBuf {
        self.data_dir.join("memories")
    }

    /// Location of the persisted tier table
    pub fn tier_metadata_path(&self) -> PathBuf {
        self.data_dir.join("tiers.json")
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".memtree"))
        .unwrap_or_else(|| PathBuf::from(".memtree"))
}

fn default_max_segment_len() -> usize {
    crate::path::DEFAULT_MAX_SEGMENT_LEN
}

/// Tier budget and classification configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TierConfig {
    /// Working tier budget in bytes
    #[serde(default = "default_working_budget_bytes")]
    pub working_budget_bytes: u64,
    /// Archival tier budget in bytes
    #[serde(default = "default_archival_budget_bytes")]
    pub archival_budget_bytes: u64,
    /// Persona tier budget in bytes
    #[serde(default = "default_persona_budget_bytes")]
    pub persona_budget_bytes: u64,
    /// Windowed accesses must exceed this to land in Working
    #[serde(default = "default_promote_access_threshold")]
    pub promote_access_threshold: u32,
    /// Length of the sliding access window in seconds
    #[serde(default = "default_access_window_secs")]
    pub access_window_secs: u64,
    /// Path segments (or file stems) that mark identity/profile content
    #[serde(default = "default_persona_patterns")]
    pub persona_patterns: Vec<String>,
    /// Let Archival spill to untracked cold storage instead of failing
    #[serde(default = "default_archival_overflow")]
    pub archival_overflow: bool,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            working_budget_bytes: default_working_budget_bytes(),
            archival_budget_bytes: default_archival_budget_bytes(),
            persona_budget_bytes: default_persona_budget_bytes(),
            promote_access_threshold: default_promote_access_threshold(),
            access_window_secs: default_access_window_secs(),
            persona_patterns: default_persona_patterns(),
            archival_overflow: default_archival_overflow(),
        }
    }
}

impl TierConfig {
    /// Upper bound on tracked bytes across all tiers
    pub fn total_budget_bytes(&self) -> u64 {
        self.working_budget_bytes + self.archival_budget_bytes + self.persona_budget_bytes
    }
}

fn default_working_budget_bytes() -> u64 {
    4 * 1024
}

fn default_archival_budget_bytes() -> u64 {
    100 * 1024
}

fn default_persona_budget_bytes() -> u64 {
    2 * 1024
}

fn default_promote_access_threshold() -> u32 {
    3
}

fn default_access_window_secs() -> u64 {
    300
}

fn default_persona_patterns() -> Vec<String> {
    ["persona", "profile", "identity", "user_profile"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_archival_overflow() -> bool {
    true
}

/// Editing engine policy
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EditorConfig {
    /// Deleting a directory removes its whole subtree
    #[serde(default = "default_cascade_delete")]
    pub cascade_delete: bool,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            cascade_delete: default_cascade_delete(),
        }
    }
}

fn default_cascade_delete() -> bool {
    true
}

/// Background reorganizer configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReorganizerConfig {
    /// Run the periodic maintenance task
    #[serde(default = "default_reorganizer_enabled")]
    pub enabled: bool,
    /// Seconds between cycles
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Jaccard line similarity at which two sibling files are merged (0.0-1.0)
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    /// Working entries idle for this long are demoted to Archival
    #[serde(default = "default_demote_after_secs")]
    pub demote_after_secs: u64,
    /// Windowed accesses an Archival entry needs to be promoted
    #[serde(default = "default_promote_min_accesses")]
    pub promote_min_accesses: u32,
    /// Total tracked bytes above which Archival entries are summarized.
    /// Must stay below the sum of the tier budgets.
    #[serde(default = "default_global_budget_bytes")]
    pub global_budget_bytes: u64,
    /// Maximum lines kept by the extractive summarizer
    #[serde(default = "default_summary_max_lines")]
    pub summary_max_lines: usize,
}

impl Default for ReorganizerConfig {
    fn default() -> Self {
        Self {
            enabled: default_reorganizer_enabled(),
            interval_secs: default_interval_secs(),
            similarity_threshold: default_similarity_threshold(),
            demote_after_secs: default_demote_after_secs(),
            promote_min_accesses: default_promote_min_accesses(),
            global_budget_bytes: default_global_budget_bytes(),
            summary_max_lines: default_summary_max_lines(),
        }
    }
}

fn default_reorganizer_enabled() -> bool {
    true
}

fn default_interval_secs() -> u64 {
    60
}

fn default_similarity_threshold() -> f32 {
    0.8
}

fn default_demote_after_secs() -> u64 {
    600
}

fn default_promote_min_accesses() -> u32 {
    5
}

fn default_global_budget_bytes() -> u64 {
    80 * 1024
}

fn default_summary_max_lines() -> usize {
    5
}
