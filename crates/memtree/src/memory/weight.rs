//! Importance scoring for tracked paths
//!
//! Importance decides which Archival entries are summarized first when the
//! tracked set outgrows its global budget. It grows logarithmically with
//! access count and decays exponentially with idle time.

use chrono::{DateTime, Utc};

use crate::memory::types::{CacheEntry, Tier};

/// Parameters of the importance formula
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightConfig {
    /// Starting importance of an entry that was never read (default: 0.5)
    pub base_weight: f32,
    /// Multiplier for the access count logarithm (default: 0.1)
    pub access_multiplier: f32,
    /// Decay rate per idle day (default: 0.1)
    pub decay_rate: f32,
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            base_weight: 0.5,
            access_multiplier: 0.1,
            decay_rate: 0.1,
        }
    }
}

/// Calculate the importance of a cache entry at `now`.
///
/// Formula: base * (1 + access_mult * ln(access_count + 1)) * exp(-decay_rate * idle_days),
/// clamped to 0.0-1.0. Persona entries are pinned at 1.0.
pub fn calculate_importance(entry: &CacheEntry, now: DateTime<Utc>, config: &WeightConfig) -> f32 {
    if entry.tier == Tier::Persona {
        return 1.0;
    }

    let idle_days = (now - entry.last_access).num_seconds().max(0) as f32 / 86_400.0;
    let access_factor = 1.0 + config.access_multiplier * (entry.access_count as f32 + 1.0).ln();
    let decay_factor = (-config.decay_rate * idle_days).exp();

    (config.base_weight * access_factor * decay_factor).clamp(0.0, 1.0)
}
