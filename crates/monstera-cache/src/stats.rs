//! Cache statistics snapshot

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Read-only statistics computed from the live cache state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of live entries
    pub total_entries: usize,
    /// Lookups that found an entry since the last clear
    pub total_hits: u64,
    /// Lookups that found nothing since the last clear
    pub total_misses: u64,
    /// `hits / (hits + misses)`, 0.0 before the first lookup
    pub average_hit_rate: f64,
    /// Creation time of the oldest live entry
    pub oldest_entry: Option<DateTime<Utc>>,
    /// Creation time of the newest live entry
    pub newest_entry: Option<DateTime<Utc>>,
}

impl CacheStats {
    /// Hit rate for the given counters
    pub fn hit_rate(hits: u64, misses: u64) -> f64 {
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// Total number of lookups
    pub fn total_requests(&self) -> u64 {
        self.total_hits + self.total_misses
    }
}

impl Default for CacheStats {
    fn default() -> Self {
        Self {
            total_entries: 0,
            total_hits: 0,
            total_misses: 0,
            average_hit_rate: 0.0,
            oldest_entry: None,
            newest_entry: None,
        }
    }
}
