//! Orchestrator statistics.

use std::fmt;

use crate::executor::MetricsSnapshot;

/// Point-in-time view of the cache and the orchestration state around it.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheStats {
    /// Entries in the store, including error-only entries.
    pub total_entries: usize,
    /// Entries with at least one subscriber.
    pub active_entries: usize,
    /// Entries whose data is stale or invalidated.
    pub stale_entries: usize,
    /// Entries whose last fetch failed.
    pub error_entries: usize,
    /// Learned navigation patterns.
    pub pattern_count: usize,
    /// Data types with a registered strategy.
    pub strategy_count: usize,
    /// Registered tags.
    pub tag_count: usize,
    /// Fetches currently running.
    pub in_flight: usize,
    /// Executor counters.
    pub counters: MetricsSnapshot,
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "entries: {} total, {} active, {} stale, {} errored",
            self.total_entries, self.active_entries, self.stale_entries, self.error_entries
        )?;
        writeln!(
            f,
            "registry: {} strategies, {} tags, {} navigation patterns",
            self.strategy_count, self.tag_count, self.pattern_count
        )?;
        write!(
            f,
            "fetches: {} network, {} deduplicated, {} fallbacks, {} revalidations, {} failed, {} in flight (hit rate {:.1}%)",
            self.counters.network_requests,
            self.counters.deduplicated,
            self.counters.fallbacks,
            self.counters.revalidations,
            self.counters.failures,
            self.in_flight,
            self.counters.hit_rate() * 100.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let stats = CacheStats {
            total_entries: 4,
            active_entries: 1,
            stale_entries: 2,
            error_entries: 1,
            pattern_count: 3,
            strategy_count: 6,
            tag_count: 2,
            in_flight: 0,
            counters: MetricsSnapshot {
                cache_hits: 1,
                cache_misses: 1,
                ..Default::default()
            },
        };
        let text = stats.to_string();
        assert!(text.contains("4 total, 1 active, 2 stale, 1 errored"));
        assert!(text.contains("6 strategies, 2 tags, 3 navigation patterns"));
        assert!(text.contains("hit rate 50.0%"));
    }
}
