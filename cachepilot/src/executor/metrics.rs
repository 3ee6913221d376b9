//! Executor counters.
//!
//! Lock-free atomic counters updated on the hot path, copied into a
//! [`MetricsSnapshot`] for reporting.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters for read outcomes.
#[derive(Debug, Default)]
pub struct ExecutorMetrics {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    network_requests: AtomicU64,
    deduplicated: AtomicU64,
    fallbacks: AtomicU64,
    revalidations: AtomicU64,
    failures: AtomicU64,
}

impl ExecutorMetrics {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn network_request(&self) {
        self.network_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn deduplicated(&self) {
        self.deduplicated.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn revalidation(&self) {
        self.revalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time copy of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            network_requests: self.network_requests.load(Ordering::Relaxed),
            deduplicated: self.deduplicated.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            revalidations: self.revalidations.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ExecutorMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Reads served from a fresh (or SWR-eligible) cache entry.
    pub cache_hits: u64,
    /// Reads that needed the network.
    pub cache_misses: u64,
    /// Transport calls actually issued.
    pub network_requests: u64,
    /// Reads that joined an in-flight fetch.
    pub deduplicated: u64,
    /// Failed or timed-out fetches answered from cache.
    pub fallbacks: u64,
    /// Background revalidations started.
    pub revalidations: u64,
    /// Fetches that settled with an error.
    pub failures: u64,
}

impl MetricsSnapshot {
    /// Hit rate as a fraction (0.0 - 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}
