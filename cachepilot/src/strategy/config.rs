//! Strategy configuration types.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// =============================================================================
// Defaults
// =============================================================================

/// Default staleness window: entries are stale as soon as they are written.
pub const DEFAULT_STALE_TIME: Duration = Duration::ZERO;

/// Default advisory eviction horizon (5 minutes).
pub const DEFAULT_GC_TIME: Duration = Duration::from_secs(5 * 60);

/// How a read for a data type is satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    /// Serve fresh cache entries, fetch otherwise.
    CacheFirst,
    /// Always fetch, fall back to any cached entry on failure or timeout.
    NetworkFirst,
    /// Serve any cached entry immediately, revalidate stale ones in the background.
    StaleWhileRevalidate,
    /// Purge the entry and always fetch.
    NetworkOnly,
}

impl StrategyKind {
    /// Configuration-file spelling of the strategy.
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::CacheFirst => "cache-first",
            StrategyKind::NetworkFirst => "network-first",
            StrategyKind::StaleWhileRevalidate => "stale-while-revalidate",
            StrategyKind::NetworkOnly => "network-only",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "cache-first" => Ok(StrategyKind::CacheFirst),
            "network-first" => Ok(StrategyKind::NetworkFirst),
            "stale-while-revalidate" | "swr" => Ok(StrategyKind::StaleWhileRevalidate),
            "network-only" => Ok(StrategyKind::NetworkOnly),
            other => Err(format!("unknown strategy '{}'", other)),
        }
    }
}

/// Scheduling importance of a data type.
///
/// Low-priority data types are never prefetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    /// Configuration-file spelling of the priority.
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(format!("unknown priority '{}'", other)),
        }
    }
}

/// Read configuration for one data type.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyConfig {
    /// Read algorithm.
    pub strategy: StrategyKind,
    /// Entries younger than this are never stale.
    pub stale_time: Duration,
    /// Advisory eviction horizon, delegated to the store.
    pub gc_time: Duration,
    /// Tags this data type's entries belong to.
    pub tags: BTreeSet<String>,
    /// Scheduling importance.
    pub priority: Priority,
    /// Upper bound on waiting for the network (NetworkFirst only).
    pub network_timeout: Option<Duration>,
    /// Retry a failed background revalidation once.
    pub retry_on_stale: bool,
}

impl StrategyConfig {
    /// Create a config for `strategy` with default windows.
    pub fn new(strategy: StrategyKind) -> Self {
        Self {
            strategy,
            stale_time: DEFAULT_STALE_TIME,
            gc_time: DEFAULT_GC_TIME,
            tags: BTreeSet::new(),
            priority: Priority::default(),
            network_timeout: None,
            retry_on_stale: false,
        }
    }

    /// Cache-first with the given staleness window.
    pub fn cache_first(stale_time: Duration) -> Self {
        Self::new(StrategyKind::CacheFirst).with_stale_time(stale_time)
    }

    /// Network-first with an optional timeout.
    pub fn network_first(network_timeout: Option<Duration>) -> Self {
        let mut config = Self::new(StrategyKind::NetworkFirst);
        config.network_timeout = network_timeout;
        config
    }

    /// Stale-while-revalidate with the given staleness window.
    pub fn stale_while_revalidate(stale_time: Duration) -> Self {
        Self::new(StrategyKind::StaleWhileRevalidate).with_stale_time(stale_time)
    }

    /// Network-only.
    pub fn network_only() -> Self {
        Self::new(StrategyKind::NetworkOnly)
    }

    /// Set the staleness window.
    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    /// Set the eviction horizon.
    pub fn with_gc_time(mut self, gc_time: Duration) -> Self {
        self.gc_time = gc_time;
        self
    }

    /// Add a tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the network timeout.
    pub fn with_network_timeout(mut self, timeout: Duration) -> Self {
        self.network_timeout = Some(timeout);
        self
    }

    /// Enable a single retry of failed background revalidations.
    pub fn with_retry_on_stale(mut self, retry: bool) -> Self {
        self.retry_on_stale = retry;
        self
    }

    /// Whether `gc_time >= stale_time`.
    ///
    /// A violation is a warning condition, not an error: entries may be
    /// evicted while still fresh.
    pub fn is_consistent(&self) -> bool {
        self.gc_time >= self.stale_time
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self::new(StrategyKind::CacheFirst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_kind_parse() {
        assert_eq!("cache-first".parse(), Ok(StrategyKind::CacheFirst));
        assert_eq!("Network_First".parse(), Ok(StrategyKind::NetworkFirst));
        assert_eq!("swr".parse(), Ok(StrategyKind::StaleWhileRevalidate));
        assert_eq!(" network-only ".parse(), Ok(StrategyKind::NetworkOnly));
        assert!("cache-last".parse::<StrategyKind>().is_err());
    }

    #[test]
    fn test_strategy_kind_round_trips_through_display() {
        for kind in [
            StrategyKind::CacheFirst,
            StrategyKind::NetworkFirst,
            StrategyKind::StaleWhileRevalidate,
            StrategyKind::NetworkOnly,
        ] {
            assert_eq!(kind.to_string().parse(), Ok(kind));
        }
    }

    #[test]
    fn test_priority_parse_and_order() {
        assert_eq!("HIGH".parse(), Ok(Priority::High));
        assert!("urgent".parse::<Priority>().is_err());
        assert!(Priority::Low < Priority::Medium);
        assert_eq!(Priority::default(), Priority::Medium);
    }

    #[test]
    fn test_builder() {
        let config = StrategyConfig::network_first(Some(Duration::from_millis(100)))
            .with_stale_time(Duration::from_secs(30))
            .with_gc_time(Duration::from_secs(300))
            .with_tag("user")
            .with_tag("activity")
            .with_priority(Priority::High);

        assert_eq!(config.strategy, StrategyKind::NetworkFirst);
        assert_eq!(config.network_timeout, Some(Duration::from_millis(100)));
        assert_eq!(config.tags.len(), 2);
        assert_eq!(config.priority, Priority::High);
        assert!(config.is_consistent());
    }

    #[test]
    fn test_gc_shorter_than_stale_is_inconsistent() {
        let config = StrategyConfig::cache_first(Duration::from_secs(600))
            .with_gc_time(Duration::from_secs(60));
        assert!(!config.is_consistent());
    }
}
