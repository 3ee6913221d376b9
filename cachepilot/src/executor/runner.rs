//! The four read strategies.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use super::config::ExecutorConfig;
use super::inflight::{InFlightRequests, Join, SharedFetch, WriteTarget};
use super::metrics::{ExecutorMetrics, MetricsSnapshot};
use crate::error::TransportError;
use crate::key::CacheKey;
use crate::store::{CachedValue, QueryStore};
use crate::strategy::{StrategyConfig, StrategyKind};
use crate::transport::{FetchFn, FetchResult};

/// State of a key as seen by a strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    /// Entry younger than the staleness window.
    Fresh(CachedValue),
    /// Entry present but stale or invalidated.
    Stale(CachedValue),
    /// No data for the key.
    Missing,
}

impl CacheLookup {
    /// The cached value, fresh or stale.
    pub fn into_value(self) -> Option<Value> {
        match self {
            CacheLookup::Fresh(cached) | CacheLookup::Stale(cached) => Some(cached.value),
            CacheLookup::Missing => None,
        }
    }
}

/// Executes reads against a [`QueryStore`] with per-key fetch deduplication.
pub struct StrategyExecutor {
    store: Arc<dyn QueryStore>,
    in_flight: InFlightRequests,
    metrics: Arc<ExecutorMetrics>,
}

impl StrategyExecutor {
    /// Create an executor over `store`.
    pub fn new(store: Arc<dyn QueryStore>, config: ExecutorConfig) -> Self {
        let metrics = Arc::new(ExecutorMetrics::new());
        let in_flight =
            InFlightRequests::new(Arc::clone(&store), Arc::clone(&metrics), config.abandon_after);
        Self {
            store,
            in_flight,
            metrics,
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn QueryStore> {
        &self.store
    }

    /// Current counter values.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Running fetches.
    pub fn in_flight(&self) -> &InFlightRequests {
        &self.in_flight
    }

    /// Cancel the running fetch for `key`, if any.
    pub fn cancel(&self, key: &CacheKey) -> bool {
        self.in_flight.cancel(key)
    }

    /// Classify the current entry for `key`.
    pub fn lookup(&self, key: &CacheKey, stale_time: Duration) -> CacheLookup {
        match self.store.get(key) {
            Some(cached) if cached.is_stale(stale_time, Instant::now()) => CacheLookup::Stale(cached),
            Some(cached) => CacheLookup::Fresh(cached),
            None => CacheLookup::Missing,
        }
    }

    /// Read `key` using the strategy in `config`.
    pub async fn execute(&self, key: &CacheKey, fetch: FetchFn, config: &StrategyConfig) -> FetchResult {
        match config.strategy {
            StrategyKind::CacheFirst => self.cache_first(key, &fetch, config).await,
            StrategyKind::NetworkFirst => self.network_first(key, &fetch, config).await,
            StrategyKind::StaleWhileRevalidate => self.stale_while_revalidate(key, &fetch, config).await,
            StrategyKind::NetworkOnly => self.network_only(key, &fetch, config).await,
        }
    }

    /// Populate `key` with cache-first semantics.
    ///
    /// Returns `Ok(false)` without touching the transport when a fresh entry
    /// already exists.
    pub async fn prefetch(
        &self,
        key: &CacheKey,
        fetch: FetchFn,
        config: &StrategyConfig,
    ) -> Result<bool, TransportError> {
        if let CacheLookup::Fresh(_) = self.lookup(key, config.stale_time) {
            trace!(key = %key, "Prefetch skipped, entry is fresh");
            return Ok(false);
        }
        self.fetch(key, &fetch, target(config)).await.map(|_| true)
    }

    /// Fetch `key` regardless of its current state, joining a running fetch.
    pub async fn refetch(&self, key: &CacheKey, fetch: FetchFn, config: &StrategyConfig) -> FetchResult {
        self.fetch(key, &fetch, target(config)).await
    }

    async fn cache_first(&self, key: &CacheKey, fetch: &FetchFn, config: &StrategyConfig) -> FetchResult {
        if let CacheLookup::Fresh(cached) = self.lookup(key, config.stale_time) {
            self.metrics.cache_hit();
            debug!(key = %key, "Cache hit");
            return Ok(cached.value);
        }
        self.metrics.cache_miss();
        self.fetch(key, fetch, target(config)).await
    }

    async fn network_first(&self, key: &CacheKey, fetch: &FetchFn, config: &StrategyConfig) -> FetchResult {
        self.metrics.cache_miss();
        let shared = self.start(key, fetch, target(config));

        let result = match config.network_timeout {
            // The fetch task keeps running past the timeout and still writes
            // its result when it settles.
            Some(timeout) => match tokio::time::timeout(timeout, shared).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout(timeout)),
            },
            None => shared.await,
        };

        match result {
            Ok(value) => Ok(value),
            Err(e) => match self.store.get(key) {
                Some(cached) => {
                    self.metrics.fallback();
                    warn!(key = %key, error = %e, "Network read failed, serving cached value");
                    Ok(cached.value)
                }
                None => Err(e),
            },
        }
    }

    async fn stale_while_revalidate(
        &self,
        key: &CacheKey,
        fetch: &FetchFn,
        config: &StrategyConfig,
    ) -> FetchResult {
        match self.lookup(key, config.stale_time) {
            CacheLookup::Fresh(cached) => {
                self.metrics.cache_hit();
                debug!(key = %key, "Cache hit");
                Ok(cached.value)
            }
            CacheLookup::Stale(cached) => {
                self.metrics.cache_hit();
                self.revalidate(key, fetch, config);
                Ok(cached.value)
            }
            CacheLookup::Missing => {
                self.metrics.cache_miss();
                self.fetch(key, fetch, target(config)).await
            }
        }
    }

    async fn network_only(&self, key: &CacheKey, fetch: &FetchFn, config: &StrategyConfig) -> FetchResult {
        self.metrics.cache_miss();
        self.store.remove(key);
        let target = WriteTarget {
            stale_time: Duration::ZERO,
            gc_time: config.gc_time,
        };
        match self.in_flight.join_or_start(key, fetch, target) {
            Join::Started(shared) => self.settle(key, shared).await,
            Join::Joined(shared) => {
                let result = self.settle(key, shared).await;
                if result.is_ok() {
                    // The joined fetch wrote with its own staleness window
                    let serialized = key.serialized();
                    self.store.invalidate(&|candidate: &str| candidate == serialized);
                    trace!(key = %key, "Network-only read joined a fetch, entry marked stale");
                }
                result
            }
        }
    }

    /// Start a background revalidation that the caller does not await.
    fn revalidate(&self, key: &CacheKey, fetch: &FetchFn, config: &StrategyConfig) {
        self.metrics.revalidation();
        debug!(key = %key, "Revalidating stale entry in background");

        let first = self.start(key, fetch, target(config));
        let in_flight = self.in_flight.clone();
        let key = key.clone();
        let fetch = Arc::clone(fetch);
        let write_target = target(config);
        let retry = config.retry_on_stale;

        tokio::spawn(async move {
            let e = match first.await {
                Ok(_) | Err(TransportError::Cancelled) => return,
                Err(e) => e,
            };
            if !retry {
                warn!(key = %key, error = %e, "Background revalidation failed");
                return;
            }
            warn!(key = %key, error = %e, "Background revalidation failed, retrying once");
            match in_flight.join_or_start(&key, &fetch, write_target).into_shared().await {
                Ok(_) | Err(TransportError::Cancelled) => {}
                Err(e) => warn!(key = %key, error = %e, "Background revalidation retry failed"),
            }
        });
    }

    fn start(&self, key: &CacheKey, fetch: &FetchFn, target: WriteTarget) -> SharedFetch {
        self.in_flight.join_or_start(key, fetch, target).into_shared()
    }

    /// Await a (possibly joined) fetch.
    ///
    /// A fetch cancelled by an optimistic write resolves to the value that
    /// replaced it.
    async fn fetch(&self, key: &CacheKey, fetch: &FetchFn, target: WriteTarget) -> FetchResult {
        self.settle(key, self.start(key, fetch, target)).await
    }

    async fn settle(&self, key: &CacheKey, shared: SharedFetch) -> FetchResult {
        match shared.await {
            Err(TransportError::Cancelled) => match self.store.get(key) {
                Some(cached) => Ok(cached.value),
                None => Err(TransportError::Cancelled),
            },
            result => result,
        }
    }
}

fn target(config: &StrategyConfig) -> WriteTarget {
    WriteTarget {
        stale_time: config.stale_time,
        gc_time: config.gc_time,
    }
}
