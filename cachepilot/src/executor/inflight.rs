//! In-flight fetch deduplication.
//!
//! At most one fetch task exists per key. The task's result is exposed as a
//! `futures::future::Shared` so every joined caller observes the same
//! outcome. The task removes its own registration when it settles; a
//! generation id prevents it from removing a newer registration for the
//! same key (after a cancellation, for example).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{FutureExt, Shared};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::metrics::ExecutorMetrics;
use crate::error::TransportError;
use crate::key::CacheKey;
use crate::store::{QueryStore, SetOptions};
use crate::transport::{BoxFuture, FetchFn, FetchResult};

/// Shared handle on an in-flight fetch result.
pub type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

/// Where and how a settled fetch writes its value.
#[derive(Debug, Clone, Copy)]
pub struct WriteTarget {
    /// Staleness window recorded with the written entry.
    pub stale_time: Duration,
    /// Eviction horizon recorded with the written entry.
    pub gc_time: Duration,
}

/// Outcome of [`InFlightRequests::join_or_start`].
pub enum Join {
    /// A new fetch task was started.
    Started(SharedFetch),
    /// An existing fetch task was joined.
    Joined(SharedFetch),
}

impl Join {
    /// Whether an existing fetch was joined.
    pub fn is_joined(&self) -> bool {
        matches!(self, Join::Joined(_))
    }

    /// The shared result future.
    pub fn into_shared(self) -> SharedFetch {
        match self {
            Join::Started(f) | Join::Joined(f) => f,
        }
    }
}

struct InFlight {
    id: u64,
    cancel: CancellationToken,
    result: SharedFetch,
}

/// Registry of running fetch tasks, keyed by cache key.
#[derive(Clone)]
pub struct InFlightRequests {
    requests: Arc<DashMap<CacheKey, InFlight>>,
    next_id: Arc<AtomicU64>,
    store: Arc<dyn QueryStore>,
    metrics: Arc<ExecutorMetrics>,
    abandon_after: Duration,
}

impl InFlightRequests {
    /// Create an empty registry writing into `store`.
    pub fn new(
        store: Arc<dyn QueryStore>,
        metrics: Arc<ExecutorMetrics>,
        abandon_after: Duration,
    ) -> Self {
        Self {
            requests: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(0)),
            store,
            metrics,
            abandon_after,
        }
    }

    /// Join the running fetch for `key`, or start one with `fetch`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn join_or_start(&self, key: &CacheKey, fetch: &FetchFn, target: WriteTarget) -> Join {
        match self.requests.entry(key.clone()) {
            Entry::Occupied(occupied) => {
                self.metrics.deduplicated();
                trace!(key = %key, "Joined in-flight fetch");
                Join::Joined(occupied.get().result.clone())
            }
            Entry::Vacant(vacant) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let cancel = CancellationToken::new();
                self.metrics.network_request();

                // The task blocks on this shard if it settles before the
                // registration below is inserted, so removal always follows it.
                let task = tokio::spawn(run_fetch(FetchTask {
                    key: key.clone(),
                    id,
                    fetch: Arc::clone(fetch),
                    cancel: cancel.clone(),
                    started_at: Instant::now(),
                    target,
                    abandon_after: self.abandon_after,
                    registry: self.clone(),
                }));

                let result: BoxFuture<'static, FetchResult> = async move {
                    match task.await {
                        Ok(result) => result,
                        Err(e) => Err(TransportError::failed(format!("fetch task failed: {}", e))),
                    }
                }
                .boxed();
                let result = result.shared();

                vacant.insert(InFlight {
                    id,
                    cancel,
                    result: result.clone(),
                });
                Join::Started(result)
            }
        }
    }

    /// Cancel the running fetch for `key`, if any.
    ///
    /// Joined callers observe [`TransportError::Cancelled`] and the fetch
    /// result, if it still arrives, is not written.
    pub fn cancel(&self, key: &CacheKey) -> bool {
        match self.requests.remove(key) {
            Some((_, in_flight)) => {
                in_flight.cancel.cancel();
                debug!(key = %key, "Cancelled in-flight fetch");
                true
            }
            None => false,
        }
    }

    /// Whether a fetch is running for `key`.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.requests.contains_key(key)
    }

    /// Number of running fetches.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Whether no fetch is running.
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    fn settle(&self, key: &CacheKey, id: u64) {
        self.requests.remove_if(key, |_, in_flight| in_flight.id == id);
    }
}

struct FetchTask {
    key: CacheKey,
    id: u64,
    fetch: FetchFn,
    cancel: CancellationToken,
    started_at: Instant,
    target: WriteTarget,
    abandon_after: Duration,
    registry: InFlightRequests,
}

async fn run_fetch(task: FetchTask) -> FetchResult {
    let FetchTask {
        key,
        id,
        fetch,
        cancel,
        started_at,
        target,
        abandon_after,
        registry,
    } = task;

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TransportError::Cancelled),
        _ = tokio::time::sleep(abandon_after) => {
            cancel.cancel();
            Err(TransportError::Timeout(abandon_after))
        }
        result = fetch(cancel.clone()) => result,
    };

    match &result {
        Ok(_) if cancel.is_cancelled() => {
            debug!(key = %key, "Discarding result of cancelled fetch");
        }
        Ok(value) => {
            let options = SetOptions::stamped(started_at, target.stale_time, target.gc_time);
            if !registry.store.set(&key, value.clone(), options) {
                debug!(key = %key, "Fetch result superseded by a newer write");
            }
        }
        Err(TransportError::Cancelled) => {}
        Err(e) => {
            registry.metrics.failure();
            registry.store.record_error(&key, &e.to_string());
        }
    }

    registry.settle(&key, id);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::transport::fetch_fn;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    const TARGET: WriteTarget = WriteTarget {
        stale_time: Duration::from_secs(5),
        gc_time: Duration::from_secs(60),
    };

    fn registry(store: Arc<MemoryStore>) -> InFlightRequests {
        InFlightRequests::new(store, Arc::new(ExecutorMetrics::new()), Duration::from_secs(30))
    }

    fn counting_fetch(calls: Arc<AtomicUsize>, delay: Duration) -> FetchFn {
        fetch_fn(move |_cancel| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                Ok(json!("value"))
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_joins_share_one_fetch() {
        let store = Arc::new(MemoryStore::new());
        let requests = registry(Arc::clone(&store));
        let calls = Arc::new(AtomicUsize::new(0));
        let fetch = counting_fetch(Arc::clone(&calls), Duration::from_millis(50));
        let key = CacheKey::new("user-profile", "u1");

        let first = requests.join_or_start(&key, &fetch, TARGET);
        let second = requests.join_or_start(&key, &fetch, TARGET);
        assert!(!first.is_joined());
        assert!(second.is_joined());

        let (a, b) = tokio::join!(first.into_shared(), second.into_shared());
        assert_eq!(a.unwrap(), json!("value"));
        assert_eq!(b.unwrap(), json!("value"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Settled fetch wrote through and deregistered
        assert_eq!(store.get(&key).unwrap().value, json!("value"));
        assert!(requests.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_discards_result() {
        let store = Arc::new(MemoryStore::new());
        let requests = registry(Arc::clone(&store));
        let calls = Arc::new(AtomicUsize::new(0));
        let fetch = counting_fetch(calls, Duration::from_millis(50));
        let key = CacheKey::new("user-profile", "u1");

        let shared = requests.join_or_start(&key, &fetch, TARGET).into_shared();
        assert!(requests.cancel(&key));
        assert!(!requests.cancel(&key));

        assert_eq!(shared.await, Err(TransportError::Cancelled));
        assert!(store.get(&key).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_fetch_times_out() {
        let store = Arc::new(MemoryStore::new());
        let requests =
            InFlightRequests::new(store.clone(), Arc::new(ExecutorMetrics::new()), Duration::from_secs(1));
        let fetch = fetch_fn(|cancel: CancellationToken| async move {
            cancel.cancelled().await;
            Err(TransportError::Cancelled)
        });
        let key = CacheKey::new("activity", "u1");

        let result = requests.join_or_start(&key, &fetch, TARGET).into_shared().await;
        assert_eq!(result, Err(TransportError::Timeout(Duration::from_secs(1))));
        assert!(requests.is_empty());
        assert_eq!(store.summaries().iter().filter(|s| s.has_error).count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_recorded() {
        let store = Arc::new(MemoryStore::new());
        let metrics = Arc::new(ExecutorMetrics::new());
        let requests = InFlightRequests::new(store.clone(), metrics.clone(), Duration::from_secs(30));
        let fetch = fetch_fn(|_cancel| async { Err(TransportError::failed("503")) });
        let key = CacheKey::new("activity", "u1");

        let result = requests.join_or_start(&key, &fetch, TARGET).into_shared().await;
        assert!(result.is_err());
        assert_eq!(metrics.snapshot().failures, 1);
        assert!(store.summaries()[0].has_error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_fetch_after_settle() {
        let store = Arc::new(MemoryStore::new());
        let requests = registry(store);
        let calls = Arc::new(AtomicUsize::new(0));
        let fetch = counting_fetch(Arc::clone(&calls), Duration::from_millis(1));
        let key = CacheKey::new("user-profile", "u1");

        requests.join_or_start(&key, &fetch, TARGET).into_shared().await.unwrap();
        let again = requests.join_or_start(&key, &fetch, TARGET);
        assert!(!again.is_joined());
        again.into_shared().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
