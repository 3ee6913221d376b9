//! In-memory Store Adapter backed by `DashMap`.
//!
//! Entries are sharded across `DashMap` buckets, so writes from concurrent
//! fetch tasks only contend when they land on the same shard. The
//! last-write-wins check and the write itself happen under the same shard
//! lock, which makes ordered writes atomic per key.
//!
//! # Garbage Collection
//!
//! `gcTime` is advisory. [`MemoryStore::gc`] removes entries that have no
//! subscribers and whose last write is older than their `gcTime`. A periodic
//! sweep can be started with [`MemoryStore::spawn_gc_daemon`].

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::traits::{CachedValue, EntrySnapshot, EntrySummary, GcResult, QueryStore, SetOptions, WriteOrder};
use crate::key::CacheKey;

/// Default interval between GC sweeps (in seconds).
pub const DEFAULT_GC_INTERVAL_SECS: u64 = 60;

/// Capacity of the store event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Change notification published by [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// New data was written.
    Updated(CacheKey),
    /// The entry was marked stale.
    Invalidated(CacheKey),
    /// The entry was removed.
    Removed(CacheKey),
    /// A fetch for the entry failed.
    Errored(CacheKey),
}

impl StoreEvent {
    /// The key this event refers to.
    pub fn key(&self) -> &CacheKey {
        match self {
            StoreEvent::Updated(k)
            | StoreEvent::Invalidated(k)
            | StoreEvent::Removed(k)
            | StoreEvent::Errored(k) => k,
        }
    }
}

#[derive(Debug)]
struct StoredEntry {
    data: Option<CachedValue>,
    error: Option<String>,
    stale_time: Duration,
    gc_time: Duration,
    last_written: Instant,
}

/// In-memory reference implementation of [`QueryStore`].
pub struct MemoryStore {
    entries: DashMap<CacheKey, StoredEntry>,
    subscribers: Arc<DashMap<CacheKey, usize>>,
    events: broadcast::Sender<StoreEvent>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            entries: DashMap::new(),
            subscribers: Arc::new(DashMap::new()),
            events,
        }
    }

    /// Subscribe to a key.
    ///
    /// The key counts as actively consumed for as long as the returned
    /// [`Subscription`] is alive.
    pub fn subscribe(&self, key: &CacheKey) -> Subscription {
        *self.subscribers.entry(key.clone()).or_insert(0) += 1;
        Subscription {
            key: key.clone(),
            subscribers: Arc::clone(&self.subscribers),
            receiver: self.events.subscribe(),
        }
    }

    /// Number of entries, including error-only entries.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Remove all entries.
    pub fn clear(&self) {
        let keys: Vec<CacheKey> = self.entries.iter().map(|e| e.key().clone()).collect();
        self.entries.clear();
        for key in keys {
            self.publish(StoreEvent::Removed(key));
        }
    }

    /// Evict inactive entries whose last write is older than their `gcTime`.
    pub fn gc(&self) -> GcResult {
        let start = std::time::Instant::now();
        let now = Instant::now();

        let expired: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|e| {
                now.saturating_duration_since(e.last_written) >= e.gc_time
                    && self.subscriber_count(e.key()) == 0
            })
            .map(|e| e.key().clone())
            .collect();

        let mut removed = 0;
        for key in expired {
            // Re-check under the shard lock; the entry may have been rewritten
            let evicted = self
                .entries
                .remove_if(&key, |k, e| {
                    Instant::now().saturating_duration_since(e.last_written) >= e.gc_time
                        && self.subscriber_count(k) == 0
                })
                .is_some();
            if evicted {
                removed += 1;
                self.publish(StoreEvent::Removed(key));
            }
        }

        GcResult {
            entries_removed: removed,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Start a background task that runs [`MemoryStore::gc`] periodically.
    ///
    /// The task stops when `cancellation` is cancelled.
    pub fn spawn_gc_daemon(
        self: &Arc<Self>,
        interval: Duration,
        cancellation: CancellationToken,
    ) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancellation.cancelled() => {
                        debug!("Store GC daemon stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        let result = store.gc();
                        if result.entries_removed > 0 {
                            debug!(removed = result.entries_removed, "{}", result);
                        }
                    }
                }
            }
        })
    }

    fn publish(&self, event: StoreEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryStore for MemoryStore {
    fn get(&self, key: &CacheKey) -> Option<CachedValue> {
        self.entries.get(key).and_then(|e| e.data.clone())
    }

    fn set(&self, key: &CacheKey, value: Value, options: SetOptions) -> bool {
        let now = Instant::now();
        let applied = match self.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                let superseded = options.order == WriteOrder::LastWriteWins
                    && entry
                        .data
                        .as_ref()
                        .is_some_and(|current| options.updated_at < current.updated_at);
                if superseded {
                    false
                } else {
                    entry.data = Some(CachedValue {
                        value,
                        updated_at: options.updated_at,
                        invalidated: false,
                    });
                    entry.error = None;
                    entry.stale_time = options.stale_time;
                    entry.gc_time = options.gc_time;
                    entry.last_written = now;
                    true
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(StoredEntry {
                    data: Some(CachedValue {
                        value,
                        updated_at: options.updated_at,
                        invalidated: false,
                    }),
                    error: None,
                    stale_time: options.stale_time,
                    gc_time: options.gc_time,
                    last_written: now,
                });
                true
            }
        };

        if applied {
            self.publish(StoreEvent::Updated(key.clone()));
        } else {
            trace!(key = %key, "Discarded write older than current entry");
        }
        applied
    }

    fn remove(&self, key: &CacheKey) -> bool {
        let existed = self.entries.remove(key).is_some();
        if existed {
            self.publish(StoreEvent::Removed(key.clone()));
        }
        existed
    }

    fn snapshot(&self, key: &CacheKey) -> Option<EntrySnapshot> {
        self.entries.get(key).map(|e| EntrySnapshot {
            data: e.data.clone(),
            error: e.error.clone(),
            stale_time: e.stale_time,
            gc_time: e.gc_time,
            written_at: e.last_written,
        })
    }

    fn restore(&self, key: &CacheKey, snapshot: Option<EntrySnapshot>) {
        match snapshot {
            Some(snapshot) => {
                self.entries.insert(
                    key.clone(),
                    StoredEntry {
                        data: snapshot.data,
                        error: snapshot.error,
                        stale_time: snapshot.stale_time,
                        gc_time: snapshot.gc_time,
                        last_written: snapshot.written_at,
                    },
                );
                self.publish(StoreEvent::Updated(key.clone()));
            }
            None => {
                self.remove(key);
            }
        }
    }

    fn invalidate(&self, predicate: &dyn Fn(&str) -> bool) -> Vec<CacheKey> {
        let mut invalidated = Vec::new();
        for mut entry in self.entries.iter_mut() {
            if !predicate(&entry.key().serialized()) {
                continue;
            }
            if let Some(data) = entry.data.as_mut() {
                data.invalidated = true;
            }
            invalidated.push(entry.key().clone());
        }

        for key in &invalidated {
            self.publish(StoreEvent::Invalidated(key.clone()));
        }
        invalidated
    }

    fn subscriber_count(&self, key: &CacheKey) -> usize {
        self.subscribers.get(key).map(|c| *c).unwrap_or(0)
    }

    fn record_error(&self, key: &CacheKey, error: &str) {
        let now = Instant::now();
        self.entries
            .entry(key.clone())
            .and_modify(|e| e.error = Some(error.to_string()))
            .or_insert_with(|| StoredEntry {
                data: None,
                error: Some(error.to_string()),
                stale_time: Duration::ZERO,
                gc_time: Duration::ZERO,
                last_written: now,
            });
        self.publish(StoreEvent::Errored(key.clone()));
    }

    fn summaries(&self) -> Vec<EntrySummary> {
        let now = Instant::now();
        self.entries
            .iter()
            .map(|e| EntrySummary {
                key: e.key().clone(),
                has_data: e.data.is_some(),
                is_stale: e
                    .data
                    .as_ref()
                    .is_some_and(|d| d.is_stale(e.stale_time, now)),
                has_error: e.error.is_some(),
                subscribers: self.subscriber_count(e.key()),
            })
            .collect()
    }
}

/// Active consumer of one key.
///
/// Dropping the subscription decrements the key's subscriber count.
pub struct Subscription {
    key: CacheKey,
    subscribers: Arc<DashMap<CacheKey, usize>>,
    receiver: broadcast::Receiver<StoreEvent>,
}

impl Subscription {
    /// The subscribed key.
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Wait for the next event concerning this key.
    ///
    /// Returns `None` once the store has been dropped.
    pub async fn next_event(&mut self) -> Option<StoreEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.key() == &self.key => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(key = %self.key, skipped = n, "Subscription lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Entry::Occupied(mut occupied) = self.subscribers.entry(self.key.clone()) {
            let count = occupied.get_mut();
            *count = count.saturating_sub(1);
            if *count == 0 {
                occupied.remove();
            }
        }
    }
}
