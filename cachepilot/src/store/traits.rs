//! Core traits and value types for the Store Adapter contract.
//!
//! # Design Principles
//!
//! - **Synchronous surface**: reads and writes never suspend; only transport
//!   fetches do
//! - **JSON values**: entries hold `serde_json::Value`, so optimistic updaters
//!   can patch fields without knowing the concrete type
//! - **Ordered writes**: every write carries the instant its originating request
//!   started, and stale writes are rejected
//! - **Dyn-compatible**: used as `Arc<dyn QueryStore>` by every component

use std::fmt;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use crate::key::CacheKey;

/// A cached value with its write timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedValue {
    /// The stored data.
    pub value: Value,
    /// When the request that produced this value started.
    pub updated_at: Instant,
    /// Set by invalidation; an invalidated entry is always stale.
    pub invalidated: bool,
}

impl CachedValue {
    /// Age of the entry at `now`.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.updated_at)
    }

    /// Whether the entry is stale for the given staleness window.
    ///
    /// Entries younger than `stale_time` are never stale unless invalidated.
    pub fn is_stale(&self, stale_time: Duration, now: Instant) -> bool {
        self.invalidated || self.age(now) >= stale_time
    }
}

/// How a write interacts with the entry's current timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOrder {
    /// Discard the write if it is older than the entry's `updated_at`.
    LastWriteWins,
    /// Always apply the write (optimistic updates and rollbacks).
    Overwrite,
}

/// Options for [`QueryStore::set`].
#[derive(Debug, Clone, Copy)]
pub struct SetOptions {
    /// Staleness window recorded with the entry.
    pub stale_time: Duration,
    /// Advisory eviction horizon for inactive entries.
    pub gc_time: Duration,
    /// Start instant of the request that produced the value.
    pub updated_at: Instant,
    /// Ordering rule for this write.
    pub order: WriteOrder,
}

impl SetOptions {
    /// Last-write-wins options stamped with a request start instant.
    pub fn stamped(updated_at: Instant, stale_time: Duration, gc_time: Duration) -> Self {
        Self {
            stale_time,
            gc_time,
            updated_at,
            order: WriteOrder::LastWriteWins,
        }
    }

    /// Last-write-wins options stamped with the current instant.
    pub fn now(stale_time: Duration, gc_time: Duration) -> Self {
        Self::stamped(Instant::now(), stale_time, gc_time)
    }

    /// Switch to overwrite ordering.
    pub fn overwrite(mut self) -> Self {
        self.order = WriteOrder::Overwrite;
        self
    }
}

/// Complete state of one stored entry.
///
/// Taken with [`QueryStore::snapshot`] and put back verbatim with
/// [`QueryStore::restore`].
#[derive(Debug, Clone, PartialEq)]
pub struct EntrySnapshot {
    /// The data, absent for error-only entries.
    pub data: Option<CachedValue>,
    /// The recorded fetch error, if any.
    pub error: Option<String>,
    /// Staleness window recorded with the entry.
    pub stale_time: Duration,
    /// Eviction horizon recorded with the entry.
    pub gc_time: Duration,
    /// When the entry was last written; drives garbage collection.
    pub written_at: Instant,
}

/// Point-in-time description of one entry, used for statistics.
#[derive(Debug, Clone)]
pub struct EntrySummary {
    /// The entry's key.
    pub key: CacheKey,
    /// Whether the entry currently holds data.
    pub has_data: bool,
    /// Whether the entry is stale by its recorded staleness window.
    pub is_stale: bool,
    /// Whether the last fetch for this entry failed.
    pub has_error: bool,
    /// Number of active subscribers.
    pub subscribers: usize,
}

/// Result of a garbage collection sweep.
#[derive(Debug, Clone, Default)]
pub struct GcResult {
    /// Number of entries removed during GC.
    pub entries_removed: usize,
    /// Duration of the sweep in milliseconds.
    pub duration_ms: u64,
}

impl fmt::Display for GcResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GC: removed {} entries in {}ms",
            self.entries_removed, self.duration_ms
        )
    }
}

/// Store Adapter contract consumed by the orchestration layer.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync`; the executor writes from
/// spawned fetch tasks while foreground reads happen concurrently.
pub trait QueryStore: Send + Sync {
    /// Read the current data for a key.
    ///
    /// Returns `None` if the key is absent or holds only an error.
    fn get(&self, key: &CacheKey) -> Option<CachedValue>;

    /// Write a value.
    ///
    /// Clears any invalidation flag and recorded error. Returns `false` if the
    /// write was discarded by [`WriteOrder::LastWriteWins`].
    fn set(&self, key: &CacheKey, value: Value, options: SetOptions) -> bool;

    /// Remove a key entirely. Returns `true` if it existed.
    fn remove(&self, key: &CacheKey) -> bool;

    /// Capture the complete state of a key, or `None` if it has no entry.
    fn snapshot(&self, key: &CacheKey) -> Option<EntrySnapshot>;

    /// Replace the entry of a key with a captured state, ignoring write
    /// ordering. `None` removes the entry.
    fn restore(&self, key: &CacheKey, snapshot: Option<EntrySnapshot>);

    /// Mark every entry whose serialized key satisfies `predicate` as stale.
    ///
    /// Returns the keys that were invalidated; refetching is the caller's
    /// decision.
    fn invalidate(&self, predicate: &dyn Fn(&str) -> bool) -> Vec<CacheKey>;

    /// Number of active consumers of a key.
    fn subscriber_count(&self, key: &CacheKey) -> usize;

    /// Record a fetch failure for a key without touching its data.
    fn record_error(&self, key: &CacheKey, error: &str);

    /// Describe every entry for statistics.
    fn summaries(&self) -> Vec<EntrySummary>;
}
