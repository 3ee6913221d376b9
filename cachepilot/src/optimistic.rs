//! Optimistic updates.
//!
//! A mutation that must show its effect before the server confirms it
//! writes the expected value into the cache with
//! [`OptimisticUpdateManager::begin`], then either commits the returned
//! snapshot on success or rolls it back on failure:
//!
//! ```ignore
//! let snapshot = orchestrator.begin_optimistic_update(&key, |current| {
//!     let mut profile = current.cloned().unwrap_or_else(|| json!({}));
//!     profile["name"] = json!("New");
//!     profile
//! });
//! match api.update_profile(&profile).await {
//!     Ok(_) => orchestrator.commit(snapshot),
//!     Err(_) => orchestrator.rollback(snapshot),
//! }
//! ```

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::executor::StrategyExecutor;
use crate::key::CacheKey;
use crate::store::{EntrySnapshot, SetOptions};
use crate::strategy::{StrategyConfig, StrategyRegistry};

/// Pre-update state of one key, including its staleness, invalidation and
/// error state.
///
/// Consumed by exactly one of [`OptimisticUpdateManager::commit`] or
/// [`OptimisticUpdateManager::rollback`]. Dropping it unresolved keeps the
/// optimistic value and logs a warning.
#[derive(Debug)]
#[must_use = "an optimistic snapshot must be committed or rolled back"]
pub struct OptimisticSnapshot {
    key: CacheKey,
    previous: Option<EntrySnapshot>,
    resolved: bool,
}

impl OptimisticSnapshot {
    /// The updated key.
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// The value before the update, if the key had one.
    pub fn previous(&self) -> Option<&Value> {
        self.previous
            .as_ref()
            .and_then(|entry| entry.data.as_ref())
            .map(|cached| &cached.value)
    }

    fn resolve(mut self) -> (CacheKey, Option<EntrySnapshot>) {
        self.resolved = true;
        (self.key.clone(), self.previous.take())
    }
}

impl Drop for OptimisticSnapshot {
    fn drop(&mut self) {
        if !self.resolved {
            warn!(key = %self.key, "Optimistic snapshot dropped without commit or rollback");
        }
    }
}

/// Applies and reverts optimistic cache writes.
pub struct OptimisticUpdateManager {
    executor: Arc<StrategyExecutor>,
    strategies: Arc<StrategyRegistry>,
}

impl OptimisticUpdateManager {
    /// Create a manager writing through `executor`'s store.
    pub fn new(executor: Arc<StrategyExecutor>, strategies: Arc<StrategyRegistry>) -> Self {
        Self { executor, strategies }
    }

    /// Write `updater(current)` to `key` and return the pre-update snapshot.
    ///
    /// Any fetch in flight for `key` is cancelled first so its response
    /// cannot overwrite the optimistic value.
    pub fn begin<F>(&self, key: &CacheKey, updater: F) -> OptimisticSnapshot
    where
        F: FnOnce(Option<&Value>) -> Value,
    {
        if self.executor.cancel(key) {
            debug!(key = %key, "Cancelled in-flight fetch for optimistic update");
        }

        let store = self.executor.store();
        let snapshot = OptimisticSnapshot {
            key: key.clone(),
            previous: store.snapshot(key),
            resolved: false,
        };
        let next = updater(snapshot.previous());

        let config = self.config_for(key);
        store.set(key, next, SetOptions::now(config.stale_time, config.gc_time).overwrite());
        debug!(key = %key, had_entry = snapshot.previous.is_some(), "Optimistic update applied");
        snapshot
    }

    /// Keep the optimistic value and discard the snapshot.
    pub fn commit(&self, snapshot: OptimisticSnapshot) {
        let (key, _) = snapshot.resolve();
        debug!(key = %key, "Optimistic update committed");
    }

    /// Restore the exact pre-update entry, or no entry at all if the key
    /// had none.
    pub fn rollback(&self, snapshot: OptimisticSnapshot) {
        let (key, previous) = snapshot.resolve();
        self.executor.store().restore(&key, previous);
        debug!(key = %key, "Optimistic update rolled back");
    }

    fn config_for(&self, key: &CacheKey) -> StrategyConfig {
        key.data_type()
            .and_then(|data_type| self.strategies.resolve(data_type).ok())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutorConfig;
    use crate::store::{MemoryStore, QueryStore};
    use crate::transport::fetch_fn;
    use serde_json::json;
    use std::time::Duration;

    fn manager() -> (Arc<MemoryStore>, Arc<StrategyExecutor>, OptimisticUpdateManager) {
        let store = Arc::new(MemoryStore::new());
        let executor = Arc::new(StrategyExecutor::new(store.clone(), ExecutorConfig::default()));
        let manager =
            OptimisticUpdateManager::new(Arc::clone(&executor), Arc::new(StrategyRegistry::with_presets()));
        (store, executor, manager)
    }

    fn rename(current: Option<&Value>) -> Value {
        let mut value = current.cloned().unwrap_or_else(|| json!({}));
        value["name"] = json!("New");
        value
    }

    #[tokio::test]
    async fn test_rollback_of_absent_key_removes_it() {
        let (store, _executor, manager) = manager();
        let key = CacheKey::new("user-profile", "u1");

        let snapshot = manager.begin(&key, rename);
        assert_eq!(snapshot.previous(), None);
        assert_eq!(store.get(&key).unwrap().value, json!({ "name": "New" }));

        manager.rollback(snapshot);
        assert!(store.get(&key).is_none());
        assert_eq!(store.entry_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rollback_restores_exact_previous_value() {
        let (store, _executor, manager) = manager();
        let key = CacheKey::new("user-profile", "u1");
        let original = json!({ "name": "Old", "level": 3 });
        store.set(&key, original.clone(), SetOptions::now(Duration::from_secs(60), Duration::from_secs(60)));
        let before = store.get(&key).unwrap();

        tokio::time::advance(Duration::from_secs(5)).await;
        let snapshot = manager.begin(&key, rename);
        assert_eq!(snapshot.previous(), Some(&original));
        assert_eq!(store.get(&key).unwrap().value, json!({ "name": "New", "level": 3 }));

        manager.rollback(snapshot);
        let after = store.get(&key).unwrap();
        assert_eq!(after.value, original);
        assert_eq!(after.updated_at, before.updated_at);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rollback_keeps_invalidation_and_stale_window() {
        let (store, _executor, manager) = manager();
        let key = CacheKey::new("user-profile", "u1");
        store.set(&key, json!({ "name": "Old" }), SetOptions::now(Duration::from_secs(7), Duration::from_secs(90)));
        store.invalidate(&|serialized| serialized.contains("user-profile"));
        let before = store.snapshot(&key).unwrap();

        tokio::time::advance(Duration::from_secs(1)).await;
        let snapshot = manager.begin(&key, rename);
        assert!(!store.get(&key).unwrap().invalidated);

        manager.rollback(snapshot);
        assert!(store.get(&key).unwrap().invalidated);
        assert_eq!(store.snapshot(&key), Some(before));
    }

    #[tokio::test]
    async fn test_rollback_keeps_error_only_entry() {
        let (store, _executor, manager) = manager();
        let key = CacheKey::new("user-profile", "u1");
        store.record_error(&key, "503 Service Unavailable");
        let before = store.snapshot(&key).unwrap();

        let snapshot = manager.begin(&key, rename);
        assert_eq!(snapshot.previous(), None);
        manager.rollback(snapshot);

        assert!(store.get(&key).is_none());
        assert_eq!(store.snapshot(&key), Some(before));
        assert_eq!(store.entry_count(), 1);
    }

    #[tokio::test]
    async fn test_commit_keeps_optimistic_value() {
        let (store, _executor, manager) = manager();
        let key = CacheKey::new("user-profile", "u1");

        let snapshot = manager.begin(&key, rename);
        manager.commit(snapshot);
        assert_eq!(store.get(&key).unwrap().value, json!({ "name": "New" }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_begin_cancels_in_flight_fetch() {
        let (store, executor, manager) = manager();
        let key = CacheKey::new("user-profile", "u1");
        let slow = fetch_fn(|_cancel| async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(json!({ "name": "Server" }))
        });

        let config = StrategyConfig::cache_first(Duration::from_secs(60));
        let read = executor.execute(&key, slow, &config);
        let update = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let snapshot = manager.begin(&key, rename);
            manager.commit(snapshot);
        };
        let (value, _) = tokio::join!(read, update);

        // The pending read resolves to the optimistic value and the server
        // response is discarded
        assert_eq!(value.unwrap(), json!({ "name": "New" }));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(store.get(&key).unwrap().value, json!({ "name": "New" }));
        assert!(executor.in_flight().is_empty());
    }
}
