//! The orchestrator service.

use std::sync::Arc;

use futures::future::join_all;
use parking_lot::RwLock;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use super::builder::OrchestratorBuilder;
use super::stats::CacheStats;
use crate::error::{CacheError, ConfigurationError};
use crate::executor::StrategyExecutor;
use crate::key::{CacheKey, KeySegment};
use crate::navigation::{NavigationLearner, NavigationPattern};
use crate::optimistic::{OptimisticSnapshot, OptimisticUpdateManager};
use crate::prefetch::{PredictivePrefetcher, PrefetchBatch};
use crate::reader::DataReader;
use crate::store::QueryStore;
use crate::strategy::StrategyConfig;
use crate::tags::{CacheTag, InvalidationReport, Invalidator, RefetchMode, TagRegistry};
use crate::transport::Fetcher;
use crate::warming::{CacheWarmer, WarmContext, WarmOptions, WarmReport};

/// Adaptive cache orchestration over a [`QueryStore`].
///
/// Owns the strategy and tag registries, the navigation learner and the
/// components that act on them. Construct one with [`CacheOrchestrator::builder`]
/// and share it by reference or `Arc`; there is no global instance.
pub struct CacheOrchestrator {
    pub(super) store: Arc<dyn QueryStore>,
    pub(super) executor: Arc<StrategyExecutor>,
    pub(super) reader: DataReader,
    pub(super) tags: Arc<TagRegistry>,
    pub(super) invalidator: Invalidator,
    pub(super) learner: Arc<NavigationLearner>,
    pub(super) prefetcher: PredictivePrefetcher,
    pub(super) optimistic: OptimisticUpdateManager,
    pub(super) warmer: CacheWarmer,
    pub(super) active_subject: RwLock<Option<String>>,
}

impl CacheOrchestrator {
    /// Start building an orchestrator.
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Register or replace the strategy for `data_type`.
    pub fn configure_strategy(&self, data_type: impl Into<String>, config: StrategyConfig) {
        self.reader.strategies().configure(data_type, config);
    }

    /// Register or replace the fetcher for `data_type`.
    pub fn register_fetcher(&self, data_type: impl Into<String>, fetcher: impl Fetcher + 'static) {
        self.reader.fetchers().register(data_type, fetcher);
    }

    /// Register or replace a tag. Rejects dependency cycles.
    pub fn register_tag(&self, tag: CacheTag) -> Result<(), ConfigurationError> {
        self.tags.register(tag)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Read a value through the data type's strategy.
    pub async fn read(
        &self,
        data_type: &str,
        subject_id: &str,
        params: Vec<KeySegment>,
    ) -> Result<Value, CacheError> {
        self.reader.read(data_type, subject_id, params).await
    }

    // =========================================================================
    // Invalidation
    // =========================================================================

    /// Invalidate every entry matched by `name` and its dependencies.
    pub async fn invalidate_tag(&self, name: &str, mode: RefetchMode) -> InvalidationReport {
        let report = self.invalidator.invalidate_by_tag(name, mode);
        self.refetch_active(&report).await;
        report
    }

    /// Invalidate every entry whose serialized key matches `pattern`.
    pub async fn invalidate_pattern(&self, pattern: &Regex, mode: RefetchMode) -> InvalidationReport {
        let report = self.invalidator.invalidate_by_pattern(pattern, mode);
        self.refetch_active(&report).await;
        report
    }

    /// Invalidate every entry keyed on `subject_id`.
    pub async fn invalidate_subject(&self, subject_id: &str, mode: RefetchMode) -> InvalidationReport {
        let report = self.invalidator.invalidate_for_subject(subject_id, mode);
        self.refetch_active(&report).await;
        report
    }

    /// Invalidate tagged entries older than their tag's TTL.
    pub fn expire_tagged_entries(&self) -> InvalidationReport {
        self.invalidator.expire()
    }

    async fn refetch_active(&self, report: &InvalidationReport) {
        if report.refetch.is_empty() {
            return;
        }
        let refetches = report.refetch.iter().map(|key| self.reader.refetch(key));
        let results = join_all(refetches).await;
        for (key, result) in report.refetch.iter().zip(results) {
            if let Err(e) = result {
                warn!(key = %key, error = %e, "Refetch after invalidation failed");
            }
        }
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    /// Set the subject that navigation-triggered prefetches load data for.
    pub fn set_active_subject(&self, subject_id: Option<String>) {
        *self.active_subject.write() = subject_id;
    }

    /// The current subject, if any.
    pub fn active_subject(&self) -> Option<String> {
        self.active_subject.read().clone()
    }

    /// Record a route transition and prefetch for the routes likely to follow
    /// `to`.
    ///
    /// Without an active subject the transition is only recorded.
    pub fn record_navigation(&self, from: &str, to: &str) -> PrefetchBatch {
        let pattern = self.learner.record(from, to);
        debug!(from = %from, to = %to, frequency = pattern.frequency, "Navigation recorded");
        self.trigger_predictive_prefetch(to)
    }

    /// Prefetch for the routes most often visited after `route`.
    pub fn trigger_predictive_prefetch(&self, route: &str) -> PrefetchBatch {
        match self.active_subject() {
            Some(subject_id) => self.prefetcher.trigger(route, &subject_id),
            None => {
                debug!(route = %route, "No active subject, skipping predictive prefetch");
                PrefetchBatch::default()
            }
        }
    }

    /// Learned navigation patterns.
    pub fn patterns(&self) -> Vec<NavigationPattern> {
        self.learner.patterns()
    }

    /// Drop patterns older than the configured maximum age.
    pub fn prune_patterns(&self) -> usize {
        self.learner.prune()
    }

    /// Forget every learned pattern.
    pub fn clear_patterns(&self) {
        self.learner.clear();
    }

    // =========================================================================
    // Optimistic updates
    // =========================================================================

    /// Write `updater(current)` to `key` ahead of server confirmation.
    pub fn begin_optimistic_update<F>(&self, key: &CacheKey, updater: F) -> OptimisticSnapshot
    where
        F: FnOnce(Option<&Value>) -> Value,
    {
        self.optimistic.begin(key, updater)
    }

    /// Keep an optimistic value.
    pub fn commit(&self, snapshot: OptimisticSnapshot) {
        self.optimistic.commit(snapshot);
    }

    /// Restore the state captured by `snapshot`.
    pub fn rollback(&self, snapshot: OptimisticSnapshot) {
        self.optimistic.rollback(snapshot);
    }

    // =========================================================================
    // Warming
    // =========================================================================

    /// Warm the subject's critical data.
    pub async fn warm_critical_data(&self, subject_id: &str, options: WarmOptions) -> WarmReport {
        self.warmer.warm_critical_data(subject_id, options).await
    }

    /// Warm the data types of a route context.
    pub async fn warm_contextual_data(&self, subject_id: &str, context: WarmContext) -> WarmReport {
        self.warmer.warm_contextual_data(subject_id, context).await
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Current cache and registry statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            pattern_count: self.learner.len(),
            strategy_count: self.reader.strategies().len(),
            tag_count: self.tags.len(),
            in_flight: self.executor.in_flight().len(),
            counters: self.executor.metrics(),
            ..Default::default()
        };
        for entry in self.store.summaries() {
            stats.total_entries += 1;
            if entry.subscribers > 0 {
                stats.active_entries += 1;
            }
            if entry.has_data && entry.is_stale {
                stats.stale_entries += 1;
            }
            if entry.has_error {
                stats.error_entries += 1;
            }
        }
        stats
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn QueryStore> {
        &self.store
    }

    /// The strategy executor.
    pub fn executor(&self) -> &Arc<StrategyExecutor> {
        &self.executor
    }

    /// The data reader shared by prefetch and warming.
    pub fn reader(&self) -> &DataReader {
        &self.reader
    }

    /// The navigation learner.
    pub fn learner(&self) -> &Arc<NavigationLearner> {
        &self.learner
    }

    /// The tag registry.
    pub fn tags(&self) -> &Arc<TagRegistry> {
        &self.tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::store::{MemoryStore, SetOptions};
    use crate::transport::{BoxFuture, FetchRequest, FetchResult};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn counting_fetcher(calls: Arc<AtomicUsize>) -> impl Fetcher + 'static {
        move |request: FetchRequest, _cancel: CancellationToken| -> BoxFuture<'static, FetchResult> {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            Box::pin(async move { Ok(json!({ "subject": request.subject_id, "version": n })) })
        }
    }

    #[tokio::test]
    async fn test_unknown_data_type_is_configuration_error() {
        let orchestrator = CacheOrchestrator::builder().without_presets().build().unwrap();
        let err = orchestrator.read("nope", "u1", vec![]).await.unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_configure_strategy_at_runtime() {
        let calls = Arc::new(AtomicUsize::new(0));
        let orchestrator = CacheOrchestrator::builder()
            .without_presets()
            .fetcher("widgets", counting_fetcher(calls.clone()))
            .build()
            .unwrap();

        orchestrator.configure_strategy("widgets", StrategyConfig::cache_first(Duration::from_secs(60)));
        orchestrator.read("widgets", "w1", vec![]).await.unwrap();
        orchestrator.read("widgets", "w1", vec![]).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(orchestrator.stats().strategy_count, 1);
    }

    #[tokio::test]
    async fn test_record_navigation_without_subject_only_records() {
        let orchestrator = CacheOrchestrator::builder().build().unwrap();
        for _ in 0..3 {
            let batch = orchestrator.record_navigation("/dashboard", "/profile");
            assert!(batch.is_empty());
        }
        assert_eq!(orchestrator.patterns().len(), 1);
        assert_eq!(orchestrator.stats().pattern_count, 1);

        orchestrator.clear_patterns();
        assert!(orchestrator.patterns().is_empty());
    }

    #[tokio::test]
    async fn test_active_invalidation_refetches_subscribed_keys() {
        let calls = Arc::new(AtomicUsize::new(0));
        let store = Arc::new(MemoryStore::new());
        let orchestrator = CacheOrchestrator::builder()
            .store(store.clone())
            .fetcher("user-profile", counting_fetcher(calls.clone()))
            .fetcher("achievements", counting_fetcher(calls.clone()))
            .build()
            .unwrap();
        orchestrator.register_tag(CacheTag::for_segment("u1").unwrap()).unwrap();

        orchestrator.read("user-profile", "u1", vec![]).await.unwrap();
        orchestrator.read("achievements", "u1", vec![]).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let profile = CacheKey::new("user-profile", "u1");
        let _subscription = store.subscribe(&profile);

        let report = orchestrator.invalidate_tag("u1", RefetchMode::Active).await;
        assert_eq!(report.invalidated.len(), 2);
        assert_eq!(report.refetch, vec![profile.clone()]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        // Refetched entry is fresh again, the other stays invalidated
        assert!(!store.get(&profile).unwrap().invalidated);
        assert!(store.get(&CacheKey::new("achievements", "u1")).unwrap().invalidated);
    }

    #[tokio::test]
    async fn test_stats_counts_entries() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = CacheOrchestrator::builder()
            .store(store.clone())
            .fetcher("user-profile", |_request: FetchRequest, _cancel: CancellationToken| async {
                Err::<Value, _>(TransportError::failed("offline"))
            })
            .build()
            .unwrap();

        let fresh = CacheKey::new("activity", "u1");
        let stale = CacheKey::new("achievements", "u1");
        store.set(&fresh, json!(1), SetOptions::now(Duration::from_secs(60), Duration::from_secs(600)));
        store.set(&stale, json!(2), SetOptions::now(Duration::ZERO, Duration::from_secs(600)));
        let _subscription = store.subscribe(&fresh);

        assert!(orchestrator.read("user-profile", "u1", vec![]).await.is_err());

        let stats = orchestrator.stats();
        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.active_entries, 1);
        assert_eq!(stats.stale_entries, 1);
        assert_eq!(stats.error_entries, 1);
        assert_eq!(stats.strategy_count, 6);
        assert_eq!(stats.counters.failures, 1);
    }
}
