//! Orchestrator builder.

use std::sync::Arc;

use parking_lot::RwLock;

use super::service::CacheOrchestrator;
use crate::error::ConfigurationError;
use crate::executor::{ExecutorConfig, StrategyExecutor};
use crate::navigation::{LearnerConfig, NavigationLearner, RouteDataMap, SnapshotStore};
use crate::optimistic::OptimisticUpdateManager;
use crate::prefetch::{PredictivePrefetcher, PrefetchConfig};
use crate::reader::DataReader;
use crate::store::{MemoryStore, QueryStore};
use crate::strategy::{StrategyConfig, StrategyRegistry};
use crate::tags::{CacheTag, Invalidator, TagRegistry};
use crate::transport::{Fetcher, FetcherRegistry};
use crate::warming::{CacheWarmer, WarmingPlan};

/// Assembles a [`CacheOrchestrator`].
///
/// Defaults: an in-memory store, the built-in strategy presets, the standard
/// route map and warming plan, and no navigation persistence.
pub struct OrchestratorBuilder {
    store: Option<Arc<dyn QueryStore>>,
    strategies: StrategyRegistry,
    fetchers: FetcherRegistry,
    tags: Vec<CacheTag>,
    executor: ExecutorConfig,
    routes: RouteDataMap,
    learner: LearnerConfig,
    prefetch: PrefetchConfig,
    warming: WarmingPlan,
    persistence: Option<Arc<dyn SnapshotStore>>,
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestratorBuilder {
    /// Builder with default settings.
    pub fn new() -> Self {
        Self {
            store: None,
            strategies: StrategyRegistry::with_presets(),
            fetchers: FetcherRegistry::new(),
            tags: Vec::new(),
            executor: ExecutorConfig::default(),
            routes: RouteDataMap::standard(),
            learner: LearnerConfig::default(),
            prefetch: PrefetchConfig::default(),
            warming: WarmingPlan::standard(),
            persistence: None,
        }
    }

    /// Use `store` instead of a fresh [`MemoryStore`].
    pub fn store(mut self, store: Arc<dyn QueryStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Start from an empty strategy registry instead of the presets.
    pub fn without_presets(mut self) -> Self {
        self.strategies = StrategyRegistry::new();
        self
    }

    /// Register a strategy.
    pub fn strategy(self, data_type: impl Into<String>, config: StrategyConfig) -> Self {
        self.strategies.configure(data_type, config);
        self
    }

    /// Strategy for data types without a registration.
    pub fn fallback_strategy(mut self, config: StrategyConfig) -> Self {
        self.strategies = self.strategies.with_fallback(config);
        self
    }

    /// Register a fetcher.
    pub fn fetcher(self, data_type: impl Into<String>, fetcher: impl Fetcher + 'static) -> Self {
        self.fetchers.register(data_type, fetcher);
        self
    }

    /// Register a tag at build time.
    pub fn tag(mut self, tag: CacheTag) -> Self {
        self.tags.push(tag);
        self
    }

    /// Executor settings.
    pub fn executor_config(mut self, config: ExecutorConfig) -> Self {
        self.executor = config;
        self
    }

    /// Route → data-type map for new navigation patterns.
    pub fn routes(mut self, routes: RouteDataMap) -> Self {
        self.routes = routes;
        self
    }

    /// Navigation learner settings.
    pub fn learner_config(mut self, config: LearnerConfig) -> Self {
        self.learner = config;
        self
    }

    /// Predictive prefetch settings.
    pub fn prefetch_config(mut self, config: PrefetchConfig) -> Self {
        self.prefetch = config;
        self
    }

    /// Warming plan.
    pub fn warming_plan(mut self, plan: WarmingPlan) -> Self {
        self.warming = plan;
        self
    }

    /// Persist navigation patterns to `store`.
    pub fn persistence(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.persistence = Some(store);
        self
    }

    /// Build the orchestrator.
    ///
    /// Fails if the registered tags contain a dependency cycle.
    pub fn build(self) -> Result<CacheOrchestrator, ConfigurationError> {
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn QueryStore>);
        let strategies = Arc::new(self.strategies);
        let fetchers = Arc::new(self.fetchers);
        let executor = Arc::new(StrategyExecutor::new(Arc::clone(&store), self.executor));
        let reader = DataReader::new(Arc::clone(&strategies), fetchers, Arc::clone(&executor));

        let tags = Arc::new(TagRegistry::new());
        for tag in self.tags {
            tags.register(tag)?;
        }
        let invalidator =
            Invalidator::new(Arc::clone(&tags), Arc::clone(&store)).with_strategies(Arc::clone(&strategies));

        let mut learner = NavigationLearner::new(self.routes, self.learner);
        if let Some(persistence) = self.persistence {
            learner = learner.with_persistence(persistence);
        }
        let learner = Arc::new(learner);
        let prefetcher = PredictivePrefetcher::new(Arc::clone(&learner), reader.clone(), self.prefetch);

        let optimistic = OptimisticUpdateManager::new(Arc::clone(&executor), Arc::clone(&strategies));
        let warmer = CacheWarmer::new(reader.clone(), self.warming);

        Ok(CacheOrchestrator {
            store,
            executor,
            reader,
            tags,
            invalidator,
            learner,
            prefetcher,
            optimistic,
            warmer,
            active_subject: RwLock::new(None),
        })
    }
}
