//! Data-type aware reads.
//!
//! [`DataReader`] joins the three registries a read needs: the strategy for the
//! data type, the fetcher for the data type, and the executor that runs the
//! strategy. Prefetching, warming and active refetches all go through it so
//! they share the executor's in-flight deduplication with foreground reads.

use std::sync::Arc;

use serde_json::Value;
use tracing::trace;

use crate::error::{CacheError, ConfigurationError};
use crate::executor::StrategyExecutor;
use crate::key::{CacheKey, KeySegment};
use crate::strategy::{Priority, StrategyConfig, StrategyRegistry};
use crate::transport::{FetchFn, FetchRequest, FetcherRegistry};

/// Result of a background population request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefetchOutcome {
    /// The transport was called and the entry written.
    Fetched,
    /// A fresh entry already existed.
    AlreadyFresh,
    /// The data type is low priority and is never prefetched.
    SkippedLowPriority,
}

/// Routes reads for a data type through its strategy and fetcher.
#[derive(Clone)]
pub struct DataReader {
    strategies: Arc<StrategyRegistry>,
    fetchers: Arc<FetcherRegistry>,
    executor: Arc<StrategyExecutor>,
}

impl DataReader {
    /// Create a reader over the given registries.
    pub fn new(
        strategies: Arc<StrategyRegistry>,
        fetchers: Arc<FetcherRegistry>,
        executor: Arc<StrategyExecutor>,
    ) -> Self {
        Self {
            strategies,
            fetchers,
            executor,
        }
    }

    /// Strategy registry.
    pub fn strategies(&self) -> &Arc<StrategyRegistry> {
        &self.strategies
    }

    /// Fetcher registry.
    pub fn fetchers(&self) -> &Arc<FetcherRegistry> {
        &self.fetchers
    }

    /// Strategy executor.
    pub fn executor(&self) -> &Arc<StrategyExecutor> {
        &self.executor
    }

    /// Read `[data_type, subject_id, ...params]` with the data type's strategy.
    pub async fn read(
        &self,
        data_type: &str,
        subject_id: &str,
        params: Vec<KeySegment>,
    ) -> Result<Value, CacheError> {
        let request = FetchRequest::new(data_type, subject_id).with_params(params);
        let (key, fetch, config) = self.bind(request)?;
        Ok(self.executor.execute(&key, fetch, &config).await?)
    }

    /// Populate an entry ahead of use, skipping low-priority data types.
    pub async fn prefetch(&self, data_type: &str, subject_id: &str) -> Result<PrefetchOutcome, CacheError> {
        let config = self.strategies.resolve(data_type)?;
        if config.priority == Priority::Low {
            trace!(data_type = %data_type, "Low priority data type, not prefetching");
            return Ok(PrefetchOutcome::SkippedLowPriority);
        }
        self.ensure_cached(data_type, subject_id).await
    }

    /// Populate an entry with cache-first semantics, whatever its priority.
    pub async fn ensure_cached(&self, data_type: &str, subject_id: &str) -> Result<PrefetchOutcome, CacheError> {
        let (key, fetch, config) = self.bind(FetchRequest::new(data_type, subject_id))?;
        let fetched = self.executor.prefetch(&key, fetch, &config).await?;
        Ok(if fetched {
            PrefetchOutcome::Fetched
        } else {
            PrefetchOutcome::AlreadyFresh
        })
    }

    /// Refetch an existing key with its data type's fetcher.
    pub async fn refetch(&self, key: &CacheKey) -> Result<Value, CacheError> {
        let (key, fetch, config) = self.bind(FetchRequest::from_key(key)?)?;
        Ok(self.executor.refetch(&key, fetch, &config).await?)
    }

    fn bind(&self, request: FetchRequest) -> Result<(CacheKey, FetchFn, StrategyConfig), ConfigurationError> {
        let config = self.strategies.resolve(&request.data_type)?;
        let key = request.cache_key();
        let fetch = self.fetchers.bind(request)?;
        Ok((key, fetch, config))
    }
}
