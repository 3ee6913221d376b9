//! Transport contract: one async fetch function per data type.
//!
//! Callers register a [`Fetcher`] for each data type. Any async closure with
//! the right shape is a fetcher:
//!
//! ```ignore
//! fetchers.register("user-profile", |req: FetchRequest, cancel: CancellationToken| async move {
//!     tokio::select! {
//!         _ = cancel.cancelled() => Err(TransportError::Cancelled),
//!         profile = api.load_profile(&req.subject_id) => profile.map_err(TransportError::failed),
//!     }
//! });
//! ```
//!
//! The cancellation token is cancelled when the fetch is abandoned (optimistic
//! update on the same key, or the executor's abandon bound elapsed), so
//! transports can release connections early.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::{ConfigurationError, TransportError};
use crate::key::{CacheKey, KeySegment};

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outcome of a transport fetch.
pub type FetchResult = Result<Value, TransportError>;

/// A type-erased fetch bound to one request.
pub type FetchFn = Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, FetchResult> + Send + Sync>;

/// Wrap an async closure as a [`FetchFn`].
pub fn fetch_fn<F, Fut>(f: F) -> FetchFn
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FetchResult> + Send + 'static,
{
    Arc::new(move |cancel: CancellationToken| -> BoxFuture<'static, FetchResult> {
        Box::pin(f(cancel))
    })
}

/// What to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchRequest {
    /// Data type being fetched.
    pub data_type: String,
    /// Subject (user, account, ...) the data belongs to.
    pub subject_id: String,
    /// Extra key parameters.
    pub params: Vec<KeySegment>,
}

impl FetchRequest {
    /// Create a request without parameters.
    pub fn new(data_type: impl Into<String>, subject_id: impl Into<String>) -> Self {
        Self {
            data_type: data_type.into(),
            subject_id: subject_id.into(),
            params: Vec::new(),
        }
    }

    /// Attach parameters.
    pub fn with_params(mut self, params: Vec<KeySegment>) -> Self {
        self.params = params;
        self
    }

    /// The cache key `[data_type, subject_id, ...params]`.
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(self.data_type.clone(), self.subject_id.clone())
            .with_params(self.params.iter().cloned())
    }

    /// Reconstruct the request that produced `key`.
    pub fn from_key(key: &CacheKey) -> Result<Self, ConfigurationError> {
        match (key.data_type(), key.subject_id()) {
            (Some(data_type), Some(subject_id)) => Ok(Self {
                data_type: data_type.to_string(),
                subject_id,
                params: key.params().to_vec(),
            }),
            _ => Err(ConfigurationError::InvalidKey(key.serialized())),
        }
    }
}

/// Async fetch function for one data type.
pub trait Fetcher: Send + Sync {
    /// Fetch the value for `request`.
    fn fetch(&self, request: FetchRequest, cancel: CancellationToken) -> BoxFuture<'static, FetchResult>;
}

impl<F, Fut> Fetcher for F
where
    F: Fn(FetchRequest, CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = FetchResult> + Send + 'static,
{
    fn fetch(&self, request: FetchRequest, cancel: CancellationToken) -> BoxFuture<'static, FetchResult> {
        Box::pin(self(request, cancel))
    }
}

/// Data type → fetcher registry.
#[derive(Default)]
pub struct FetcherRegistry {
    fetchers: RwLock<HashMap<String, Arc<dyn Fetcher>>>,
}

impl FetcherRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the fetcher of a data type.
    pub fn register(&self, data_type: impl Into<String>, fetcher: impl Fetcher + 'static) {
        self.register_arc(data_type, Arc::new(fetcher));
    }

    /// Register a shared fetcher.
    pub fn register_arc(&self, data_type: impl Into<String>, fetcher: Arc<dyn Fetcher>) {
        self.fetchers.write().insert(data_type.into(), fetcher);
    }

    /// Bind the fetcher for `request.data_type` to `request`.
    pub fn bind(&self, request: FetchRequest) -> Result<FetchFn, ConfigurationError> {
        let fetcher = self
            .fetchers
            .read()
            .get(&request.data_type)
            .cloned()
            .ok_or_else(|| ConfigurationError::MissingFetcher(request.data_type.clone()))?;

        let bound: FetchFn =
            Arc::new(move |cancel: CancellationToken| fetcher.fetch(request.clone(), cancel));
        Ok(bound)
    }

    /// Whether a fetcher is registered for the data type.
    pub fn contains(&self, data_type: &str) -> bool {
        self.fetchers.read().contains_key(data_type)
    }

    /// Number of registered fetchers.
    pub fn len(&self) -> usize {
        self.fetchers.read().len()
    }

    /// Whether no fetcher is registered.
    pub fn is_empty(&self) -> bool {
        self.fetchers.read().is_empty()
    }
}
