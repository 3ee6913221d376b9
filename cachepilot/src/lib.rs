//! CachePilot - adaptive cache orchestration
//!
//! This library sits between an application and a reactive query cache and
//! decides how each read is served, when entries go stale, and what to load
//! before it is asked for:
//!
//! - per data-type read strategies (cache-first, network-first,
//!   stale-while-revalidate, network-only) with in-flight deduplication
//! - tag-based cascading invalidation
//! - navigation pattern learning and predictive prefetch
//! - optimistic updates with exact rollback
//! - startup and contextual cache warming
//!
//! ```ignore
//! use cachepilot::{CacheOrchestrator, FetchRequest, TransportError};
//!
//! let orchestrator = CacheOrchestrator::builder()
//!     .fetcher("user-profile", |req: FetchRequest, _cancel| async move {
//!         api.profile(&req.subject_id).await.map_err(TransportError::failed)
//!     })
//!     .build()?;
//!
//! let profile = orchestrator.read("user-profile", "u1", vec![]).await?;
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod key;
pub mod logging;
pub mod navigation;
pub mod optimistic;
pub mod orchestrator;
pub mod prefetch;
pub mod reader;
pub mod store;
pub mod strategy;
pub mod tags;
pub mod transport;
pub mod warming;

pub use error::{CacheError, ConfigurationError, PersistenceError, TransportError};
pub use key::{CacheKey, KeySegment};
pub use orchestrator::{CacheOrchestrator, CacheStats, OrchestratorBuilder};
pub use store::{MemoryStore, QueryStore};
pub use strategy::{Priority, StrategyConfig, StrategyKind};
pub use tags::{CacheTag, RefetchMode};
pub use transport::{fetch_fn, FetchRequest, Fetcher};
