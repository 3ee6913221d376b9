//! Strategy Executor: runs one of four read strategies per request.
//!
//! # Request Lifecycle
//!
//! ```text
//! Idle ──► Fetching ──► Settled
//!              │
//!              └──────► Failed
//! ```
//!
//! Every transport call runs as a spawned task registered in
//! [`InFlightRequests`]. A second request for a key that is `Fetching` joins
//! the existing task instead of issuing another call, whatever strategy
//! either request uses. Because the fetch is a task rather than a future
//! owned by the caller, it settles (and writes to the store) even if every
//! caller has given up, e.g. after a NetworkFirst timeout.
//!
//! # Ordering
//!
//! Writes are stamped with the instant their request started; the store
//! discards writes older than the entry's current `updatedAt`.

mod config;
mod inflight;
mod metrics;
mod runner;

pub use config::{ExecutorConfig, DEFAULT_ABANDON_AFTER};
pub use inflight::{InFlightRequests, Join, SharedFetch, WriteTarget};
pub use metrics::{ExecutorMetrics, MetricsSnapshot};
pub use runner::{CacheLookup, StrategyExecutor};
