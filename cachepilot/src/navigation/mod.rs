//! Navigation pattern learning.
//!
//! Every route transition `from -> to` is counted. Patterns that are seen
//! often enough drive the predictive prefetcher, which warms the data types
//! of `to` the next time the user is on `from`.
//!
//! # Persistence
//!
//! The pattern table is written to a [`SnapshotStore`] after every change
//! and reloaded at startup. Snapshots are bincode-encoded; an unreadable
//! snapshot is ignored and learning starts over.

mod learner;
mod pattern;
mod persistence;

pub use learner::{LearnerConfig, NavigationLearner, DEFAULT_MAX_PATTERN_AGE, DEFAULT_NAMESPACE};
pub use pattern::{NavigationPattern, RouteDataMap};
pub use persistence::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore};
