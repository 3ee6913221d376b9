//! Tag registry and cascading invalidation.
//!
//! A tag names a group of cache entries by a pattern over serialized keys and
//! may depend on other tags:
//!
//! ```text
//! user-progress ──► user ──► (entries matching the "user" pattern)
//!       │
//!       └──────────────────► (entries matching the "user-progress" pattern)
//! ```
//!
//! Invalidating a tag marks its entries stale and then invalidates each
//! dependency, visiting every tag at most once. The registry rejects
//! registrations that would create a cycle; the visited set still bounds the
//! walk.

mod invalidator;
mod registry;
mod tag;

pub use invalidator::{InvalidationReport, Invalidator, RefetchMode};
pub use registry::TagRegistry;
pub use tag::CacheTag;
