//! Store Adapter: the narrow contract over the underlying key/value cache.
//!
//! The orchestration layer never touches cache storage directly. Everything
//! goes through [`QueryStore`], which offers a synchronous get/set/remove
//! surface plus predicate-based invalidation and subscriber counts.
//!
//! [`MemoryStore`] is the in-process reference adapter:
//!
//! ```ignore
//! use cachepilot::store::{MemoryStore, QueryStore, SetOptions};
//!
//! let store = MemoryStore::new();
//! let key = CacheKey::new("user-profile", "u1");
//! store.set(&key, json!({"name": "Ada"}), SetOptions::now(stale, gc));
//!
//! // Hold a subscription to mark the key as actively consumed
//! let _sub = store.subscribe(&key);
//! assert_eq!(store.subscriber_count(&key), 1);
//! ```

mod memory;
mod traits;

pub use memory::{MemoryStore, StoreEvent, Subscription, DEFAULT_GC_INTERVAL_SECS};
pub use traits::{CachedValue, EntrySnapshot, EntrySummary, GcResult, QueryStore, SetOptions, WriteOrder};
