//! Per-data-type read strategies.
//!
//! Every logical data type ("user-profile", "activity", ...) has exactly one
//! [`StrategyConfig`] deciding how reads are satisfied:
//!
//! | Strategy               | Fresh entry     | Stale entry              | Miss          |
//! |------------------------|-----------------|--------------------------|---------------|
//! | `CacheFirst`           | cache           | network                  | network       |
//! | `NetworkFirst`         | network         | network, cache fallback  | network       |
//! | `StaleWhileRevalidate` | cache           | cache + background fetch | network       |
//! | `NetworkOnly`          | network (purge) | network (purge)          | network       |

mod config;
mod registry;

pub use config::{
    Priority, StrategyConfig, StrategyKind, DEFAULT_GC_TIME, DEFAULT_STALE_TIME,
};
pub use registry::StrategyRegistry;
