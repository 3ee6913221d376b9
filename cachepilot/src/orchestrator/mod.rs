//! Cache orchestration service.
//!
//! [`CacheOrchestrator`] is the public entry point. It is assembled by
//! [`OrchestratorBuilder`] from injected parts and wires them together:
//!
//! ```text
//!                    ┌─────────────────────┐
//!  read ───────────► │ DataReader          │──► StrategyExecutor ──► QueryStore
//!                    └─────────────────────┘            ▲
//!  record_navigation ─► NavigationLearner               │
//!                            │                          │
//!                            ▼                          │
//!                    PredictivePrefetcher ──────────────┤
//!  warm_* ─────────► CacheWarmer ───────────────────────┤
//!  begin/rollback ─► OptimisticUpdateManager ───────────┤
//!  invalidate_* ───► Invalidator (TagRegistry) ─────────┘
//! ```

mod builder;
mod service;
mod stats;

pub use builder::OrchestratorBuilder;
pub use service::CacheOrchestrator;
pub use stats::CacheStats;
