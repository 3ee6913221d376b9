//! Executor configuration.

use std::time::Duration;

/// Default bound after which an unsettled fetch is cancelled (30 seconds).
pub const DEFAULT_ABANDON_AFTER: Duration = Duration::from_secs(30);

/// Configuration for [`super::StrategyExecutor`].
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum lifetime of a fetch task.
    ///
    /// A fetch that loses a NetworkFirst timeout race keeps running so its
    /// late result can still be written; past this bound its cancellation
    /// token fires and the task settles with a timeout.
    pub abandon_after: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            abandon_after: DEFAULT_ABANDON_AFTER,
        }
    }
}

impl ExecutorConfig {
    /// Set the abandon bound.
    pub fn with_abandon_after(mut self, abandon_after: Duration) -> Self {
        self.abandon_after = abandon_after;
        self
    }
}
