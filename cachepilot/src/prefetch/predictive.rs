//! Navigation-driven predictive prefetch.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::tickets::{PrefetchTickets, TicketKey};
use crate::error::CacheError;
use crate::navigation::NavigationLearner;
use crate::reader::{DataReader, PrefetchOutcome};

/// Default number of transitions considered per trigger.
pub const DEFAULT_MAX_CANDIDATES: usize = 3;

/// Default minimum frequency for a transition to be trusted.
pub const DEFAULT_MIN_FREQUENCY: u64 = 2;

/// Prediction settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefetchConfig {
    /// Most frequent transitions considered per trigger.
    pub max_candidates: usize,
    /// Transitions seen fewer times than this are ignored.
    pub min_frequency: u64,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            max_candidates: DEFAULT_MAX_CANDIDATES,
            min_frequency: DEFAULT_MIN_FREQUENCY,
        }
    }
}

/// Outcome of one prefetch task.
#[derive(Debug)]
pub struct PrefetchTaskResult {
    /// What was prefetched.
    pub ticket: TicketKey,
    /// How it went.
    pub outcome: Result<PrefetchOutcome, CacheError>,
}

/// Prefetch tasks started by one trigger.
///
/// Dropping the batch does not abort the tasks.
#[derive(Debug, Default)]
pub struct PrefetchBatch {
    tasks: Vec<JoinHandle<PrefetchTaskResult>>,
    skipped: Vec<TicketKey>,
}

impl PrefetchBatch {
    /// Number of prefetch tasks started.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no prefetch was started.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Prefetches skipped because a ticket was already outstanding.
    pub fn skipped(&self) -> &[TicketKey] {
        &self.skipped
    }

    /// Wait for every task to finish.
    pub async fn join(self) -> PrefetchSummary {
        let mut summary = PrefetchSummary {
            skipped_in_flight: self.skipped.len(),
            ..Default::default()
        };
        for result in futures::future::join_all(self.tasks).await {
            match result {
                Ok(PrefetchTaskResult { outcome: Ok(outcome), .. }) => match outcome {
                    PrefetchOutcome::Fetched => summary.fetched += 1,
                    PrefetchOutcome::AlreadyFresh => summary.already_fresh += 1,
                    PrefetchOutcome::SkippedLowPriority => summary.skipped_low_priority += 1,
                },
                Ok(PrefetchTaskResult { outcome: Err(_), .. }) | Err(_) => summary.failed += 1,
            }
        }
        summary
    }
}

/// Counts of a finished [`PrefetchBatch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrefetchSummary {
    /// Entries fetched.
    pub fetched: usize,
    /// Entries that were already fresh.
    pub already_fresh: usize,
    /// Low-priority data types skipped.
    pub skipped_low_priority: usize,
    /// Prefetches that failed.
    pub failed: usize,
    /// Prefetches skipped because an identical one was outstanding.
    pub skipped_in_flight: usize,
}

/// Prefetches the data of routes likely to be visited next.
pub struct PredictivePrefetcher {
    learner: Arc<NavigationLearner>,
    reader: DataReader,
    tickets: PrefetchTickets,
    config: PrefetchConfig,
}

impl PredictivePrefetcher {
    /// Create a prefetcher.
    pub fn new(learner: Arc<NavigationLearner>, reader: DataReader, config: PrefetchConfig) -> Self {
        Self {
            learner,
            reader,
            tickets: PrefetchTickets::new(),
            config,
        }
    }

    /// Outstanding tickets.
    pub fn tickets(&self) -> &PrefetchTickets {
        &self.tickets
    }

    /// Prediction settings.
    pub fn config(&self) -> &PrefetchConfig {
        &self.config
    }

    /// Start prefetching for the routes most often visited after
    /// `current_route`.
    ///
    /// Returns immediately; prefetches run as spawned tasks and their
    /// failures are logged, never returned. Outside a Tokio runtime nothing
    /// is prefetched.
    pub fn trigger(&self, current_route: &str, subject_id: &str) -> PrefetchBatch {
        let mut batch = PrefetchBatch::default();
        let candidates =
            self.learner
                .candidates(current_route, self.config.max_candidates, self.config.min_frequency);
        if candidates.is_empty() {
            return batch;
        }

        let Ok(handle) = Handle::try_current() else {
            warn!(route = %current_route, "No async runtime, skipping predictive prefetch");
            return batch;
        };

        for pattern in candidates {
            for data_type in &pattern.prefetch_targets {
                let key = TicketKey::new(&pattern.to, data_type, subject_id);
                let Some(ticket) = self.tickets.try_acquire(key.clone()) else {
                    debug!(ticket = %key, "Prefetch already in flight");
                    batch.skipped.push(key);
                    continue;
                };

                debug!(
                    from = %current_route,
                    to = %pattern.to,
                    data_type = %data_type,
                    frequency = pattern.frequency,
                    "Predictive prefetch"
                );
                let reader = self.reader.clone();
                batch.tasks.push(handle.spawn(async move {
                    let key = ticket.key().clone();
                    let outcome = reader.prefetch(&key.data_type, &key.subject_id).await;
                    if let Err(e) = &outcome {
                        warn!(ticket = %key, error = %e, "Predictive prefetch failed");
                    }
                    drop(ticket);
                    PrefetchTaskResult { ticket: key, outcome }
                }));
            }
        }
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::executor::{ExecutorConfig, StrategyExecutor};
    use crate::navigation::{LearnerConfig, RouteDataMap};
    use crate::store::MemoryStore;
    use crate::strategy::StrategyRegistry;
    use crate::transport::{FetchRequest, FetcherRegistry};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    struct Fixture {
        learner: Arc<NavigationLearner>,
        prefetcher: PredictivePrefetcher,
        fetched: Arc<Mutex<Vec<String>>>,
    }

    fn fixture(delay: Duration) -> Fixture {
        let fetched = Arc::new(Mutex::new(Vec::new()));
        let strategies = Arc::new(StrategyRegistry::with_presets());
        let fetchers = Arc::new(FetcherRegistry::new());
        for data_type in strategies.data_types() {
            let fetched = Arc::clone(&fetched);
            fetchers.register(data_type, move |req: FetchRequest, _cancel: CancellationToken| {
                fetched.lock().push(req.data_type.clone());
                async move {
                    tokio::time::sleep(delay).await;
                    if req.subject_id == "broken" {
                        Err(TransportError::failed("500"))
                    } else {
                        Ok(json!({ "type": req.data_type }))
                    }
                }
            });
        }
        let executor = Arc::new(StrategyExecutor::new(
            Arc::new(MemoryStore::new()),
            ExecutorConfig::default(),
        ));
        let reader = DataReader::new(strategies, fetchers, executor);
        let learner = Arc::new(NavigationLearner::new(
            RouteDataMap::standard(),
            LearnerConfig::default(),
        ));
        let prefetcher =
            PredictivePrefetcher::new(Arc::clone(&learner), reader, PrefetchConfig::default());
        Fixture {
            learner,
            prefetcher,
            fetched,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_observation_does_not_prefetch() {
        let f = fixture(Duration::ZERO);
        f.learner.record("/dashboard", "/progress");

        let batch = f.prefetcher.trigger("/dashboard", "u1");
        assert!(batch.is_empty());
        assert!(f.fetched.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_observation_prefetches_targets() {
        let f = fixture(Duration::ZERO);
        f.learner.record("/dashboard", "/progress");
        f.learner.record("/dashboard", "/progress");

        let summary = f.prefetcher.trigger("/dashboard", "u1").join().await;
        assert_eq!(summary.fetched, 2);

        let mut fetched = f.fetched.lock().clone();
        fetched.sort();
        assert_eq!(fetched, vec!["achievements", "user-progress"]);
        assert!(f.prefetcher.tickets().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_trigger_is_deduplicated() {
        let f = fixture(Duration::from_millis(50));
        f.learner.record("/dashboard", "/progress");
        f.learner.record("/dashboard", "/progress");

        let first = f.prefetcher.trigger("/dashboard", "u1");
        let second = f.prefetcher.trigger("/dashboard", "u1");
        assert_eq!(first.len(), 2);
        assert!(second.is_empty());
        assert_eq!(second.skipped().len(), 2);
        assert_eq!(f.prefetcher.tickets().len(), 2);

        first.join().await;
        assert_eq!(f.fetched.lock().len(), 2);
        assert!(f.prefetcher.tickets().is_empty());

        // Fresh now: a later trigger starts tasks but fetches nothing
        let summary = f.prefetcher.trigger("/dashboard", "u1").join().await;
        assert_eq!(summary.already_fresh, 2);
        assert_eq!(f.fetched.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_low_priority_targets_are_skipped() {
        let f = fixture(Duration::ZERO);
        f.learner.record("/profile", "/dashboard");
        f.learner.record("/profile", "/dashboard");

        let summary = f.prefetcher.trigger("/profile", "u1").join().await;
        assert_eq!(summary.skipped_low_priority, 1);
        assert!(!f.fetched.lock().contains(&"dashboard-summary".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_isolated_and_release_tickets() {
        let f = fixture(Duration::ZERO);
        f.learner.record("/dashboard", "/progress");
        f.learner.record("/dashboard", "/progress");

        let summary = f.prefetcher.trigger("/dashboard", "broken").join().await;
        assert_eq!(summary.failed, 2);
        assert!(f.prefetcher.tickets().is_empty());
    }

    #[test]
    fn test_trigger_outside_runtime_is_noop() {
        let f = fixture(Duration::ZERO);
        f.learner.record("/dashboard", "/progress");
        f.learner.record("/dashboard", "/progress");

        let batch = f.prefetcher.trigger("/dashboard", "u1");
        assert!(batch.is_empty());
        assert!(f.prefetcher.tickets().is_empty());
    }
}
