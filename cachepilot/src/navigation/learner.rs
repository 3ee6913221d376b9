//! Navigation pattern learner.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::pattern::{NavigationPattern, RouteDataMap};
use super::persistence::SnapshotStore;
use crate::error::PersistenceError;

/// Default age after which an unseen pattern is pruned (30 days).
pub const DEFAULT_MAX_PATTERN_AGE: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Default snapshot namespace.
pub const DEFAULT_NAMESPACE: &str = "navigation-patterns";

/// Snapshot format version.
const SNAPSHOT_VERSION: u32 = 1;

/// Learner settings.
#[derive(Debug, Clone)]
pub struct LearnerConfig {
    /// Patterns not seen for longer than this are pruned.
    pub max_pattern_age: Duration,
    /// Namespace of the persisted snapshot.
    pub namespace: String,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            max_pattern_age: DEFAULT_MAX_PATTERN_AGE,
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct PatternSnapshot {
    version: u32,
    patterns: Vec<NavigationPattern>,
}

/// Records route transitions and keeps their frequencies.
///
/// The pattern table is persisted after every mutation when a
/// [`SnapshotStore`] is attached. Persistence is best-effort: failures are
/// logged and the learner keeps working in memory.
pub struct NavigationLearner {
    patterns: RwLock<HashMap<String, NavigationPattern>>,
    routes: RouteDataMap,
    persistence: Option<Arc<dyn SnapshotStore>>,
    config: LearnerConfig,
}

impl NavigationLearner {
    /// Create an in-memory learner.
    pub fn new(routes: RouteDataMap, config: LearnerConfig) -> Self {
        Self {
            patterns: RwLock::new(HashMap::new()),
            routes,
            persistence: None,
            config,
        }
    }

    /// Attach a snapshot store and load the persisted table from it.
    ///
    /// A missing or unreadable snapshot leaves the table empty.
    pub fn with_persistence(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.persistence = Some(store);
        match self.load_snapshot() {
            Ok(loaded) if loaded > 0 => {
                info!(patterns = loaded, namespace = %self.config.namespace, "Loaded navigation patterns");
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, namespace = %self.config.namespace, "Ignoring unreadable navigation snapshot");
            }
        }
        let pruned = self.prune_at(Utc::now());
        if pruned > 0 {
            debug!(pruned, "Pruned expired navigation patterns on load");
        }
        self
    }

    /// Route → data-type map used for new patterns.
    pub fn routes(&self) -> &RouteDataMap {
        &self.routes
    }

    /// Learner settings.
    pub fn config(&self) -> &LearnerConfig {
        &self.config
    }

    /// Record a transition now.
    pub fn record(&self, from: &str, to: &str) -> NavigationPattern {
        self.record_at(from, to, Utc::now())
    }

    /// Record a transition observed at `at`.
    pub fn record_at(&self, from: &str, to: &str, at: DateTime<Utc>) -> NavigationPattern {
        let pattern = {
            let mut patterns = self.patterns.write();
            let pattern = patterns
                .entry(NavigationPattern::key_for(from, to))
                .and_modify(|p| p.observe(at))
                .or_insert_with(|| {
                    NavigationPattern::first_seen(from, to, at, self.routes.data_types_for(to))
                });
            pattern.clone()
        };
        debug!(from = %from, to = %to, frequency = pattern.frequency, "Navigation recorded");
        self.persist();
        pattern
    }

    /// The `limit` most frequent transitions out of `from` that were seen at
    /// least `min_frequency` times, most frequent first.
    ///
    /// The limit is applied before the frequency filter.
    pub fn candidates(&self, from: &str, limit: usize, min_frequency: u64) -> Vec<NavigationPattern> {
        let mut outgoing: Vec<NavigationPattern> = self
            .patterns
            .read()
            .values()
            .filter(|p| p.from == from)
            .cloned()
            .collect();
        outgoing.sort_by(|a, b| {
            b.frequency
                .cmp(&a.frequency)
                .then_with(|| b.last_seen.cmp(&a.last_seen))
                .then_with(|| a.to.cmp(&b.to))
        });
        outgoing.truncate(limit);
        outgoing.retain(|p| p.frequency >= min_frequency);
        outgoing
    }

    /// Look up one transition.
    pub fn pattern(&self, from: &str, to: &str) -> Option<NavigationPattern> {
        self.patterns.read().get(&NavigationPattern::key_for(from, to)).cloned()
    }

    /// All patterns, sorted by key.
    pub fn patterns(&self) -> Vec<NavigationPattern> {
        let mut patterns: Vec<NavigationPattern> = self.patterns.read().values().cloned().collect();
        patterns.sort_by_key(|p| p.key());
        patterns
    }

    /// Number of patterns.
    pub fn len(&self) -> usize {
        self.patterns.read().len()
    }

    /// Whether no pattern has been learned.
    pub fn is_empty(&self) -> bool {
        self.patterns.read().is_empty()
    }

    /// Remove patterns older than the configured maximum age.
    pub fn prune(&self) -> usize {
        self.prune_at(Utc::now())
    }

    /// Remove patterns older than the configured maximum age at `now`.
    pub fn prune_at(&self, now: DateTime<Utc>) -> usize {
        let removed = {
            let mut patterns = self.patterns.write();
            let before = patterns.len();
            patterns.retain(|_, p| !p.is_expired(self.config.max_pattern_age, now));
            before - patterns.len()
        };
        if removed > 0 {
            self.persist();
        }
        removed
    }

    /// Forget every pattern.
    pub fn clear(&self) {
        self.patterns.write().clear();
        self.persist();
        info!("Navigation patterns cleared");
    }

    /// Replace the table with the persisted snapshot, returning the number of
    /// patterns loaded.
    pub fn load_snapshot(&self) -> Result<usize, PersistenceError> {
        let Some(store) = &self.persistence else {
            return Ok(0);
        };
        let Some(bytes) = store.load(&self.config.namespace)? else {
            return Ok(0);
        };

        let snapshot: PatternSnapshot =
            bincode::deserialize(&bytes).map_err(|e| PersistenceError::Decode(e.to_string()))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(PersistenceError::Decode(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }

        let loaded = snapshot.patterns.len();
        *self.patterns.write() = snapshot
            .patterns
            .into_iter()
            .map(|p| (p.key(), p))
            .collect();
        Ok(loaded)
    }

    /// Write the table to the snapshot store.
    pub fn save_snapshot(&self) -> Result<(), PersistenceError> {
        let Some(store) = &self.persistence else {
            return Ok(());
        };
        let snapshot = PatternSnapshot {
            version: SNAPSHOT_VERSION,
            patterns: self.patterns(),
        };
        let bytes =
            bincode::serialize(&snapshot).map_err(|e| PersistenceError::Encode(e.to_string()))?;
        store.save(&self.config.namespace, &bytes)
    }

    fn persist(&self) {
        if let Err(e) = self.save_snapshot() {
            warn!(error = %e, namespace = %self.config.namespace, "Failed to persist navigation patterns");
        }
    }
}
