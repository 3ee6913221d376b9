//! Cache warming.
//!
//! Critical data (identity and preferences) is warmed at session start;
//! engagement data joins it for high-priority sessions or dashboard-like
//! views. Contextual warming loads the data types of one view. Every warm
//! operation is isolated: a failing data type never aborts its siblings.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::reader::{DataReader, PrefetchOutcome};
use crate::strategy::Priority;

/// A view whose data can be warmed as a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarmContext {
    Profile,
    Dashboard,
    Progress,
    Activity,
}

impl WarmContext {
    /// Lowercase name of the context.
    pub fn as_str(&self) -> &'static str {
        match self {
            WarmContext::Profile => "profile",
            WarmContext::Dashboard => "dashboard",
            WarmContext::Progress => "progress",
            WarmContext::Activity => "activity",
        }
    }

    /// Context of a route such as `/dashboard`, if it has one.
    pub fn from_route(route: &str) -> Option<Self> {
        route.trim_start_matches('/').split('/').next()?.parse().ok()
    }

    /// Whether the context shows engagement data.
    pub fn is_dashboard_like(&self) -> bool {
        matches!(self, WarmContext::Dashboard | WarmContext::Progress)
    }
}

impl fmt::Display for WarmContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WarmContext {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "profile" => Ok(WarmContext::Profile),
            "dashboard" => Ok(WarmContext::Dashboard),
            "progress" => Ok(WarmContext::Progress),
            "activity" => Ok(WarmContext::Activity),
            other => Err(format!("unknown warm context '{}'", other)),
        }
    }
}

/// Which data types are warmed when.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarmingPlan {
    /// Always warmed by [`CacheWarmer::warm_critical_data`].
    pub critical: Vec<String>,
    /// Added for high-priority or dashboard-like warms.
    pub engagement: Vec<String>,
    /// Data types of each context.
    pub contexts: HashMap<WarmContext, Vec<String>>,
}

impl WarmingPlan {
    /// Plan for the built-in data types.
    pub fn standard() -> Self {
        let strings = |types: &[&str]| types.iter().map(|t| t.to_string()).collect::<Vec<_>>();
        Self {
            critical: strings(&["user-profile", "user-preferences"]),
            engagement: strings(&["user-progress", "achievements"]),
            contexts: HashMap::from([
                (
                    WarmContext::Profile,
                    strings(&["user-profile", "user-preferences", "achievements"]),
                ),
                (
                    WarmContext::Dashboard,
                    strings(&["user-profile", "user-progress", "achievements", "dashboard-summary"]),
                ),
                (WarmContext::Progress, strings(&["user-progress", "achievements"])),
                (WarmContext::Activity, strings(&["activity"])),
            ]),
        }
    }

    /// Data types of `context`; empty if the plan has none.
    pub fn context(&self, context: WarmContext) -> &[String] {
        self.contexts.get(&context).map(Vec::as_slice).unwrap_or_default()
    }
}

/// Options for [`CacheWarmer::warm_critical_data`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarmOptions {
    /// Session priority; `High` adds engagement data.
    pub priority: Priority,
    /// Return immediately and warm in a spawned task.
    pub background: bool,
    /// View the session starts on; a dashboard-like view adds engagement data.
    pub context: Option<WarmContext>,
}

impl WarmOptions {
    /// Set the priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Warm in the background.
    pub fn in_background(mut self) -> Self {
        self.background = true;
        self
    }

    /// Set the starting view.
    pub fn with_context(mut self, context: WarmContext) -> Self {
        self.context = Some(context);
        self
    }
}

/// Outcome of a warm call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarmReport {
    /// Data types the call covered.
    pub data_types: Vec<String>,
    /// Entries fetched.
    pub fetched: usize,
    /// Entries that were already fresh.
    pub already_fresh: usize,
    /// Data types that failed to warm.
    pub failed: Vec<String>,
    /// The warm was handed to a background task; counts are not available.
    pub background: bool,
}

/// Warms cache entries ahead of use.
pub struct CacheWarmer {
    reader: DataReader,
    plan: WarmingPlan,
}

impl CacheWarmer {
    /// Create a warmer.
    pub fn new(reader: DataReader, plan: WarmingPlan) -> Self {
        Self { reader, plan }
    }

    /// The warming plan.
    pub fn plan(&self) -> &WarmingPlan {
        &self.plan
    }

    /// Warm the subject's critical data.
    pub async fn warm_critical_data(&self, subject_id: &str, options: WarmOptions) -> WarmReport {
        let mut data_types = self.plan.critical.clone();
        let dashboard_like = options.context.is_some_and(|c| c.is_dashboard_like());
        if options.priority == Priority::High || dashboard_like {
            for data_type in &self.plan.engagement {
                if !data_types.contains(data_type) {
                    data_types.push(data_type.clone());
                }
            }
        }

        if options.background {
            let reader = self.reader.clone();
            let subject_id = subject_id.to_string();
            let scheduled = data_types.clone();
            tokio::spawn(async move {
                let report = warm_all(&reader, &subject_id, scheduled).await;
                log_report(&subject_id, "critical", &report);
            });
            return WarmReport {
                data_types,
                background: true,
                ..Default::default()
            };
        }

        let report = warm_all(&self.reader, subject_id, data_types).await;
        log_report(subject_id, "critical", &report);
        report
    }

    /// Warm exactly the data types of `context`.
    pub async fn warm_contextual_data(&self, subject_id: &str, context: WarmContext) -> WarmReport {
        let data_types = self.plan.context(context).to_vec();
        let report = warm_all(&self.reader, subject_id, data_types).await;
        log_report(subject_id, context.as_str(), &report);
        report
    }
}

async fn warm_all(reader: &DataReader, subject_id: &str, data_types: Vec<String>) -> WarmReport {
    let warms = data_types
        .iter()
        .map(|data_type| reader.ensure_cached(data_type, subject_id));
    let results = join_all(warms).await;

    let mut report = WarmReport::default();
    for (data_type, result) in data_types.iter().zip(results) {
        match result {
            Ok(PrefetchOutcome::Fetched) => report.fetched += 1,
            Ok(PrefetchOutcome::AlreadyFresh) | Ok(PrefetchOutcome::SkippedLowPriority) => {
                report.already_fresh += 1
            }
            Err(e) => {
                warn!(data_type = %data_type, subject = %subject_id, error = %e, "Cache warm failed");
                report.failed.push(data_type.clone());
            }
        }
    }
    report.data_types = data_types;
    report
}

fn log_report(subject_id: &str, scope: &str, report: &WarmReport) {
    if report.failed.is_empty() {
        debug!(
            subject = %subject_id,
            scope,
            fetched = report.fetched,
            fresh = report.already_fresh,
            "Cache warmed"
        );
    } else {
        info!(
            subject = %subject_id,
            scope,
            fetched = report.fetched,
            failed = report.failed.len(),
            "Cache warmed with failures"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::executor::{ExecutorConfig, StrategyExecutor};
    use crate::store::MemoryStore;
    use crate::strategy::StrategyRegistry;
    use crate::transport::{FetchRequest, FetcherRegistry};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn warmer(failing: &'static [&'static str]) -> (CacheWarmer, Arc<Mutex<Vec<String>>>) {
        let fetched = Arc::new(Mutex::new(Vec::new()));
        let strategies = Arc::new(StrategyRegistry::with_presets());
        let fetchers = Arc::new(FetcherRegistry::new());
        for data_type in strategies.data_types() {
            let fetched = Arc::clone(&fetched);
            fetchers.register(data_type, move |req: FetchRequest, _cancel: CancellationToken| {
                fetched.lock().push(req.data_type.clone());
                async move {
                    if failing.contains(&req.data_type.as_str()) {
                        Err(TransportError::failed("502"))
                    } else {
                        Ok(json!(null))
                    }
                }
            });
        }
        let executor = Arc::new(StrategyExecutor::new(
            Arc::new(MemoryStore::new()),
            ExecutorConfig::default(),
        ));
        let reader = DataReader::new(strategies, fetchers, executor);
        (CacheWarmer::new(reader, WarmingPlan::standard()), fetched)
    }

    fn sorted(fetched: &Mutex<Vec<String>>) -> Vec<String> {
        let mut types = fetched.lock().clone();
        types.sort();
        types
    }

    #[test]
    fn test_context_parsing() {
        assert_eq!("Dashboard".parse(), Ok(WarmContext::Dashboard));
        assert!("settings".parse::<WarmContext>().is_err());
        assert_eq!(WarmContext::from_route("/progress"), Some(WarmContext::Progress));
        assert_eq!(WarmContext::from_route("/profile/edit"), Some(WarmContext::Profile));
        assert_eq!(WarmContext::from_route("/settings"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_critical_warm_default_priority() {
        let (warmer, fetched) = warmer(&[]);
        let report = warmer.warm_critical_data("u1", WarmOptions::default()).await;
        assert_eq!(report.fetched, 2);
        assert_eq!(sorted(&fetched), vec!["user-preferences", "user-profile"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_high_priority_adds_engagement() {
        let (warmer, fetched) = warmer(&[]);
        let report = warmer
            .warm_critical_data("u1", WarmOptions::default().with_priority(Priority::High))
            .await;
        assert_eq!(report.data_types.len(), 4);
        assert_eq!(
            sorted(&fetched),
            vec!["achievements", "user-preferences", "user-profile", "user-progress"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_dashboard_context_adds_engagement() {
        let (warmer, _fetched) = warmer(&[]);
        let report = warmer
            .warm_critical_data("u1", WarmOptions::default().with_context(WarmContext::Dashboard))
            .await;
        assert!(report.data_types.contains(&"user-progress".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_abort_siblings() {
        let (warmer, fetched) = warmer(&["user-profile"]);
        let report = warmer.warm_critical_data("u1", WarmOptions::default()).await;
        assert_eq!(report.failed, vec!["user-profile"]);
        assert_eq!(report.fetched, 1);
        assert_eq!(fetched.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_warm_returns_immediately() {
        let (warmer, fetched) = warmer(&[]);
        let report = warmer
            .warm_critical_data("u1", WarmOptions::default().in_background())
            .await;
        assert!(report.background);
        assert_eq!(report.fetched, 0);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(fetched.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_contextual_warm_uses_exact_list() {
        let (warmer, fetched) = warmer(&[]);
        let report = warmer.warm_contextual_data("u1", WarmContext::Dashboard).await;
        assert_eq!(report.fetched, 4);
        assert!(fetched.lock().contains(&"dashboard-summary".to_string()));

        let again = warmer.warm_contextual_data("u1", WarmContext::Progress).await;
        assert_eq!(again.already_fresh, 2);
        assert_eq!(again.fetched, 0);
    }
}
