//! Navigation patterns and the static route → data-type map.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Observed transition between two routes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationPattern {
    /// Route navigated away from.
    pub from: String,
    /// Route navigated to.
    pub to: String,
    /// Number of times the transition was observed.
    pub frequency: u64,
    /// Last time the transition was observed.
    pub last_seen: DateTime<Utc>,
    /// Data types useful on `to`.
    pub prefetch_targets: Vec<String>,
}

impl NavigationPattern {
    /// Table key of a transition.
    pub fn key_for(from: &str, to: &str) -> String {
        format!("{}->{}", from, to)
    }

    /// First observation of a transition.
    pub fn first_seen(
        from: impl Into<String>,
        to: impl Into<String>,
        at: DateTime<Utc>,
        prefetch_targets: Vec<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            frequency: 1,
            last_seen: at,
            prefetch_targets,
        }
    }

    /// Table key of this pattern.
    pub fn key(&self) -> String {
        Self::key_for(&self.from, &self.to)
    }

    /// Count another observation.
    pub fn observe(&mut self, at: DateTime<Utc>) {
        self.frequency += 1;
        self.last_seen = at;
    }

    /// Whether the pattern was last seen more than `max_age` before `now`.
    pub fn is_expired(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        (now - self.last_seen).to_std().is_ok_and(|age| age > max_age)
    }
}

/// Static mapping from a route to the data types it reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteDataMap {
    routes: HashMap<String, Vec<String>>,
}

impl RouteDataMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Map for the standard application routes.
    pub fn standard() -> Self {
        Self::new()
            .with_route(
                "/dashboard",
                ["user-profile", "user-progress", "achievements", "dashboard-summary"],
            )
            .with_route("/profile", ["user-profile", "user-preferences", "achievements"])
            .with_route("/progress", ["user-progress", "achievements"])
            .with_route("/activity", ["activity"])
            .with_route("/settings", ["user-preferences"])
    }

    /// Add or replace the data types of a route.
    pub fn with_route<I, S>(mut self, route: impl Into<String>, data_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert(route, data_types);
        self
    }

    /// Add or replace the data types of a route.
    pub fn insert<I, S>(&mut self, route: impl Into<String>, data_types: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.routes
            .insert(route.into(), data_types.into_iter().map(Into::into).collect());
    }

    /// Data types read on `route`; empty for unknown routes.
    pub fn data_types_for(&self, route: &str) -> Vec<String> {
        self.routes.get(route).cloned().unwrap_or_default()
    }

    /// Known routes, sorted.
    pub fn routes(&self) -> Vec<String> {
        let mut routes: Vec<String> = self.routes.keys().cloned().collect();
        routes.sort();
        routes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_observe_counts_and_refreshes() {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2024, 3, 2, 12, 0, 0).unwrap();
        let mut pattern = NavigationPattern::first_seen("/dashboard", "/progress", t0, vec![]);
        assert_eq!(pattern.key(), "/dashboard->/progress");

        pattern.observe(t1);
        assert_eq!(pattern.frequency, 2);
        assert_eq!(pattern.last_seen, t1);
    }

    #[test]
    fn test_expiry() {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let pattern = NavigationPattern::first_seen("/a", "/b", t0, vec![]);
        let thirty_days = Duration::from_secs(30 * 24 * 3600);

        assert!(!pattern.is_expired(thirty_days, t0 + chrono::Duration::days(30)));
        assert!(pattern.is_expired(thirty_days, t0 + chrono::Duration::days(31)));
        // Clock skew: last seen in the future is never expired
        assert!(!pattern.is_expired(thirty_days, t0 - chrono::Duration::days(1)));
    }

    #[test]
    fn test_standard_routes() {
        let routes = RouteDataMap::standard();
        assert_eq!(routes.data_types_for("/progress"), vec!["user-progress", "achievements"]);
        assert!(routes.data_types_for("/unknown").is_empty());
        assert_eq!(routes.routes().len(), 5);
    }
}
