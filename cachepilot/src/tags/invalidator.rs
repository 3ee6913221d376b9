//! Cascading invalidation.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

use regex::Regex;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::registry::TagRegistry;
use crate::key::{data_type_pattern, subject_pattern, CacheKey};
use crate::store::QueryStore;
use crate::strategy::StrategyRegistry;

/// What happens to invalidated entries that have active consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefetchMode {
    /// Only mark matched entries stale.
    #[default]
    None,
    /// Also refetch matched entries that currently have subscribers.
    Active,
}

impl FromStr for RefetchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(RefetchMode::None),
            "active" => Ok(RefetchMode::Active),
            other => Err(format!("unknown refetch mode '{}'", other)),
        }
    }
}

/// Outcome of one invalidation call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationReport {
    /// Every entry marked stale, in match order, without duplicates.
    pub invalidated: Vec<CacheKey>,
    /// Invalidated entries to refetch now (empty unless [`RefetchMode::Active`]).
    pub refetch: Vec<CacheKey>,
    /// Tags visited, including dependencies, in visit order.
    pub tags: Vec<String>,
    seen: HashSet<CacheKey>,
}

impl InvalidationReport {
    fn absorb(&mut self, keys: Vec<CacheKey>, mode: RefetchMode, store: &dyn QueryStore) {
        for key in keys {
            if !self.seen.insert(key.clone()) {
                continue;
            }
            if mode == RefetchMode::Active && store.subscriber_count(&key) > 0 {
                self.refetch.push(key.clone());
            }
            self.invalidated.push(key);
        }
    }
}

/// Invalidates store entries by tag, pattern, or subject.
///
/// The invalidator is the only component that follows tag dependencies.
/// A tag name also covers every data type whose [`StrategyConfig`] lists it,
/// whether or not a [`CacheTag`] of that name is registered.
///
/// [`StrategyConfig`]: crate::strategy::StrategyConfig
/// [`CacheTag`]: super::CacheTag
pub struct Invalidator {
    tags: Arc<TagRegistry>,
    store: Arc<dyn QueryStore>,
    strategies: Option<Arc<StrategyRegistry>>,
}

impl Invalidator {
    /// Create an invalidator over `tags` and `store`.
    pub fn new(tags: Arc<TagRegistry>, store: Arc<dyn QueryStore>) -> Self {
        Self {
            tags,
            store,
            strategies: None,
        }
    }

    /// Also invalidate the data types whose strategy config carries a tag.
    pub fn with_strategies(mut self, strategies: Arc<StrategyRegistry>) -> Self {
        self.strategies = Some(strategies);
        self
    }

    /// The tag registry.
    pub fn tags(&self) -> &Arc<TagRegistry> {
        &self.tags
    }

    /// Invalidate every entry of tag `name` and, transitively, of its
    /// dependencies.
    ///
    /// Each tag is visited at most once per call. Unknown tags are skipped.
    pub fn invalidate_by_tag(&self, name: &str, mode: RefetchMode) -> InvalidationReport {
        let mut report = InvalidationReport::default();
        let mut visited = HashSet::new();
        self.cascade(name, mode, &mut visited, &mut report);
        debug!(
            tag = %name,
            tags = report.tags.len(),
            invalidated = report.invalidated.len(),
            refetch = report.refetch.len(),
            "Tag invalidated"
        );
        report
    }

    /// Invalidate every entry whose serialized key matches `pattern`.
    pub fn invalidate_by_pattern(&self, pattern: &Regex, mode: RefetchMode) -> InvalidationReport {
        let mut report = InvalidationReport::default();
        let keys = self.store.invalidate(&|serialized: &str| pattern.is_match(serialized));
        report.absorb(keys, mode, self.store.as_ref());
        debug!(
            pattern = %pattern,
            invalidated = report.invalidated.len(),
            "Pattern invalidated"
        );
        report
    }

    /// Invalidate every entry that has `subject_id` as a key segment.
    pub fn invalidate_for_subject(&self, subject_id: &str, mode: RefetchMode) -> InvalidationReport {
        match subject_pattern(subject_id) {
            Ok(pattern) => self.invalidate_by_pattern(&pattern, mode),
            Err(e) => {
                warn!(subject = %subject_id, error = %e, "Cannot build subject pattern");
                InvalidationReport::default()
            }
        }
    }

    /// Invalidate entries older than the TTL of the tag that matches them.
    pub fn expire(&self) -> InvalidationReport {
        let now = Instant::now();
        let mut report = InvalidationReport::default();

        for tag in self.tags.tags() {
            let Some(ttl) = tag.ttl else { continue };
            let expired: HashSet<String> = self
                .store
                .summaries()
                .into_iter()
                .filter(|summary| tag.matches_key(&summary.key))
                .filter(|summary| {
                    self.store
                        .get(&summary.key)
                        .is_some_and(|cached| !cached.invalidated && cached.age(now) >= ttl)
                })
                .map(|summary| summary.key.serialized())
                .collect();
            if expired.is_empty() {
                continue;
            }

            let keys = self.store.invalidate(&|serialized: &str| expired.contains(serialized));
            report.tags.push(tag.name.clone());
            report.absorb(keys, RefetchMode::None, self.store.as_ref());
        }
        report
    }

    fn cascade(
        &self,
        name: &str,
        mode: RefetchMode,
        visited: &mut HashSet<String>,
        report: &mut InvalidationReport,
    ) {
        if !visited.insert(name.to_string()) {
            return;
        }
        let tag = self.tags.get(name);
        let tagged = self.tagged_data_types(name);
        if tag.is_none() && tagged.is_none() {
            debug!(tag = %name, "Unknown tag, nothing to invalidate");
            return;
        }

        report.tags.push(name.to_string());
        let keys = self.store.invalidate(&|serialized: &str| {
            tag.as_ref().is_some_and(|tag| tag.matches(serialized))
                || tagged.as_ref().is_some_and(|re| re.is_match(serialized))
        });
        report.absorb(keys, mode, self.store.as_ref());

        if let Some(tag) = tag {
            for dependency in &tag.dependencies {
                self.cascade(dependency, mode, visited, report);
            }
        }
    }

    /// Regex over the keys of every data type configured with tag `name`.
    fn tagged_data_types(&self, name: &str) -> Option<Regex> {
        let data_types = self.strategies.as_ref()?.data_types_tagged(name);
        if data_types.is_empty() {
            return None;
        }
        match Regex::new(&data_type_pattern(&data_types)) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!(tag = %name, error = %e, "Cannot build data type pattern");
                None
            }
        }
    }
}
