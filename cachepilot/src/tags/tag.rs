//! Tag definition.

use std::time::Duration;

use regex::Regex;

use crate::error::ConfigurationError;
use crate::key::{segment_pattern, CacheKey};

/// A named group of cache entries that are invalidated together.
///
/// Membership is decided by `pattern`, matched against the canonical
/// serialization of each key (see [`CacheKey::serialized`]).
#[derive(Debug, Clone)]
pub struct CacheTag {
    /// Tag name.
    pub name: String,
    /// Matcher over serialized keys.
    pub pattern: Regex,
    /// Tags invalidated whenever this one is.
    pub dependencies: Vec<String>,
    /// Maximum age of matched entries, enforced by [`super::Invalidator::expire`].
    pub ttl: Option<Duration>,
}

impl CacheTag {
    /// Create a tag from a regular expression.
    pub fn new(name: impl Into<String>, pattern: &str) -> Result<Self, ConfigurationError> {
        let name = name.into();
        match Regex::new(pattern) {
            Ok(pattern) => Ok(Self::with_regex(name, pattern)),
            Err(source) => Err(ConfigurationError::InvalidPattern { tag: name, source }),
        }
    }

    /// Create a tag from a compiled regex.
    pub fn with_regex(name: impl Into<String>, pattern: Regex) -> Self {
        Self {
            name: name.into(),
            pattern,
            dependencies: Vec::new(),
            ttl: None,
        }
    }

    /// Create a tag matching every key that has `name` as a whole segment.
    ///
    /// `CacheTag::for_segment("activity")` matches `["activity","u1"]` but not
    /// `["user-activity-log","u1"]`.
    pub fn for_segment(name: impl Into<String>) -> Result<Self, ConfigurationError> {
        let name = name.into();
        let pattern = segment_pattern(&name);
        Self::new(name, &pattern)
    }

    /// Add a dependency.
    pub fn depends_on(mut self, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        if !self.dependencies.contains(&tag) {
            self.dependencies.push(tag);
        }
        self
    }

    /// Set the time-to-live of matched entries.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Whether a serialized key belongs to this tag.
    pub fn matches(&self, serialized_key: &str) -> bool {
        self.pattern.is_match(serialized_key)
    }

    /// Whether `key` belongs to this tag.
    pub fn matches_key(&self, key: &CacheKey) -> bool {
        self.matches(&key.serialized())
    }
}
