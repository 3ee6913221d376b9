//! Data type → strategy configuration registry.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{info, warn};

use super::config::{Priority, StrategyConfig};
use crate::error::ConfigurationError;

/// Owns the [`StrategyConfig`] of every data type.
///
/// Lookups for unregistered data types fall back to an optional default
/// config; without one they fail with [`ConfigurationError::UnknownDataType`].
#[derive(Debug, Default)]
pub struct StrategyRegistry {
    configs: RwLock<HashMap<String, StrategyConfig>>,
    fallback: Option<StrategyConfig>,
}

impl StrategyRegistry {
    /// Create an empty registry without a fallback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry pre-populated with the built-in data types.
    pub fn with_presets() -> Self {
        let registry = Self::new();
        for (data_type, config) in presets() {
            registry.configure(data_type, config);
        }
        registry
    }

    /// Use `config` for data types that have no registration.
    pub fn with_fallback(mut self, config: StrategyConfig) -> Self {
        self.fallback = Some(config);
        self
    }

    /// Register or replace the config of a data type.
    pub fn configure(&self, data_type: impl Into<String>, config: StrategyConfig) {
        let data_type = data_type.into();
        if !config.is_consistent() {
            warn!(
                data_type = %data_type,
                stale_time_ms = config.stale_time.as_millis() as u64,
                gc_time_ms = config.gc_time.as_millis() as u64,
                "gcTime is shorter than staleTime; fresh entries may be evicted"
            );
        }
        info!(data_type = %data_type, strategy = %config.strategy, "Strategy configured");
        self.configs.write().insert(data_type, config);
    }

    /// Resolve the config for a data type.
    pub fn resolve(&self, data_type: &str) -> Result<StrategyConfig, ConfigurationError> {
        if let Some(config) = self.configs.read().get(data_type) {
            return Ok(config.clone());
        }
        self.fallback
            .clone()
            .ok_or_else(|| ConfigurationError::UnknownDataType(data_type.to_string()))
    }

    /// Whether a data type has its own registration.
    pub fn contains(&self, data_type: &str) -> bool {
        self.configs.read().contains_key(data_type)
    }

    /// Number of registered data types.
    pub fn len(&self) -> usize {
        self.configs.read().len()
    }

    /// Whether no data type is registered.
    pub fn is_empty(&self) -> bool {
        self.configs.read().is_empty()
    }

    /// Registered data types, sorted.
    pub fn data_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.configs.read().keys().cloned().collect();
        types.sort();
        types
    }

    /// Registered data types whose config carries `tag`, sorted.
    pub fn data_types_tagged(&self, tag: &str) -> Vec<String> {
        let mut types: Vec<String> = self
            .configs
            .read()
            .iter()
            .filter(|(_, config)| config.tags.contains(tag))
            .map(|(data_type, _)| data_type.clone())
            .collect();
        types.sort();
        types
    }
}

/// Built-in data types and their strategies.
fn presets() -> Vec<(&'static str, StrategyConfig)> {
    const MINUTE: Duration = Duration::from_secs(60);

    vec![
        (
            "user-profile",
            StrategyConfig::cache_first(5 * MINUTE)
                .with_gc_time(30 * MINUTE)
                .with_tag("user")
                .with_tag("profile")
                .with_priority(Priority::High),
        ),
        (
            "user-preferences",
            StrategyConfig::cache_first(10 * MINUTE)
                .with_gc_time(60 * MINUTE)
                .with_tag("user")
                .with_tag("preferences")
                .with_priority(Priority::High),
        ),
        (
            "user-progress",
            StrategyConfig::stale_while_revalidate(MINUTE)
                .with_gc_time(10 * MINUTE)
                .with_tag("user")
                .with_tag("progress")
                .with_retry_on_stale(true),
        ),
        (
            "achievements",
            StrategyConfig::stale_while_revalidate(5 * MINUTE)
                .with_gc_time(30 * MINUTE)
                .with_tag("user")
                .with_tag("achievements"),
        ),
        (
            "activity",
            StrategyConfig::network_first(Some(Duration::from_secs(3)))
                .with_stale_time(Duration::from_secs(30))
                .with_gc_time(5 * MINUTE)
                .with_tag("user")
                .with_tag("activity"),
        ),
        (
            "dashboard-summary",
            StrategyConfig::stale_while_revalidate(Duration::from_secs(30))
                .with_gc_time(5 * MINUTE)
                .with_tag("dashboard")
                .with_priority(Priority::Low),
        ),
    ]
}
