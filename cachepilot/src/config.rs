//! INI configuration file.
//!
//! The file lives at `<config dir>/cachepilot/config.ini` by default:
//!
//! ```ini
//! [executor]
//! abandon_after_ms = 30000
//! gc_interval_secs = 60
//!
//! [navigation]
//! max_pattern_age_days = 30
//! max_prefetch_candidates = 3
//! min_prefetch_frequency = 2
//! namespace = navigation-patterns
//!
//! [persistence]
//! enabled = true
//! directory = /home/user/.cache/cachepilot
//!
//! [strategy.leaderboard]
//! strategy = stale-while-revalidate
//! stale_time_ms = 60000
//! tags = leaderboard, social
//!
//! [tag.social]
//! pattern = leaderboard|friends
//! dependencies = activity
//!
//! [route./leaderboard]
//! data_types = leaderboard
//! ```
//!
//! Strategy, tag and route sections add to the built-in presets.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use ini::{EscapePolicy, Ini, Properties, WriteOption};
use tracing::{info, warn};

use crate::error::ConfigurationError;
use crate::executor::{ExecutorConfig, DEFAULT_ABANDON_AFTER};
use crate::navigation::{FileSnapshotStore, LearnerConfig, RouteDataMap, DEFAULT_MAX_PATTERN_AGE, DEFAULT_NAMESPACE};
use crate::orchestrator::OrchestratorBuilder;
use crate::prefetch::{PrefetchConfig, DEFAULT_MAX_CANDIDATES, DEFAULT_MIN_FREQUENCY};
use crate::store::DEFAULT_GC_INTERVAL_SECS;
use crate::strategy::{Priority, StrategyConfig, StrategyKind};
use crate::tags::CacheTag;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

const STRATEGY_PREFIX: &str = "strategy.";
const TAG_PREFIX: &str = "tag.";
const ROUTE_PREFIX: &str = "route.";

/// Directory holding the configuration file.
pub fn config_directory() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cachepilot")
}

/// Default configuration file path.
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}

/// Default directory for persisted snapshots.
pub fn default_snapshot_directory() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cachepilot")
}

/// `[executor]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorSettings {
    pub abandon_after: Duration,
    pub gc_interval: Duration,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            abandon_after: DEFAULT_ABANDON_AFTER,
            gc_interval: Duration::from_secs(DEFAULT_GC_INTERVAL_SECS),
        }
    }
}

/// `[navigation]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationSettings {
    pub max_pattern_age: Duration,
    pub max_prefetch_candidates: usize,
    pub min_prefetch_frequency: u64,
    pub namespace: String,
}

impl Default for NavigationSettings {
    fn default() -> Self {
        Self {
            max_pattern_age: DEFAULT_MAX_PATTERN_AGE,
            max_prefetch_candidates: DEFAULT_MAX_CANDIDATES,
            min_prefetch_frequency: DEFAULT_MIN_FREQUENCY,
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

/// `[persistence]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistenceSettings {
    pub enabled: bool,
    pub directory: PathBuf,
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: default_snapshot_directory(),
        }
    }
}

/// A `[tag.<name>]` section.
///
/// The pattern is kept as text and compiled when the configuration is
/// applied, so a file round-trips unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSettings {
    pub pattern: String,
    pub dependencies: Vec<String>,
    pub ttl: Option<Duration>,
}

/// Parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    pub executor: ExecutorSettings,
    pub navigation: NavigationSettings,
    pub persistence: PersistenceSettings,
    /// Data type → strategy.
    pub strategies: BTreeMap<String, StrategyConfig>,
    /// Tag name → tag settings.
    pub tags: BTreeMap<String, TagSettings>,
    /// Route → data types.
    pub routes: BTreeMap<String, Vec<String>>,
}

impl ConfigFile {
    /// Load the default configuration file.
    ///
    /// A missing file yields the defaults.
    pub fn load() -> Result<Self, ConfigurationError> {
        Self::load_from(&config_file_path())
    }

    /// Load a configuration file. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigurationError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file_noescape(path).map_err(|e| match e {
            ini::Error::Io(e) => ConfigurationError::Io(e),
            ini::Error::Parse(e) => ConfigurationError::Parse(e.to_string()),
        })?;
        Self::from_ini(&ini)
    }

    /// Parse configuration text.
    pub fn parse(text: &str) -> Result<Self, ConfigurationError> {
        let ini = Ini::load_from_str_noescape(text).map_err(|e| ConfigurationError::Parse(e.to_string()))?;
        Self::from_ini(&ini)
    }

    /// Save to the default configuration file path.
    pub fn save(&self) -> Result<PathBuf, ConfigurationError> {
        let path = config_file_path();
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save to `path`, creating its parent directory.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigurationError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.to_ini().write_to_file_opt(path, write_options())?;
        info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Render as INI text.
    pub fn to_ini_string(&self) -> Result<String, ConfigurationError> {
        let mut buf = Vec::new();
        self.to_ini().write_to_opt(&mut buf, write_options())?;
        String::from_utf8(buf).map_err(|e| ConfigurationError::Parse(e.to_string()))
    }

    /// Apply the configuration to `builder`.
    ///
    /// Compiles tag patterns and, when persistence is enabled, attaches a
    /// [`FileSnapshotStore`] rooted at the configured directory.
    pub fn apply(&self, mut builder: OrchestratorBuilder) -> Result<OrchestratorBuilder, ConfigurationError> {
        builder = builder
            .executor_config(ExecutorConfig::default().with_abandon_after(self.executor.abandon_after))
            .learner_config(LearnerConfig {
                max_pattern_age: self.navigation.max_pattern_age,
                namespace: self.navigation.namespace.clone(),
            })
            .prefetch_config(PrefetchConfig {
                max_candidates: self.navigation.max_prefetch_candidates,
                min_frequency: self.navigation.min_prefetch_frequency,
            });

        for (data_type, config) in &self.strategies {
            builder = builder.strategy(data_type.clone(), config.clone());
        }

        for (name, settings) in &self.tags {
            let mut tag = CacheTag::new(name.clone(), &settings.pattern)?;
            for dependency in &settings.dependencies {
                tag = tag.depends_on(dependency.clone());
            }
            if let Some(ttl) = settings.ttl {
                tag = tag.with_ttl(ttl);
            }
            builder = builder.tag(tag);
        }

        if !self.routes.is_empty() {
            let mut routes = RouteDataMap::standard();
            for (route, data_types) in &self.routes {
                routes.insert(route.clone(), data_types.iter().cloned());
            }
            builder = builder.routes(routes);
        }

        if self.persistence.enabled {
            builder = builder.persistence(Arc::new(FileSnapshotStore::new(self.persistence.directory.clone())));
        }

        Ok(builder)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigurationError> {
        let mut config = Self::default();

        for (section, properties) in ini.iter() {
            let Some(section) = section else {
                for (key, _) in properties.iter() {
                    warn!(key, "Ignoring configuration key outside any section");
                }
                continue;
            };

            if section == "executor" {
                config.executor = parse_executor(properties)?;
            } else if section == "navigation" {
                config.navigation = parse_navigation(properties)?;
            } else if section == "persistence" {
                config.persistence = parse_persistence(properties)?;
            } else if let Some(data_type) = section.strip_prefix(STRATEGY_PREFIX) {
                let strategy = parse_strategy(section, properties)?;
                config.strategies.insert(data_type.to_string(), strategy);
            } else if let Some(name) = section.strip_prefix(TAG_PREFIX) {
                let tag = parse_tag(section, properties)?;
                config.tags.insert(name.to_string(), tag);
            } else if let Some(route) = section.strip_prefix(ROUTE_PREFIX) {
                let data_types = parse_route(section, properties);
                config.routes.insert(route.to_string(), data_types);
            } else {
                warn!(section, "Ignoring unknown configuration section");
            }
        }

        Ok(config)
    }

    fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();

        ini.with_section(Some("executor"))
            .set("abandon_after_ms", self.executor.abandon_after.as_millis().to_string())
            .set("gc_interval_secs", self.executor.gc_interval.as_secs().to_string());

        ini.with_section(Some("navigation"))
            .set(
                "max_pattern_age_days",
                (self.navigation.max_pattern_age.as_secs() / SECS_PER_DAY).to_string(),
            )
            .set(
                "max_prefetch_candidates",
                self.navigation.max_prefetch_candidates.to_string(),
            )
            .set(
                "min_prefetch_frequency",
                self.navigation.min_prefetch_frequency.to_string(),
            )
            .set("namespace", self.navigation.namespace.clone());

        ini.with_section(Some("persistence"))
            .set("enabled", self.persistence.enabled.to_string())
            .set("directory", self.persistence.directory.display().to_string());

        for (data_type, config) in &self.strategies {
            let section = format!("{}{}", STRATEGY_PREFIX, data_type);
            let mut setter = ini.with_section(Some(section));
            setter
                .set("strategy", config.strategy.as_str())
                .set("stale_time_ms", config.stale_time.as_millis().to_string())
                .set("gc_time_ms", config.gc_time.as_millis().to_string())
                .set("priority", config.priority.as_str())
                .set("retry_on_stale", config.retry_on_stale.to_string());
            if !config.tags.is_empty() {
                setter.set("tags", join_list(config.tags.iter()));
            }
            if let Some(timeout) = config.network_timeout {
                setter.set("network_timeout_ms", timeout.as_millis().to_string());
            }
        }

        for (name, tag) in &self.tags {
            let section = format!("{}{}", TAG_PREFIX, name);
            let mut setter = ini.with_section(Some(section));
            setter.set("pattern", tag.pattern.clone());
            if !tag.dependencies.is_empty() {
                setter.set("dependencies", join_list(tag.dependencies.iter()));
            }
            if let Some(ttl) = tag.ttl {
                setter.set("ttl_secs", ttl.as_secs().to_string());
            }
        }

        for (route, data_types) in &self.routes {
            ini.with_section(Some(format!("{}{}", ROUTE_PREFIX, route)))
                .set("data_types", join_list(data_types.iter()));
        }

        ini
    }
}

// Patterns are regexes; backslashes are written and read verbatim.
fn write_options() -> WriteOption {
    WriteOption {
        escape_policy: EscapePolicy::Nothing,
        ..Default::default()
    }
}

fn parse_executor(properties: &Properties) -> Result<ExecutorSettings, ConfigurationError> {
    let mut settings = ExecutorSettings::default();
    for (key, value) in properties.iter() {
        match key {
            "abandon_after_ms" => {
                settings.abandon_after = Duration::from_millis(parse_value("executor", key, value)?)
            }
            "gc_interval_secs" => {
                settings.gc_interval = Duration::from_secs(parse_value("executor", key, value)?)
            }
            _ => warn_unknown("executor", key),
        }
    }
    Ok(settings)
}

fn parse_navigation(properties: &Properties) -> Result<NavigationSettings, ConfigurationError> {
    let mut settings = NavigationSettings::default();
    for (key, value) in properties.iter() {
        match key {
            "max_pattern_age_days" => {
                let days: u64 = parse_value("navigation", key, value)?;
                settings.max_pattern_age =
                    duration_from_days(days).ok_or_else(|| invalid("navigation", key, value))?;
            }
            "max_prefetch_candidates" => {
                settings.max_prefetch_candidates = parse_value("navigation", key, value)?
            }
            "min_prefetch_frequency" => {
                settings.min_prefetch_frequency = parse_value("navigation", key, value)?
            }
            "namespace" => {
                let namespace = value.trim();
                if namespace.is_empty() {
                    return Err(invalid("navigation", key, value));
                }
                settings.namespace = namespace.to_string();
            }
            _ => warn_unknown("navigation", key),
        }
    }
    Ok(settings)
}

fn parse_persistence(properties: &Properties) -> Result<PersistenceSettings, ConfigurationError> {
    let mut settings = PersistenceSettings::default();
    for (key, value) in properties.iter() {
        match key {
            "enabled" => settings.enabled = parse_bool("persistence", key, value)?,
            "directory" => settings.directory = expand_tilde(value.trim()),
            _ => warn_unknown("persistence", key),
        }
    }
    Ok(settings)
}

fn parse_strategy(section: &str, properties: &Properties) -> Result<StrategyConfig, ConfigurationError> {
    let kind = match properties.get("strategy") {
        Some(value) => StrategyKind::from_str(value).map_err(|_| invalid(section, "strategy", value))?,
        None => return Err(invalid(section, "strategy", "")),
    };

    let mut config = StrategyConfig::new(kind);
    for (key, value) in properties.iter() {
        match key {
            "strategy" => {}
            "stale_time_ms" => config.stale_time = Duration::from_millis(parse_value(section, key, value)?),
            "gc_time_ms" => config.gc_time = Duration::from_millis(parse_value(section, key, value)?),
            "network_timeout_ms" => {
                config.network_timeout = Some(Duration::from_millis(parse_value(section, key, value)?))
            }
            "tags" => config.tags = split_list(value).into_iter().collect(),
            "priority" => {
                config.priority = Priority::from_str(value).map_err(|_| invalid(section, key, value))?
            }
            "retry_on_stale" => config.retry_on_stale = parse_bool(section, key, value)?,
            _ => warn_unknown(section, key),
        }
    }
    Ok(config)
}

fn parse_tag(section: &str, properties: &Properties) -> Result<TagSettings, ConfigurationError> {
    let pattern = match properties.get("pattern") {
        Some(pattern) if !pattern.trim().is_empty() => pattern.trim().to_string(),
        other => return Err(invalid(section, "pattern", other.unwrap_or_default())),
    };

    let mut tag = TagSettings {
        pattern,
        dependencies: Vec::new(),
        ttl: None,
    };
    for (key, value) in properties.iter() {
        match key {
            "pattern" => {}
            "dependencies" => tag.dependencies = split_list(value),
            "ttl_secs" => tag.ttl = Some(Duration::from_secs(parse_value(section, key, value)?)),
            _ => warn_unknown(section, key),
        }
    }
    Ok(tag)
}

fn parse_route(section: &str, properties: &Properties) -> Vec<String> {
    let mut data_types = Vec::new();
    for (key, value) in properties.iter() {
        match key {
            "data_types" => data_types = split_list(value),
            _ => warn_unknown(section, key),
        }
    }
    data_types
}

fn parse_value<T: FromStr>(section: &str, key: &str, value: &str) -> Result<T, ConfigurationError> {
    value.trim().parse().map_err(|_| invalid(section, key, value))
}

fn parse_bool(section: &str, key: &str, value: &str) -> Result<bool, ConfigurationError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(invalid(section, key, value)),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn join_list<'a>(items: impl Iterator<Item = &'a String>) -> String {
    items.map(String::as_str).collect::<Vec<_>>().join(", ")
}

fn expand_tilde(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

/// Convert a day count to a duration, or `None` if it does not fit.
pub fn duration_from_days(days: u64) -> Option<Duration> {
    days.checked_mul(SECS_PER_DAY).map(Duration::from_secs)
}

fn invalid(section: &str, key: &str, value: &str) -> ConfigurationError {
    ConfigurationError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn warn_unknown(section: &str, key: &str) {
    warn!(section, key, "Ignoring unknown configuration key");
}
