//! Navigation pattern maintenance commands.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use cachepilot::config::{duration_from_days, ConfigFile};
use cachepilot::navigation::{
    FileSnapshotStore, LearnerConfig, NavigationLearner, NavigationPattern, RouteDataMap,
};
use chrono::Utc;
use clap::Subcommand;
use console::style;

use super::common::{format_age, load_config};
use crate::error::CliError;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Pattern subcommands.
#[derive(Debug, Subcommand)]
pub enum PatternsAction {
    /// List learned transitions, most frequent first
    Show {
        /// Only transitions leaving this route
        #[arg(long)]
        from: Option<String>,

        /// Hide transitions seen fewer times than this
        #[arg(long, default_value_t = 1)]
        min_frequency: u64,
    },

    /// Drop transitions not seen recently
    Prune {
        /// Maximum age in days (defaults to the configured value)
        #[arg(long)]
        max_age_days: Option<u64>,
    },

    /// Forget every learned transition
    Clear,
}

/// Run a patterns subcommand.
pub fn run(config_path: Option<&Path>, action: PatternsAction) -> Result<(), CliError> {
    let config = load_config(config_path)?;

    match action {
        PatternsAction::Show { from, min_frequency } => {
            let learner = open_learner(&config, None);
            let mut patterns: Vec<NavigationPattern> = learner
                .patterns()
                .into_iter()
                .filter(|p| from.as_deref().map_or(true, |route| p.from == route))
                .filter(|p| p.frequency >= min_frequency)
                .collect();
            patterns.sort_by(|a, b| b.frequency.cmp(&a.frequency).then_with(|| a.key().cmp(&b.key())));
            print_patterns(&config, &patterns);
            Ok(())
        }
        PatternsAction::Prune { max_age_days } => {
            let max_age = max_age_days.map(max_age_from_days).transpose()?;
            let learner = open_learner(&config, max_age);
            // Expired patterns are dropped while loading
            learner.save_snapshot()?;
            let days = learner.config().max_pattern_age.as_secs() / SECS_PER_DAY;
            println!(
                "{} patterns kept (maximum age {} days)",
                style(learner.len()).bold(),
                days
            );
            Ok(())
        }
        PatternsAction::Clear => {
            let learner = open_learner(&config, None);
            let count = learner.len();
            learner.clear();
            println!("Cleared {} navigation patterns", style(count).bold());
            Ok(())
        }
    }
}

fn max_age_from_days(days: u64) -> Result<Duration, CliError> {
    duration_from_days(days)
        .ok_or_else(|| CliError::Config(format!("--max-age-days {} is too large", days)))
}

fn open_learner(config: &ConfigFile, max_age: Option<Duration>) -> NavigationLearner {
    let mut routes = RouteDataMap::standard();
    for (route, data_types) in &config.routes {
        routes.insert(route.clone(), data_types.iter().cloned());
    }
    let learner_config = LearnerConfig {
        max_pattern_age: max_age.unwrap_or(config.navigation.max_pattern_age),
        namespace: config.navigation.namespace.clone(),
    };
    let store = FileSnapshotStore::new(config.persistence.directory.clone());
    NavigationLearner::new(routes, learner_config).with_persistence(Arc::new(store))
}

fn print_patterns(config: &ConfigFile, patterns: &[NavigationPattern]) {
    let snapshot = FileSnapshotStore::new(config.persistence.directory.clone());
    println!(
        "Navigation patterns: {}",
        snapshot.path_for(&config.navigation.namespace).display()
    );
    if patterns.is_empty() {
        println!("  (none)");
        return;
    }

    let now = Utc::now();
    let threshold = config.navigation.min_prefetch_frequency;
    for pattern in patterns {
        let transition = format!("{} -> {}", pattern.from, pattern.to);
        let frequency = if pattern.frequency >= threshold {
            style(pattern.frequency).green().bold()
        } else {
            style(pattern.frequency).dim()
        };
        println!(
            "  {:<32} {:>5}  {:<8}  {}",
            transition,
            frequency,
            format_age(now - pattern.last_seen),
            pattern.prefetch_targets.join(", ")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_age_from_days() {
        assert_eq!(max_age_from_days(7).unwrap(), Duration::from_secs(7 * SECS_PER_DAY));
        let err = max_age_from_days(u64::MAX).unwrap_err();
        assert!(matches!(err, CliError::Config(msg) if msg.contains("too large")));
    }
}
