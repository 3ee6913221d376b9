//! Helpers shared across CLI commands.

use std::path::Path;

use cachepilot::config::{config_file_path, ConfigFile};

use crate::error::CliError;

/// Load the configuration from `path`, or from the default location.
///
/// A missing file yields the defaults.
pub fn load_config(path: Option<&Path>) -> Result<ConfigFile, CliError> {
    match path {
        Some(path) => Ok(ConfigFile::load_from(path)?),
        None => Ok(ConfigFile::load_from(&config_file_path())?),
    }
}

/// Format a duration in the largest whole unit that fits.
pub fn format_age(age: chrono::Duration) -> String {
    let secs = age.num_seconds().max(0);
    match secs {
        s if s < 60 => format!("{}s ago", s),
        s if s < 3600 => format!("{}m ago", s / 60),
        s if s < 86_400 => format!("{}h ago", s / 3600),
        s => format!("{}d ago", s / 86_400),
    }
}
