//! CLI error type.

use std::fmt;

use cachepilot::{CacheError, ConfigurationError, PersistenceError};

/// Errors surfaced to the user by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// Configuration could not be loaded, parsed or saved.
    Config(String),
    /// The navigation snapshot could not be read or written.
    Patterns(String),
    /// The simulation script could not be read or a read failed.
    Simulate(String),
    /// Logging could not be initialised.
    Logging(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Patterns(msg) => write!(f, "Navigation patterns error: {}", msg),
            CliError::Simulate(msg) => write!(f, "Simulation error: {}", msg),
            CliError::Logging(msg) => write!(f, "Logging error: {}", msg),
        }
    }
}

impl std::error::Error for CliError {}

impl From<ConfigurationError> for CliError {
    fn from(e: ConfigurationError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<PersistenceError> for CliError {
    fn from(e: PersistenceError) -> Self {
        CliError::Patterns(e.to_string())
    }
}

impl From<CacheError> for CliError {
    fn from(e: CacheError) -> Self {
        CliError::Simulate(e.to_string())
    }
}
