//! Error taxonomy for the orchestration layer.
//!
//! Only two kinds of error ever reach a caller of [`crate::CacheOrchestrator::read`]:
//! a final transport failure with no usable cache fallback, and a
//! configuration mistake. Persistence failures are logged and swallowed by
//! the navigation learner, and prefetch/warming failures are isolated per key.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Failure of a transport fetch.
///
/// Cloneable because a single in-flight fetch result is shared by every
/// caller that joined it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The transport reported a failure.
    #[error("fetch failed: {message}")]
    Failed { message: String },

    /// The fetch did not settle within the allowed time.
    #[error("fetch timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The fetch was cancelled before it settled.
    #[error("fetch was cancelled")]
    Cancelled,
}

impl TransportError {
    /// Convenience constructor for [`TransportError::Failed`].
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// A programming or configuration mistake.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// No strategy is registered for the data type and no fallback exists.
    #[error("no strategy registered for data type '{0}'")]
    UnknownDataType(String),

    /// No fetcher is registered for the data type.
    #[error("no fetcher registered for data type '{0}'")]
    MissingFetcher(String),

    /// Registering the tag would introduce a dependency cycle.
    #[error("tag '{tag}' would create a dependency cycle: {}", .cycle.join(" -> "))]
    CyclicTagDependency { tag: String, cycle: Vec<String> },

    /// A tag pattern is not a valid regular expression.
    #[error("invalid pattern for tag '{tag}': {source}")]
    InvalidPattern {
        tag: String,
        #[source]
        source: regex::Error,
    },

    /// A cache key cannot be mapped back to a data type and subject.
    #[error("cache key {0} does not name a data type and subject")]
    InvalidKey(String),

    /// A configuration value could not be parsed.
    #[error("invalid value '{value}' for [{section}] {key}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
    },

    /// The configuration file could not be read or written.
    #[error("config file I/O error: {0}")]
    Io(#[from] io::Error),

    /// The configuration file is not valid INI.
    #[error("config file parse error: {0}")]
    Parse(String),
}

/// Failure while loading or saving a persisted snapshot.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// I/O error on the snapshot backend.
    #[error("snapshot I/O error for '{namespace}': {source}")]
    Io {
        namespace: String,
        #[source]
        source: io::Error,
    },

    /// The snapshot could not be encoded.
    #[error("failed to encode snapshot: {0}")]
    Encode(String),

    /// The stored snapshot could not be decoded.
    #[error("failed to decode snapshot: {0}")]
    Decode(String),
}

/// Error returned by read operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The transport failed and no cached fallback was available.
    #[error("network error: {0}")]
    Network(#[from] TransportError),

    /// The read could not be routed.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

impl CacheError {
    /// Returns `true` if this error indicates a programming mistake.
    pub fn is_configuration(&self) -> bool {
        matches!(self, CacheError::Configuration(_))
    }
}
