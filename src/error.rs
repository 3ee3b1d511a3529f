//! Error types for the Keel host

use thiserror::Error;

/// Result type alias for Keel operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the Keel host
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (bad plugins root, bad database URL, ...)
    ///
    /// Fatal when raised during startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// A single plugin failed to load
    #[error("plugin '{name}' failed to load: {reason}")]
    PluginLoad { name: String, reason: String },

    /// A health probe failed internally
    #[error("probe error: {0}")]
    Probe(String),

    /// A route was registered twice for the same path and method
    #[error("route conflict: {method} {path} is already registered")]
    RouteConflict { method: String, path: String },

    /// Invalid route path
    #[error("invalid route path: {0}")]
    InvalidRoute(String),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// YAML parsing error
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
