//! Error types for configuration loading and policy selection.

use std::path::PathBuf;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Error type for configuration operations
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration in {path} at '{key}': {message}")]
    Parse {
        path: PathBuf,
        key: String,
        message: String,
    },

    #[error("No configuration file found (searched: {0})")]
    NotFound(String),

    #[error("Unknown policy '{name}' (available: {available})")]
    UnknownPolicy { name: String, available: String },

    #[error("Invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Invalid policy '{name}': {reason}")]
    InvalidPolicy { name: String, reason: String },
}
