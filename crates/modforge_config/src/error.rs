//! Error types for the config module.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for config operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that can occur while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration path not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid configuration in {path}: {message}")]
    InvalidDocument { path: PathBuf, message: String },

    #[error("Unsupported value at '{key}': {reason}")]
    UnsupportedValue { key: String, reason: String },

    #[error("Module '{module}' has a non-boolean 'selected' flag")]
    InvalidSelected { module: String },

    #[error("Invalid project name '{0}': must be a single directory name")]
    InvalidProjectName(String),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
}
