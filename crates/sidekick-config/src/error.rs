//! Configuration errors.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file {} does not exist", .0.display())]
    NotFound(PathBuf),

    #[error("Invalid config format: {0}")]
    InvalidFormat(String),

    /// First error reported by the validator.
    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Config references ${{{0}}}, which is not set")]
    EnvVarNotSet(String),

    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}
