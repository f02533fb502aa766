//! Configuration errors
//!
//! This module defines error types for the configuration module.

use std::fmt;
use std::error::Error;
use std::path::PathBuf;

/// Configuration error type
#[derive(Debug)]
pub enum ConfigError {
    /// File not found
    FileNotFound(PathBuf),

    /// Error reading file
    FileReadError(PathBuf, String),

    /// Error parsing configuration
    ParseError(String),

    /// Invalid value for configuration option
    InvalidValue(String, String),

    /// Missing required configuration value
    MissingRequiredValue(String),

    /// Invalid combination of configuration options
    InvalidCombination(String),

    /// Protocol refers to a probe that does not exist (protocol, probe)
    UnknownProbe(String, String),

    /// Probe exists but this build does not include it
    ProbeUnavailable(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) =>
                write!(f, "Configuration file not found: {}", path.display()),

            ConfigError::FileReadError(path, err) =>
                write!(f, "Error reading configuration file {}: {}", path.display(), err),

            ConfigError::ParseError(msg) =>
                write!(f, "Error parsing configuration: {}", msg),

            ConfigError::InvalidValue(name, msg) =>
                write!(f, "Invalid value for '{}': {}", name, msg),

            ConfigError::MissingRequiredValue(name) =>
                write!(f, "Missing required configuration value: {}", name),

            ConfigError::InvalidCombination(msg) =>
                write!(f, "Invalid combination of configuration options: {}", msg),

            ConfigError::UnknownProbe(protocol, probe) =>
                write!(f, "Protocol '{}' uses unknown probe '{}'", protocol, probe),

            ConfigError::ProbeUnavailable(probe) =>
                write!(f, "Probe '{}' is not available in this build", probe),
        }
    }
}

impl Error for ConfigError {}

/// Result type alias for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

// Convert to crate's common error type
impl From<ConfigError> for crate::common::DemuxError {
    fn from(err: ConfigError) -> Self {
        crate::common::DemuxError::Config(err.to_string())
    }
}
