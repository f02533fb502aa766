//! Configuration loading functionality
//!
//! This module provides functionality for loading configuration from different sources
//! such as files, environment variables, and command-line arguments.

use std::env;
use std::fs;
use std::path::Path;

use log::{debug, info};

use crate::config::defaults::{self, ENV_PREFIX};
use crate::config::error::{ConfigError, Result};
use crate::config::merger::ConfigMerger;
use crate::config::{DemuxConfig, ProtocolConfig};

/// Trait for loading configuration from different sources
pub trait ConfigLoader {
    /// Load configuration from a JSON file
    fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> where Self: Sized;

    /// Load configuration from `PORTMUX_*` environment variables
    fn from_env() -> Result<Self> where Self: Sized;

    /// Load with priority: defaults < file < environment
    ///
    /// `path` defaults to `portmux.json` in the working directory, which may
    /// be absent; an explicitly given path must exist.
    fn load(path: Option<&Path>) -> Result<Self> where Self: Sized;
}

impl ConfigLoader for DemuxConfig {
    fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.is_file() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::FileReadError(path.to_path_buf(), e.to_string()))?;

        serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))
    }

    fn from_env() -> Result<Self> {
        let get_env = |name: &str| -> Option<String> {
            env::var(format!("{}{}", ENV_PREFIX, name)).ok()
        };

        fn parse_num<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
            value.trim().parse::<T>().map_err(|_| {
                ConfigError::InvalidValue(format!("{}{}", ENV_PREFIX, name), format!("not a number: {}", value))
            })
        }

        let mut config = Self::default();

        if let Some(value) = get_env("LISTEN") {
            config.listen = value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(value) = get_env("TIMEOUT") {
            config.timeout = parse_num("TIMEOUT", &value)?;
        }
        if let Some(value) = get_env("ON_TIMEOUT") {
            config.on_timeout = value;
        }
        if let Some(value) = get_env("VERBOSE") {
            config.verbose = parse_num("VERBOSE", &value)?;
        }
        if let Some(value) = get_env("LOG_LEVEL") {
            config.log_level = value;
        }
        if let Some(value) = get_env("BUFFER_SIZE") {
            config.buffer_size = parse_num("BUFFER_SIZE", &value)?;
        }
        if let Some(value) = get_env("CONNECT_TIMEOUT") {
            config.connect_timeout = parse_num("CONNECT_TIMEOUT", &value)?;
        }
        // Protocols as NAME=HOST:PORT, comma separated, in probing order
        if let Some(value) = get_env("PROTOCOLS") {
            config.protocols = value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ProtocolConfig::from_spec)
                .collect::<Result<Vec<_>>>()?;
        }

        Ok(config)
    }

    fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();
        debug!("Starting with default configuration");

        match path {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                config = config.merge(Self::from_file(path)?);
            }
            None => {
                let default_path = Path::new(defaults::DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    info!("Loading configuration from {}", default_path.display());
                    config = config.merge(Self::from_file(default_path)?);
                }
            }
        }

        let env_config = Self::from_env()?;
        if env_config != Self::default() {
            info!("Applying configuration from environment variables");
            config = config.merge(env_config);
        } else {
            debug!("No environment variable configuration found");
        }

        Ok(config)
    }
}
