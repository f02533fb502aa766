//! Configuration module
//!
//! This module handles application configuration, including loading from
//! different sources (files, environment variables, command line arguments)
//! and validating the configuration.
//!
//! The configuration is read once at startup and turned into an immutable
//! [`ProbeContext`](crate::protocol::ProbeContext); nothing here is global.

// Submodules
mod defaults;
mod error;
mod loader;
mod merger;
mod validator;

// Re-export types and traits
pub use self::error::{ConfigError, Result};
pub use self::loader::ConfigLoader;
pub use self::merger::ConfigMerger;
pub use self::validator::ConfigValidator;
pub use self::defaults::{ENV_PREFIX, DEFAULT_CONFIG_FILE, LISTEN_STR, ON_TIMEOUT_STR, LOG_LEVEL_STR};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One protocol entry, in priority order within [`DemuxConfig::protocols`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ProtocolConfig {
    /// Unique protocol name; also the built-in probe used by default
    pub name: String,

    /// Backend host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Backend port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Probe to use: "builtin" (default, by name), "regex", "timeout",
    /// "none", or the name of any built-in probe
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe: Option<String>,

    /// Do not probe before this many bytes have arrived
    #[serde(default, alias = "minlength", skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,

    /// SNI hostnames accepted by the tls probe (`*.domain` wildcards allowed)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sni_hostnames: Vec<String>,

    /// ALPN protocols accepted by the tls probe
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alpn_protocols: Vec<String>,

    /// Patterns for the regex probe, tried in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub regex_patterns: Vec<String>,

    /// 0 silences the per-connection routing log line
    #[serde(default = "defaults::protocol_log_level")]
    pub log_level: u8,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            host: None,
            port: None,
            probe: None,
            min_length: None,
            sni_hostnames: Vec::new(),
            alpn_protocols: Vec::new(),
            regex_patterns: Vec::new(),
            log_level: defaults::protocol_log_level(),
        }
    }
}

impl ProtocolConfig {
    /// Parse the `NAME=HOST:PORT` form used on the command line
    pub fn from_spec(spec: &str) -> Result<Self> {
        let invalid = |msg: &str| ConfigError::InvalidValue("protocol".to_string(), format!("{}: {}", spec, msg));

        let (name, target) = spec.split_once('=').ok_or_else(|| invalid("expected NAME=HOST:PORT"))?;
        let (host, port) = target.rsplit_once(':').ok_or_else(|| invalid("missing port"))?;
        let port = port.parse::<u16>().map_err(|_| invalid("port is not a number"))?;

        if name.is_empty() || host.is_empty() {
            return Err(invalid("empty name or host"));
        }

        Ok(Self {
            name: name.to_string(),
            host: Some(host.trim_matches(|c| c == '[' || c == ']').to_string()),
            port: Some(port),
            ..Self::default()
        })
    }
}

/// Demultiplexer configuration
///
/// Contains all configuration options needed by the listener and the prober.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
#[serde(default)]
pub struct DemuxConfig {
    /// Addresses to listen on
    #[serde(default = "defaults::listen")]
    pub listen: Vec<String>,

    /// Seconds to wait for a decision before using `on_timeout`
    #[serde(default = "defaults::timeout")]
    pub timeout: u64,

    /// Protocol chosen when probing times out
    #[serde(default = "defaults::on_timeout")]
    pub on_timeout: String,

    /// Probe tracing: 1 logs verdicts, 2 also dumps the inspected bytes
    #[serde(default = "defaults::verbose")]
    pub verbose: u8,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "defaults::log_level")]
    pub log_level: String,

    /// Read chunk while probing and forwarding buffer size, in bytes
    #[serde(default = "defaults::buffer_size")]
    pub buffer_size: usize,

    /// Seconds allowed to connect to a backend
    #[serde(default = "defaults::connect_timeout")]
    pub connect_timeout: u64,

    /// Protocols in probing order; the last one is the catch-all
    #[serde(default)]
    pub protocols: Vec<ProtocolConfig>,
}

impl Default for DemuxConfig {
    #[inline]
    fn default() -> Self {
        Self {
            listen: defaults::listen(),
            timeout: defaults::timeout(),
            on_timeout: defaults::on_timeout(),
            verbose: defaults::verbose(),
            log_level: defaults::log_level(),
            buffer_size: defaults::buffer_size(),
            connect_timeout: defaults::connect_timeout(),
            protocols: Vec::new(),
        }
    }
}

impl DemuxConfig {
    /// Probing deadline
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Backend connect deadline
    pub fn backend_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    /// Find a protocol entry by name
    pub fn protocol(&self, name: &str) -> Option<&ProtocolConfig> {
        self.protocols.iter().find(|p| p.name == name)
    }
}

impl AsRef<DemuxConfig> for DemuxConfig {
    #[inline]
    fn as_ref(&self) -> &DemuxConfig {
        self
    }
}

/// Log the configuration
pub fn log_config(config: &DemuxConfig) {
    use log::info;

    if !log::log_enabled!(log::Level::Info) {
        return;
    }

    info!("=== Final Configuration ===");
    info!("  Listen: {}", config.listen.join(", "));
    info!("  Probe timeout: {} seconds (then {})", config.timeout, config.on_timeout);
    info!("  Verbose: {}", config.verbose);
    info!("  Log level: {}", config.log_level);
    info!("  Buffer size: {} bytes", config.buffer_size);
    info!("  Connect timeout: {} seconds", config.connect_timeout);
    info!("Protocols (in probing order):");
    for protocol in &config.protocols {
        let target = match (&protocol.host, protocol.port) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            _ => "-".to_string(),
        };
        info!(
            "  {} -> {} (probe: {})",
            protocol.name,
            target,
            protocol.probe.as_deref().unwrap_or("builtin")
        );
    }
    info!("=========================");
}
