//! Configuration validator
//!
//! This module provides functionality for validating configuration.

use log::warn;

use crate::config::error::{ConfigError, Result};
use crate::config::{DemuxConfig, ProtocolConfig};
use crate::protocol::{lookup_detector, DetectorKind, BUILTIN_PROBE, CATCH_ALL, NO_PROBE, REGEX_PROBE};

/// Configuration validator trait
pub trait ConfigValidator {
    /// Validate configuration
    ///
    /// Returns an error if the configuration cannot be used to start the
    /// demultiplexer.
    fn validate(&self) -> Result<()>;

    /// Check configuration for potential issues
    ///
    /// Unlike `validate()`, this never fails; it returns human-readable warnings.
    fn check_warnings(&self) -> Vec<String>;
}

impl ConfigValidator for DemuxConfig {
    fn validate(&self) -> Result<()> {
        validate_general_settings(self)?;
        validate_protocols(self)?;
        Ok(())
    }

    fn check_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        match self.log_level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            level => warnings.push(format!("Invalid log level '{}', using default 'info'", level)),
        }

        if self.verbose > 2 {
            warnings.push(format!("verbose {} is treated as 2", self.verbose));
        }

        if !self.protocols.is_empty() && self.protocol(&self.on_timeout).is_none() {
            warnings.push(format!(
                "on_timeout protocol '{}' is not defined, timeouts will use '{}'",
                self.on_timeout, self.protocols[0].name
            ));
        }

        let last = self.protocols.len().saturating_sub(1);
        for (i, protocol) in self.protocols.iter().enumerate() {
            if protocol.name == CATCH_ALL && i != last {
                warnings.push(format!(
                    "'{}' is not the last protocol, every protocol after it is unreachable",
                    CATCH_ALL
                ));
            }
            if probe_kind(protocol) == Some(DetectorKind::Regex) && protocol.min_length.is_none() {
                warnings.push(format!(
                    "regex protocol '{}' has no min_length; short prefixes are rejected immediately",
                    protocol.name
                ));
            }
        }

        for warning in &warnings {
            warn!("{}", warning);
        }
        warnings
    }
}

/// Probe name a protocol entry resolves to
fn probe_name(protocol: &ProtocolConfig) -> Option<&str> {
    match protocol.probe.as_deref() {
        Some(NO_PROBE) => None,
        None | Some(BUILTIN_PROBE) => Some(protocol.name.as_str()),
        Some(other) => Some(other),
    }
}

fn probe_kind(protocol: &ProtocolConfig) -> Option<DetectorKind> {
    probe_name(protocol).and_then(lookup_detector)
}

/// Validate general settings
fn validate_general_settings(config: &DemuxConfig) -> Result<()> {
    if config.listen.is_empty() {
        return Err(ConfigError::MissingRequiredValue("listen".to_string()));
    }

    if config.buffer_size == 0 {
        return Err(ConfigError::InvalidValue(
            "buffer_size".to_string(),
            "Buffer size must be greater than 0".to_string(),
        ));
    }

    if config.timeout == 0 {
        return Err(ConfigError::InvalidValue(
            "timeout".to_string(),
            "Probe timeout must be greater than 0".to_string(),
        ));
    }

    if config.connect_timeout == 0 {
        return Err(ConfigError::InvalidValue(
            "connect_timeout".to_string(),
            "Connect timeout must be greater than 0".to_string(),
        ));
    }

    Ok(())
}

/// Validate the protocol table
fn validate_protocols(config: &DemuxConfig) -> Result<()> {
    if config.protocols.is_empty() {
        return Err(ConfigError::MissingRequiredValue("protocols".to_string()));
    }

    for (i, protocol) in config.protocols.iter().enumerate() {
        if protocol.name.is_empty() {
            return Err(ConfigError::InvalidValue(
                format!("protocols[{}].name", i),
                "Protocol name must not be empty".to_string(),
            ));
        }

        if config.protocols[..i].iter().any(|p| p.name == protocol.name) {
            return Err(ConfigError::InvalidValue(
                "protocols".to_string(),
                format!("protocol '{}' is defined more than once", protocol.name),
            ));
        }

        if protocol.host.is_none() || protocol.port.is_none() {
            return Err(ConfigError::MissingRequiredValue(format!("{}: host and port", protocol.name)));
        }

        let kind = match probe_name(protocol) {
            Some(name) => Some(
                lookup_detector(name)
                    .ok_or_else(|| ConfigError::UnknownProbe(protocol.name.clone(), name.to_string()))?,
            ),
            None => None,
        };

        let has_tls_data = !protocol.sni_hostnames.is_empty() || !protocol.alpn_protocols.is_empty();
        if has_tls_data && kind != Some(DetectorKind::Tls) {
            return Err(ConfigError::InvalidCombination(format!(
                "{}: sni_hostnames and alpn_protocols need the tls probe",
                protocol.name
            )));
        }
        if !protocol.regex_patterns.is_empty() && kind != Some(DetectorKind::Regex) {
            return Err(ConfigError::InvalidCombination(format!(
                "{}: regex_patterns need the regex probe",
                protocol.name
            )));
        }

        if kind == Some(DetectorKind::Regex) {
            if !cfg!(feature = "regex-probe") {
                return Err(ConfigError::ProbeUnavailable(REGEX_PROBE.to_string()));
            }
            if protocol.regex_patterns.is_empty() {
                return Err(ConfigError::MissingRequiredValue(format!(
                    "{}: regex_patterns",
                    protocol.name
                )));
            }
        }

        if matches!(protocol.min_length, Some(0)) {
            return Err(ConfigError::InvalidValue(
                format!("{}.min_length", protocol.name),
                "min_length must be greater than 0".to_string(),
            ));
        }
    }

    Ok(())
}
