//! Protocol registry
//!
//! The ordered table of protocols a listener can route to. Order is priority:
//! the dispatcher probes entries front to back and the last entry doubles as
//! the catch-all.

use std::fmt;
use std::sync::Arc;

use log::debug;

use crate::config::{ConfigError, DemuxConfig, ProtocolConfig};
use super::detector::{lookup_detector, Detector, DetectorData, ProtocolDetector, Verdict};

/// Name of the catch-all protocol; never probed when it sits last
pub const CATCH_ALL: &str = "anyprot";

/// `probe` value meaning "the detector named like the protocol"
pub const BUILTIN_PROBE: &str = "builtin";

/// `probe` value for entries that exist only to carry configuration
pub const NO_PROBE: &str = "none";

/// Where decided connections are sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One routable protocol
#[derive(Debug)]
pub struct Protocol {
    name: String,
    detector: Option<Detector>,
    min_length: Option<usize>,
    backend: Option<Backend>,
    log_level: u8,
}

impl Protocol {
    /// Create a protocol entry
    ///
    /// # Parameters
    ///
    /// * `name` - Unique protocol name
    /// * `detector` - Detector to probe with, `None` to never probe this entry
    pub fn new(name: impl Into<String>, detector: Option<Detector>) -> Self {
        Self {
            name: name.into(),
            detector,
            min_length: None,
            backend: None,
            log_level: 1,
        }
    }

    /// Require at least `min_length` bytes before the detector runs
    pub fn with_min_length(mut self, min_length: usize) -> Self {
        self.min_length = Some(min_length);
        self
    }

    /// Route decided connections to `backend`
    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = Some(backend);
        self
    }

    /// 0 silences the per-connection routing log line
    pub fn with_log_level(mut self, log_level: u8) -> Self {
        self.log_level = log_level;
        self
    }

    /// Build an entry from its configuration, binding and compiling its detector
    pub fn from_config(config: &ProtocolConfig) -> std::result::Result<Self, ConfigError> {
        let detector = match config.probe.as_deref() {
            Some(NO_PROBE) => None,
            probe => {
                let probe_name = match probe {
                    None | Some(BUILTIN_PROBE) => config.name.as_str(),
                    Some(other) => other,
                };
                let kind = lookup_detector(probe_name)
                    .ok_or_else(|| ConfigError::UnknownProbe(config.name.clone(), probe_name.to_string()))?;
                let data = DetectorData {
                    sni_hostnames: config.sni_hostnames.clone(),
                    alpn_protocols: config.alpn_protocols.clone(),
                    regex_patterns: config.regex_patterns.clone(),
                };
                Some(Detector::bind(kind, &data)?)
            }
        };

        let backend = match (&config.host, config.port) {
            (Some(host), Some(port)) => Some(Backend { host: host.clone(), port }),
            _ => None,
        };

        Ok(Self {
            name: config.name.clone(),
            detector,
            min_length: config.min_length,
            backend,
            log_level: config.log_level,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn detector(&self) -> Option<&Detector> {
        self.detector.as_ref()
    }

    pub fn min_length(&self) -> Option<usize> {
        self.min_length
    }

    pub fn backend(&self) -> Option<&Backend> {
        self.backend.as_ref()
    }

    pub fn log_level(&self) -> u8 {
        self.log_level
    }

    /// True when this is the reserved catch-all entry
    pub fn is_catch_all(&self) -> bool {
        self.name == CATCH_ALL
    }

    /// Run this entry's detector, `None` when it has no detector
    pub fn probe(&self, data: &[u8]) -> Option<Verdict> {
        self.detector.as_ref().map(|detector| detector.detect(data))
    }
}

/// Ordered, non-empty list of protocols
#[derive(Debug, Clone)]
pub struct ProtocolRegistry {
    protocols: Vec<Arc<Protocol>>,
}

impl ProtocolRegistry {
    /// Create a registry, preserving the given order
    ///
    /// # Errors
    ///
    /// Fails if `protocols` is empty or two entries share a name.
    pub fn new(protocols: Vec<Protocol>) -> std::result::Result<Self, ConfigError> {
        if protocols.is_empty() {
            return Err(ConfigError::MissingRequiredValue("protocols".to_string()));
        }

        for (i, protocol) in protocols.iter().enumerate() {
            if protocols[..i].iter().any(|p| p.name == protocol.name) {
                return Err(ConfigError::InvalidValue(
                    "protocols".to_string(),
                    format!("protocol '{}' is defined more than once", protocol.name),
                ));
            }
        }

        Ok(Self {
            protocols: protocols.into_iter().map(Arc::new).collect(),
        })
    }

    /// Build every protocol entry of a configuration
    pub fn from_config(config: &DemuxConfig) -> std::result::Result<Self, ConfigError> {
        let protocols = config
            .protocols
            .iter()
            .map(Protocol::from_config)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for protocol in &protocols {
            debug!(
                "Registered protocol {} (probe: {:?}, min_length: {:?})",
                protocol.name,
                protocol.detector.as_ref().map(|d| d.kind()),
                protocol.min_length
            );
        }

        Self::new(protocols)
    }

    /// The last entry: default verdict and read-error fallback
    pub fn catch_all(&self) -> &Arc<Protocol> {
        // new() rejects empty registries
        &self.protocols[self.protocols.len() - 1]
    }

    pub fn first(&self) -> &Arc<Protocol> {
        &self.protocols[0]
    }

    /// Find a protocol by name
    pub fn get(&self, name: &str) -> Option<&Arc<Protocol>> {
        self.protocols.iter().find(|p| p.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Protocol>> {
        self.protocols.iter()
    }

    pub fn len(&self) -> usize {
        self.protocols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.protocols.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proto(name: &str) -> ProtocolConfig {
        ProtocolConfig {
            name: name.to_string(),
            host: Some("127.0.0.1".to_string()),
            port: Some(2222),
            ..ProtocolConfig::default()
        }
    }

    #[test]
    fn test_builtin_probe_by_name() {
        let protocol = Protocol::from_config(&proto("ssh")).unwrap();
        assert_eq!(protocol.name(), "ssh");
        assert_eq!(protocol.probe(b"SSH-2.0"), Some(Verdict::Match));
        assert_eq!(protocol.backend().map(|b| b.to_string()).as_deref(), Some("127.0.0.1:2222"));
    }

    #[test]
    fn test_unknown_probe_is_config_error() {
        let err = Protocol::from_config(&proto("gopher")).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownProbe(ref name, _) if name == "gopher"));
    }

    #[test]
    fn test_explicit_probe_names() {
        let mut config = proto("ssh-alt");
        config.probe = Some("ssh".to_string());
        assert!(Protocol::from_config(&config).unwrap().detector().is_some());

        let mut config = proto("fallback");
        config.probe = Some("timeout".to_string());
        assert_eq!(Protocol::from_config(&config).unwrap().probe(b""), Some(Verdict::Match));

        let mut config = proto("parked");
        config.probe = Some("none".to_string());
        assert!(Protocol::from_config(&config).unwrap().detector().is_none());
    }

    #[test]
    fn test_registry_invariants() {
        assert!(ProtocolRegistry::new(vec![]).is_err());

        let dup = ProtocolRegistry::new(vec![
            Protocol::new("ssh", Some(Detector::Ssh)),
            Protocol::new("ssh", Some(Detector::Ssh)),
        ]);
        assert!(dup.is_err());

        let registry = ProtocolRegistry::new(vec![
            Protocol::new("ssh", Some(Detector::Ssh)),
            Protocol::new("http", Some(Detector::Http)),
            Protocol::new(CATCH_ALL, Some(Detector::Always)),
        ])
        .unwrap();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.first().name(), "ssh");
        assert_eq!(registry.catch_all().name(), CATCH_ALL);
        assert!(registry.catch_all().is_catch_all());
        assert!(registry.get("http").is_some());
        assert!(registry.get("tls").is_none());
    }
}
