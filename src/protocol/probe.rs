//! Probe dispatcher
//!
//! Runs the registry's detectors over a connection prefix in priority order
//! and folds their verdicts into a single decision.

use std::sync::Arc;

use log::{debug, log_enabled, Level};

use crate::common::hexdump;
use crate::config::{ConfigError, DemuxConfig};
use super::detector::{ProtocolDetector, Verdict};
use super::registry::{Protocol, ProtocolRegistry};

/// Result of one pass over the registry
#[derive(Debug, Clone)]
pub enum Outcome {
    /// The connection carries this protocol
    Decided(Arc<Protocol>),
    /// Some detector still needs more bytes and none matched
    Undecided,
}

impl Outcome {
    pub fn is_decided(&self) -> bool {
        matches!(self, Outcome::Decided(_))
    }

    /// The decided protocol, if any
    pub fn protocol(&self) -> Option<&Arc<Protocol>> {
        match self {
            Outcome::Decided(protocol) => Some(protocol),
            Outcome::Undecided => None,
        }
    }
}

/// Immutable probing context shared by every connection
///
/// Built once from configuration; cheap to share behind an `Arc`.
#[derive(Debug, Clone)]
pub struct ProbeContext {
    registry: ProtocolRegistry,
    on_timeout: String,
    verbose: u8,
}

impl ProbeContext {
    /// Create a context
    ///
    /// # Parameters
    ///
    /// * `registry` - Protocols in priority order
    /// * `on_timeout` - Name of the protocol to use when probing never completes
    /// * `verbose` - 1 traces per-probe verdicts, 2 also dumps the prefix
    pub fn new(registry: ProtocolRegistry, on_timeout: impl Into<String>, verbose: u8) -> Self {
        Self {
            registry,
            on_timeout: on_timeout.into(),
            verbose,
        }
    }

    /// Build the registry from configuration and wrap it
    pub fn from_config(config: &DemuxConfig) -> std::result::Result<Self, ConfigError> {
        let registry = ProtocolRegistry::from_config(config)?;
        Ok(Self::new(registry, config.on_timeout.clone(), config.verbose))
    }

    pub fn registry(&self) -> &ProtocolRegistry {
        &self.registry
    }

    pub fn verbose(&self) -> u8 {
        self.verbose
    }

    /// Classify a prefix
    ///
    /// The first entry whose detector matches wins. If nothing matches and no
    /// detector is waiting for more bytes, the last entry is chosen. A last
    /// entry named `anyprot` is never probed itself.
    pub fn probe_buffer(&self, data: &[u8]) -> Outcome {
        if self.verbose > 1 && log_enabled!(Level::Debug) {
            debug!("hexdump of incoming packet:\n{}", hexdump(data));
        }

        let catch_all = self.registry.catch_all();
        let last = self.registry.len() - 1;
        let mut again = 0usize;

        for (i, protocol) in self.registry.iter().enumerate() {
            if i == last && protocol.is_catch_all() {
                break;
            }

            let Some(detector) = protocol.detector() else {
                continue;
            };

            if self.verbose > 0 {
                debug!("probing for {}", protocol.name());
            }

            if let Some(min_length) = protocol.min_length() {
                if data.len() < min_length {
                    debug!(
                        "input too short for {}, {} bytes but need {}",
                        protocol.name(),
                        data.len(),
                        min_length
                    );
                    again += 1;
                    continue;
                }
            }

            let verdict = detector.detect(data);
            if self.verbose > 0 {
                debug!("probed for {}: {}", protocol.name(), verdict);
            }

            match verdict {
                Verdict::Match => return Outcome::Decided(Arc::clone(protocol)),
                Verdict::NeedMoreData => again += 1,
                Verdict::NotThisOne => {}
            }
        }

        if again > 0 {
            return Outcome::Undecided;
        }

        // Everything said no: fall back on the last protocol
        Outcome::Decided(Arc::clone(catch_all))
    }

    /// Protocol to use once probing has taken too long
    ///
    /// The entry named by `on_timeout`, or the first entry if there is none.
    pub fn timeout_protocol(&self) -> Arc<Protocol> {
        Arc::clone(self.registry.get(&self.on_timeout).unwrap_or_else(|| self.registry.first()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::detector::Detector;
    use crate::protocol::registry::CATCH_ALL;

    fn context(entries: Vec<Protocol>) -> ProbeContext {
        ProbeContext::new(ProtocolRegistry::new(entries).unwrap(), "ssh", 2)
    }

    fn decided_name(outcome: &Outcome) -> Option<&str> {
        outcome.protocol().map(|p| p.name())
    }

    #[test]
    fn test_first_match_in_order_wins() {
        // "SSH-" satisfies both detectors; configuration order decides
        let ctx = context(vec![
            Protocol::new("first", Some(Detector::Always)),
            Protocol::new("ssh", Some(Detector::Ssh)),
            Protocol::new(CATCH_ALL, Some(Detector::Always)),
        ]);
        assert_eq!(decided_name(&ctx.probe_buffer(b"SSH-2.0")), Some("first"));
    }

    #[test]
    fn test_catch_all_is_not_probed_but_chosen() {
        let ctx = context(vec![
            Protocol::new("ssh", Some(Detector::Ssh)),
            Protocol::new("tinc", Some(Detector::Tinc)),
            Protocol::new(CATCH_ALL, Some(Detector::Always)),
        ]);
        assert_eq!(decided_name(&ctx.probe_buffer(b"HELLO")), Some(CATCH_ALL));
        assert!(!ctx.probe_buffer(b"S").is_decided());
    }

    #[test]
    fn test_last_entry_is_fallback_even_if_not_anyprot() {
        let ctx = context(vec![
            Protocol::new("ssh", Some(Detector::Ssh)),
            Protocol::new("tinc", Some(Detector::Tinc)),
        ]);
        // tinc is probed normally, then used as the fallback
        assert_eq!(decided_name(&ctx.probe_buffer(b"0 node")), Some("tinc"));
        assert_eq!(decided_name(&ctx.probe_buffer(b"HELLO")), Some("tinc"));
    }

    #[test]
    fn test_entries_without_detector_are_skipped() {
        let ctx = context(vec![
            Protocol::new("parked", None),
            Protocol::new("ssh", Some(Detector::Ssh)),
            Protocol::new(CATCH_ALL, Some(Detector::Always)),
        ]);
        assert_eq!(decided_name(&ctx.probe_buffer(b"SSH-2.0")), Some("ssh"));
        assert_eq!(decided_name(&ctx.probe_buffer(b"nope")), Some(CATCH_ALL));
    }

    #[test]
    fn test_min_length_gate() {
        let ctx = context(vec![
            Protocol::new("late", Some(Detector::Always)).with_min_length(10),
            Protocol::new("ssh", Some(Detector::Ssh)),
            Protocol::new(CATCH_ALL, Some(Detector::Always)),
        ]);
        // Gate holds "late" back; ssh rejects; still undecided
        assert!(!ctx.probe_buffer(b"HELLO").is_decided());
        // ssh can match while the gate is closed
        assert_eq!(decided_name(&ctx.probe_buffer(b"SSH-2")), Some("ssh"));
        assert_eq!(decided_name(&ctx.probe_buffer(b"HELLO WORLD")), Some("late"));
    }

    #[test]
    fn test_timeout_protocol() {
        let ctx = context(vec![
            Protocol::new("http", Some(Detector::Http)),
            Protocol::new("ssh", Some(Detector::Ssh)),
            Protocol::new(CATCH_ALL, Some(Detector::Always)),
        ]);
        assert_eq!(ctx.timeout_protocol().name(), "ssh");

        let registry = ctx.registry().clone();
        let unnamed = ProbeContext::new(registry, "does-not-exist", 0);
        assert_eq!(unnamed.timeout_protocol().name(), "http");
    }
}
