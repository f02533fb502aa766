//! Protocol detector implementation
//!
//! A detector looks at the bytes a client has sent so far and answers one of
//! three things: this is my protocol, this is definitely not my protocol, or
//! ask me again once more bytes have arrived. Detectors are pure functions of
//! the prefix, so the same detector can be called again with a longer prefix
//! and from any number of connections at once.

use log::trace;

use crate::config::ConfigError;
use super::builtins;
use super::pattern::PatternSet;
use super::tls::{TlsCriteria, TlsParse};

/// Outcome of running one detector over a byte prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The prefix belongs to this protocol
    Match,
    /// The prefix cannot belong to this protocol
    NotThisOne,
    /// Undecidable with the bytes seen so far
    NeedMoreData,
}

impl Verdict {
    /// Name used in probe traces
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Match => "PROBE_MATCH",
            Verdict::NotThisOne => "PROBE_NEXT",
            Verdict::NeedMoreData => "PROBE_AGAIN",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<bool> for Verdict {
    #[inline]
    fn from(matched: bool) -> Self {
        if matched { Verdict::Match } else { Verdict::NotThisOne }
    }
}

/// Protocol detector trait
///
/// Implementors must never look past the end of `data` and must answer
/// `NeedMoreData` instead of guessing when `data` is too short.
pub trait ProtocolDetector: Send + Sync {
    /// Examine the prefix received so far
    fn detect(&self, data: &[u8]) -> Verdict;
}

/// Names of the built-in detectors, in the order they are usually configured
pub const BUILTIN_NAMES: &[&str] = &[
    "ssh", "openvpn", "tinc", "xmpp", "http", "tls", "adb", "socks5", "anyprot",
];

/// Detector name reserved for the pattern probe
pub const REGEX_PROBE: &str = "regex";

/// Detector name accepted as an always-match placeholder for on-timeout entries
pub const TIMEOUT_PROBE: &str = "timeout";

/// Which detector a configured name refers to, before its data is attached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorKind {
    Ssh,
    OpenVpn,
    Tinc,
    Xmpp,
    Http,
    Tls,
    Adb,
    Socks5,
    /// User supplied patterns
    Regex,
    /// Matches anything (`anyprot` and the `timeout` placeholder)
    Always,
}

/// Resolve a detector name from configuration
///
/// Accepts every name in [`BUILTIN_NAMES`], plus `"regex"` for the pattern
/// probe and `"timeout"` for the always-match placeholder.
pub fn lookup_detector(name: &str) -> Option<DetectorKind> {
    let kind = match name {
        "ssh" => DetectorKind::Ssh,
        "openvpn" => DetectorKind::OpenVpn,
        "tinc" => DetectorKind::Tinc,
        "xmpp" => DetectorKind::Xmpp,
        "http" => DetectorKind::Http,
        "tls" => DetectorKind::Tls,
        "adb" => DetectorKind::Adb,
        "socks5" => DetectorKind::Socks5,
        "anyprot" => DetectorKind::Always,
        REGEX_PROBE => DetectorKind::Regex,
        TIMEOUT_PROBE => DetectorKind::Always,
        _ => return None,
    };
    Some(kind)
}

/// Names accepted by [`lookup_detector`]
pub fn builtin_names() -> impl Iterator<Item = &'static str> {
    BUILTIN_NAMES.iter().copied()
}

/// Detector-specific data carried by a protocol entry
#[derive(Debug, Clone, Default)]
pub struct DetectorData {
    /// SNI hostnames the TLS detector should accept
    pub sni_hostnames: Vec<String>,
    /// ALPN protocols the TLS detector should accept
    pub alpn_protocols: Vec<String>,
    /// Patterns for the regex detector
    pub regex_patterns: Vec<String>,
}

/// A detector bound to its data, ready to probe
#[derive(Debug, Clone)]
pub enum Detector {
    Ssh,
    OpenVpn,
    Tinc,
    Xmpp,
    Http,
    Tls(TlsCriteria),
    Adb,
    Socks5,
    Pattern(PatternSet),
    Always,
}

impl Detector {
    /// Attach configuration data to a detector kind
    ///
    /// Pattern compilation happens here, once, at startup. A regex detector
    /// requested from a build without pattern support is an error.
    pub fn bind(kind: DetectorKind, data: &DetectorData) -> std::result::Result<Self, ConfigError> {
        let detector = match kind {
            DetectorKind::Ssh => Detector::Ssh,
            DetectorKind::OpenVpn => Detector::OpenVpn,
            DetectorKind::Tinc => Detector::Tinc,
            DetectorKind::Xmpp => Detector::Xmpp,
            DetectorKind::Http => Detector::Http,
            DetectorKind::Tls => Detector::Tls(TlsCriteria::new(
                data.sni_hostnames.clone(),
                data.alpn_protocols.clone(),
            )),
            DetectorKind::Adb => Detector::Adb,
            DetectorKind::Socks5 => Detector::Socks5,
            DetectorKind::Regex => Detector::Pattern(PatternSet::compile(&data.regex_patterns)?),
            DetectorKind::Always => Detector::Always,
        };
        Ok(detector)
    }
}

impl ProtocolDetector for Detector {
    fn detect(&self, data: &[u8]) -> Verdict {
        let verdict = match self {
            Detector::Ssh => builtins::is_ssh(data),
            Detector::OpenVpn => builtins::is_openvpn(data),
            Detector::Tinc => builtins::is_tinc(data),
            Detector::Xmpp => builtins::is_xmpp(data),
            Detector::Http => builtins::is_http(data),
            Detector::Tls(criteria) => match criteria.parse(data) {
                TlsParse::Match => Verdict::Match,
                TlsParse::NoMatch => Verdict::NotThisOne,
                TlsParse::NeedMoreData => Verdict::NeedMoreData,
            },
            Detector::Adb => builtins::is_adb(data),
            Detector::Socks5 => builtins::is_socks5(data),
            Detector::Pattern(patterns) => patterns.detect(data),
            Detector::Always => Verdict::Match,
        };
        trace!("{:?} over {} bytes: {}", self.kind(), data.len(), verdict);
        verdict
    }
}

impl Detector {
    /// The kind this detector was bound from
    pub fn kind(&self) -> DetectorKind {
        match self {
            Detector::Ssh => DetectorKind::Ssh,
            Detector::OpenVpn => DetectorKind::OpenVpn,
            Detector::Tinc => DetectorKind::Tinc,
            Detector::Xmpp => DetectorKind::Xmpp,
            Detector::Http => DetectorKind::Http,
            Detector::Tls(_) => DetectorKind::Tls,
            Detector::Adb => DetectorKind::Adb,
            Detector::Socks5 => DetectorKind::Socks5,
            Detector::Pattern(_) => DetectorKind::Regex,
            Detector::Always => DetectorKind::Always,
        }
    }
}
