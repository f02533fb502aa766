//! Protocol detection module
//!
//! Identifies the application protocol of a freshly accepted connection from
//! the first bytes the client sends, without consuming them. Detectors are
//! pure functions over the prefix; the dispatcher walks the configured
//! registry in order and either decides or asks for more bytes.

mod builtins;
mod detector;
mod pattern;
mod probe;
mod registry;
pub mod tls;

pub use detector::{
    builtin_names, lookup_detector, Detector, DetectorData, DetectorKind, ProtocolDetector, Verdict,
    BUILTIN_NAMES, REGEX_PROBE, TIMEOUT_PROBE,
};
pub use pattern::PatternSet;
pub use probe::{Outcome, ProbeContext};
pub use registry::{Backend, Protocol, ProtocolRegistry, BUILTIN_PROBE, CATCH_ALL, NO_PROBE};
pub use tls::{ClientHelloInfo, TlsCriteria, TlsParse};
