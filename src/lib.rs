//! portmux: share one TCP port between many protocols
//!
//! A connection demultiplexer in the spirit of sslh. The first bytes a client
//! sends are inspected by a prioritised list of protocol probes (SSH, TLS
//! with SNI/ALPN matching, HTTP, OpenVPN, tinc, XMPP, ADB, SOCKS5, and
//! user-supplied regular expressions), and the connection is forwarded,
//! bytes untouched, to the backend of the protocol that matched.
//!
//! # Main Features
//!
//! - Non-destructive probing: every byte read while probing is replayed
//! - Deterministic priority: the first matching protocol in configuration order wins
//! - Incremental decisions: probes ask for more data instead of guessing
//! - Timeout and read-error fallbacks so every connection ends up routed
//!
//! # Example
//!
//! ```
//! use portmux::protocol::{Detector, Outcome, ProbeContext, Protocol, ProtocolRegistry, CATCH_ALL};
//!
//! let registry = ProtocolRegistry::new(vec![
//!     Protocol::new("ssh", Some(Detector::Ssh)),
//!     Protocol::new("http", Some(Detector::Http)),
//!     Protocol::new(CATCH_ALL, Some(Detector::Always)),
//! ]).unwrap();
//! let ctx = ProbeContext::new(registry, "ssh", 0);
//!
//! match ctx.probe_buffer(b"SSH-2.0-OpenSSH_8.4") {
//!     Outcome::Decided(protocol) => assert_eq!(protocol.name(), "ssh"),
//!     Outcome::Undecided => unreachable!(),
//! }
//! assert!(!ctx.probe_buffer(b"GE").is_decided());
//! ```

// Public modules
pub mod common;
pub mod config;
pub mod protocol;
pub mod proxy;

// Re-export commonly used structures and functions for convenience
pub use common::{DemuxError, Result};
pub use config::DemuxConfig;
pub use protocol::{lookup_detector, Outcome, ProbeContext, Verdict};
pub use proxy::{Connection, Demux};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
