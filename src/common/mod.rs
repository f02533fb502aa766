//! Common module
//!
//! This module contains shared types, errors, and utility functions used throughout the application.

pub mod error;
pub mod log;
pub mod hexdump;
pub mod net;

// Re-export commonly used types and functions
pub use error::{DemuxError, Result};
pub use self::log::{init_logger, level_for_verbosity, set_log_level};
pub use hexdump::hexdump;
pub use net::{connect_backend, resolve_backend};
