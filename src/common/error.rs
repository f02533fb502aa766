//! Error handling module
//!
//! This module defines the error types and result type aliases used in the application.

use thiserror::Error;
use std::io;

/// Port multiplexer error type
#[derive(Error, Debug)]
pub enum DemuxError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network error (address resolution, backend connection)
    #[error("Network error: {0}")]
    Network(String),

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type alias
///
/// This is a `Result` type alias that uses our custom `DemuxError`.
pub type Result<T> = std::result::Result<T, DemuxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionReset, "peer went away");
        let err: DemuxError = io_err.into();

        match err {
            DemuxError::Io(_) => {}
            _ => panic!("Should convert to IO error"),
        }
    }

    #[test]
    fn test_error_display() {
        let err = DemuxError::Config("protocol list is empty".to_string());
        let err_str = format!("{}", err);
        assert!(err_str.contains("protocol list is empty"));
        assert!(err_str.starts_with("Configuration error"));
    }
}
