//! Backend resolution and connection
//!
//! Backends are configured as `host:port` pairs where `host` may be a name.
//! Resolution goes through tokio's resolver so it never blocks a worker.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use log::debug;
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;

use super::error::{DemuxError, Result};

/// Resolve a backend to every address it maps to, in resolver order
///
/// IP literals (with or without IPv6 brackets) are returned as is.
pub async fn resolve_backend(host: &str, port: u16) -> Result<Vec<SocketAddr>> {
    let host = host.trim_matches(|c| c == '[' || c == ']');

    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(vec![SocketAddr::new(ip, port)]);
    }

    let addrs: Vec<SocketAddr> = lookup_host((host, port))
        .await
        .map_err(|e| DemuxError::Network(format!("Failed to resolve {}:{}: {}", host, port, e)))?
        .collect();

    if addrs.is_empty() {
        return Err(DemuxError::Network(format!("{}:{} resolved to no address", host, port)));
    }
    Ok(addrs)
}

/// Connect to the first reachable address of a backend
///
/// Each address gets its own `connect_timeout`; the last failure is reported
/// if none of them accepts.
pub async fn connect_backend(host: &str, port: u16, connect_timeout: Duration) -> Result<TcpStream> {
    let mut last_error = None;

    for addr in resolve_backend(host, port).await? {
        match timeout(connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => return Ok(stream),
            Ok(Err(e)) => {
                debug!("Connection to {} failed: {}", addr, e);
                last_error = Some(e);
            }
            Err(_) => {
                debug!("Connection to {} timed out", addr);
                last_error = Some(io::Error::new(io::ErrorKind::TimedOut, "connect timed out"));
            }
        }
    }

    let reason = last_error.map_or_else(|| "no address".to_string(), |e| e.to_string());
    Err(DemuxError::Network(format!("Connection to {}:{} failed: {}", host, port, reason)))
}
