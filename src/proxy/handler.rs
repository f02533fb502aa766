//! Connection handler module
//!
//! This module handles individual client connections: probe, pick a backend,
//! replay the probed bytes, then forward.

use log::{debug, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::common::{connect_backend, DemuxError, Result};
use crate::config::DemuxConfig;
use crate::protocol::{Outcome, ProbeContext, Protocol};
use super::connection::Connection;
use super::forwarder::proxy_data;

/// Drive `classify` until it decides
async fn probe_until_decided<S>(conn: &mut Connection<S>, ctx: &ProbeContext) -> Arc<Protocol>
where
    S: tokio::io::AsyncRead + Unpin,
{
    loop {
        if let Outcome::Decided(protocol) = conn.classify(ctx).await {
            return protocol;
        }
    }
}

/// Handle a single client connection
///
/// # Parameters
///
/// * `client_stream` - Client TCP stream
/// * `client_addr` - Client address, for logging
/// * `ctx` - Shared probing context
/// * `config` - Demultiplexer configuration
///
/// # Returns
///
/// Returns `Ok(())` if handling is successful, otherwise returns an error.
pub async fn handle_connection(
    client_stream: TcpStream,
    client_addr: SocketAddr,
    ctx: Arc<ProbeContext>,
    config: Arc<DemuxConfig>,
) -> Result<()> {
    let mut conn = Connection::new(client_stream, config.buffer_size);

    let protocol = match timeout(config.probe_timeout(), probe_until_decided(&mut conn, &ctx)).await {
        Ok(protocol) => protocol,
        Err(_) => {
            let protocol = conn.resolve_timeout(&ctx);
            debug!(
                "Probe timeout for {} after {} bytes, using {}",
                client_addr,
                conn.deferred().len(),
                protocol.name()
            );
            protocol
        }
    };

    metrics::counter!("portmux_connections_total", "protocol" => protocol.name().to_string()).increment(1);

    let backend = protocol.backend().ok_or_else(|| {
        warn!("Protocol {} has no backend, closing connection from {}", protocol.name(), client_addr);
        DemuxError::Config(format!("protocol {} has no backend", protocol.name()))
    })?;

    if protocol.log_level() > 0 {
        info!("{}: connection from {} to {}", protocol.name(), client_addr, backend);
    }

    let target_stream = connect_backend(&backend.host, backend.port, config.backend_connect_timeout()).await?;

    let (client_stream, prefix) = conn.into_parts();
    proxy_data(client_stream, target_stream, &prefix, config.buffer_size).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use crate::protocol::{Backend, Detector, ProtocolRegistry, CATCH_ALL};

    async fn tcp_pair() -> (TcpStream, TcpStream, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });
        let (server, peer) = listener.accept().await.unwrap();
        (client.await.unwrap(), server, peer)
    }

    #[tokio::test]
    async fn test_timeout_routes_to_on_timeout_protocol() {
        let backend = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let backend_addr = backend.local_addr().unwrap();

        let registry = ProtocolRegistry::new(vec![
            Protocol::new("ssh", Some(Detector::Ssh)).with_backend(Backend {
                host: "127.0.0.1".to_string(),
                port: backend_addr.port(),
            }),
            Protocol::new(CATCH_ALL, Some(Detector::Always)),
        ])
        .unwrap();
        let ctx = Arc::new(ProbeContext::new(registry, "ssh", 0));
        let config = Arc::new(DemuxConfig { timeout: 1, ..DemuxConfig::default() });

        let (mut client, server, peer) = tcp_pair().await;
        // Too short for the ssh probe to decide; the timeout must kick in
        client.write_all(b"SS").await.unwrap();

        let handler = tokio::spawn(handle_connection(server, peer, ctx, config));

        let (mut upstream, _) = backend.accept().await.unwrap();
        let mut replayed = [0u8; 2];
        upstream.read_exact(&mut replayed).await.unwrap();
        assert_eq!(&replayed, b"SS");

        drop(upstream);
        drop(client);
        handler.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_a_network_error() {
        let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = closed.local_addr().unwrap().port();
        drop(closed);

        let registry = ProtocolRegistry::new(vec![Protocol::new(CATCH_ALL, Some(Detector::Always))
            .with_backend(Backend { host: "localhost".to_string(), port })])
        .unwrap();
        let ctx = Arc::new(ProbeContext::new(registry, "ssh", 0));
        let config = Arc::new(DemuxConfig::default());

        let (mut client, server, peer) = tcp_pair().await;
        client.write_all(b"hello").await.unwrap();

        let result = handle_connection(server, peer, ctx, config).await;
        assert!(matches!(result, Err(DemuxError::Network(_))));
    }

    #[tokio::test]
    async fn test_missing_backend_is_an_error() {
        let registry = ProtocolRegistry::new(vec![Protocol::new(CATCH_ALL, Some(Detector::Always))]).unwrap();
        let ctx = Arc::new(ProbeContext::new(registry, "ssh", 0));
        let config = Arc::new(DemuxConfig::default());

        let (mut client, server, peer) = tcp_pair().await;
        client.write_all(b"hello").await.unwrap();

        let result = handle_connection(server, peer, ctx, config).await;
        assert!(matches!(result, Err(DemuxError::Config(_))));
    }
}
