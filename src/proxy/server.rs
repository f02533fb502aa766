//! Demultiplexer server module
//!
//! Accepts connections on every configured listen address and hands each one
//! to its own task for probing and forwarding.

use log::{debug, error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinSet;

use crate::common::{DemuxError, Result};
use crate::config::DemuxConfig;
use crate::protocol::ProbeContext;
use super::handler::handle_connection;

/// Demultiplexer server
///
/// Shares one or more listening ports between every protocol of the
/// registry, routing each connection by what its client sends first.
pub struct Demux {
    listeners: Vec<TcpListener>,
    ctx: Arc<ProbeContext>,
    config: Arc<DemuxConfig>,
}

impl Demux {
    /// Build the probing context and bind every `listen` address
    ///
    /// # Errors
    ///
    /// Returns an error if the protocol table cannot be built or an address
    /// cannot be bound.
    pub async fn bind(config: DemuxConfig) -> Result<Self> {
        let ctx = ProbeContext::from_config(&config)?;

        let mut listeners = Vec::with_capacity(config.listen.len());
        for addr in &config.listen {
            let listener = TcpListener::bind(addr.as_str())
                .await
                .map_err(|e| DemuxError::Network(format!("Failed to bind {}: {}", addr, e)))?;
            listeners.push(listener);
        }

        Ok(Self::from_listeners(listeners, Arc::new(ctx), Arc::new(config)))
    }

    /// Serve on already bound listeners
    pub fn from_listeners(listeners: Vec<TcpListener>, ctx: Arc<ProbeContext>, config: Arc<DemuxConfig>) -> Self {
        Self { listeners, ctx, config }
    }

    /// Addresses actually bound (useful when binding port 0)
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners.iter().filter_map(|l| l.local_addr().ok()).collect()
    }

    /// Accept and serve connections until every listener fails
    pub async fn run(self) -> Result<()> {
        let mut accept_loops = JoinSet::new();

        for listener in self.listeners {
            let ctx = Arc::clone(&self.ctx);
            let config = Arc::clone(&self.config);
            accept_loops.spawn(accept_loop(listener, ctx, config));
        }

        while let Some(result) = accept_loops.join_next().await {
            if let Err(e) = result {
                error!("Listener task failed: {}", e);
            }
        }

        Err(DemuxError::Other("all listeners stopped".to_string()))
    }
}

async fn accept_loop(listener: TcpListener, ctx: Arc<ProbeContext>, config: Arc<DemuxConfig>) {
    let local = listener
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "?".to_string());
    info!("Listening on {}", local);

    let mut tasks = JoinSet::new();

    loop {
        // Reap finished connections and log their errors
        while let Some(result) = tasks.try_join_next() {
            match result {
                Ok(Err(e)) => debug!("Connection ended with error: {}", e),
                Err(e) => error!("Connection task panicked: {}", e),
                Ok(Ok(())) => {}
            }
        }

        match listener.accept().await {
            Ok((client_stream, client_addr)) => {
                debug!("Accepted connection from {} on {}", client_addr, local);

                let ctx = Arc::clone(&ctx);
                let config = Arc::clone(&config);
                tasks.spawn(async move {
                    handle_connection(client_stream, client_addr, ctx, config).await
                });
            }
            Err(e) => {
                error!("Error accepting connection on {}: {}", local, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProtocolConfig;

    #[tokio::test]
    async fn test_bind_ephemeral() {
        let config = DemuxConfig {
            listen: vec!["127.0.0.1:0".to_string()],
            protocols: vec![ProtocolConfig {
                name: "anyprot".to_string(),
                host: Some("127.0.0.1".to_string()),
                port: Some(9),
                ..ProtocolConfig::default()
            }],
            ..DemuxConfig::default()
        };

        let demux = Demux::bind(config).await.unwrap();
        let addrs = demux.local_addrs();
        assert_eq!(addrs.len(), 1);
        assert_ne!(addrs[0].port(), 0);
    }

    #[tokio::test]
    async fn test_bind_bad_listen_address() {
        let config = DemuxConfig {
            listen: vec!["not-an-address".to_string()],
            protocols: vec![ProtocolConfig {
                name: "anyprot".to_string(),
                host: Some("127.0.0.1".to_string()),
                port: Some(9),
                ..ProtocolConfig::default()
            }],
            ..DemuxConfig::default()
        };
        assert!(matches!(Demux::bind(config).await, Err(DemuxError::Network(_))));
    }

    #[tokio::test]
    async fn test_bind_rejects_bad_protocol_table() {
        let config = DemuxConfig {
            listen: vec!["127.0.0.1:0".to_string()],
            protocols: vec![],
            ..DemuxConfig::default()
        };
        assert!(matches!(Demux::bind(config).await, Err(DemuxError::Config(_))));
    }
}
