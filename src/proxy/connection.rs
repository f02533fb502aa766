//! Connection-level probing driver
//!
//! Owns one client stream while its protocol is unknown. Every byte read is
//! kept in the deferred buffer so it can be replayed to the backend once a
//! protocol has been chosen.

use std::sync::Arc;

use bytes::BytesMut;
use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::protocol::{Outcome, ProbeContext, Protocol};

/// A client connection being classified
#[derive(Debug)]
pub struct Connection<S> {
    stream: S,
    deferred: BytesMut,
    protocol: Option<Arc<Protocol>>,
    chunk_size: usize,
}

impl<S> Connection<S>
where
    S: AsyncRead + Unpin,
{
    /// Wrap a freshly accepted stream
    ///
    /// # Parameters
    ///
    /// * `stream` - Client stream
    /// * `chunk_size` - Upper bound on bytes read per `classify` call
    pub fn new(stream: S, chunk_size: usize) -> Self {
        Self {
            stream,
            deferred: BytesMut::with_capacity(chunk_size),
            protocol: None,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Read what the client has sent and try to classify the connection
    ///
    /// Safe to call repeatedly; each call performs at most one bounded read.
    /// A read error, or the client closing before any probe could decide,
    /// binds the connection to the registry's last protocol, so a caller
    /// only ever sees `Decided` or `Undecided`. Once decided, further calls
    /// return the same decision without reading.
    pub async fn classify(&mut self, ctx: &ProbeContext) -> Outcome {
        if let Some(protocol) = &self.protocol {
            return Outcome::Decided(Arc::clone(protocol));
        }

        let mut buffer = vec![0u8; self.chunk_size];
        match self.stream.read(&mut buffer).await {
            Ok(n) => {
                self.deferred.extend_from_slice(&buffer[..n]);

                match ctx.probe_buffer(&self.deferred) {
                    Outcome::Decided(protocol) => Outcome::Decided(self.bind(protocol)),
                    Outcome::Undecided if n == 0 => {
                        debug!(
                            "Client closed after {} bytes without a decision, using {}",
                            self.deferred.len(),
                            ctx.registry().catch_all().name()
                        );
                        Outcome::Decided(self.bind(Arc::clone(ctx.registry().catch_all())))
                    }
                    Outcome::Undecided => Outcome::Undecided,
                }
            }
            Err(e) => {
                // Typically the client went away between accept and probe;
                // the backend connection will fail later on its own
                debug!("Error reading from client while probing: {}", e);
                Outcome::Decided(self.bind(Arc::clone(ctx.registry().catch_all())))
            }
        }
    }

    /// Bind the on-timeout protocol unless a protocol is already bound
    pub fn resolve_timeout(&mut self, ctx: &ProbeContext) -> Arc<Protocol> {
        match &self.protocol {
            Some(protocol) => Arc::clone(protocol),
            None => self.bind(ctx.timeout_protocol()),
        }
    }

    fn bind(&mut self, protocol: Arc<Protocol>) -> Arc<Protocol> {
        debug_assert!(self.protocol.is_none(), "protocol is bound once");
        self.protocol = Some(Arc::clone(&protocol));
        protocol
    }
}

impl<S> Connection<S> {
    /// The bound protocol, once decided
    pub fn protocol(&self) -> Option<&Arc<Protocol>> {
        self.protocol.as_ref()
    }

    /// Bytes read so far, to be replayed to the backend
    pub fn deferred(&self) -> &[u8] {
        &self.deferred
    }

    /// Give back the stream and the bytes consumed while probing
    pub fn into_parts(self) -> (S, BytesMut) {
        (self.stream, self.deferred)
    }
}
