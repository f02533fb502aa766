//! Data forwarding module
//!
//! This module handles data forwarding between the client and the chosen backend.

use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::common::Result;

/// Replay the probed prefix to the backend, then forward both directions
///
/// # Parameters
///
/// * `client_stream` - Client stream, positioned just after `prefix`
/// * `target_stream` - Backend stream
/// * `prefix` - Bytes consumed from the client while probing
/// * `buffer_size` - Size of each direction's copy buffer
///
/// # Returns
///
/// Returns `Ok(())` once either side has closed, or an error if the prefix
/// could not be delivered.
pub async fn proxy_data<C, T>(
    client_stream: C,
    mut target_stream: T,
    prefix: &[u8],
    buffer_size: usize,
) -> Result<()>
where
    C: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    // The backend must see the stream exactly as the client sent it
    if !prefix.is_empty() {
        target_stream.write_all(prefix).await?;
        debug!("Replayed {} probed bytes to backend", prefix.len());
    }

    let (mut client_reader, mut client_writer) = tokio::io::split(client_stream);
    let (mut target_reader, mut target_writer) = tokio::io::split(target_stream);

    // Data flow from client to target
    let client_to_target = tokio::spawn(async move {
        let mut buffer = vec![0u8; buffer_size];
        let mut total_bytes = 0;

        loop {
            match client_reader.read(&mut buffer).await {
                Ok(0) => break, // Connection closed
                Ok(n) => {
                    total_bytes += n;
                    if target_writer.write_all(&buffer[..n]).await.is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
        let _ = target_writer.shutdown().await;

        debug!("Client to target transferred {} bytes total", total_bytes);
    });

    // Data flow from target to client
    let target_to_client = tokio::spawn(async move {
        let mut buffer = vec![0u8; buffer_size];
        let mut total_bytes = 0;

        loop {
            match target_reader.read(&mut buffer).await {
                Ok(0) => break, // Connection closed
                Ok(n) => {
                    total_bytes += n;
                    if client_writer.write_all(&buffer[..n]).await.is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
        let _ = client_writer.shutdown().await;

        debug!("Target to client transferred {} bytes total", total_bytes);
    });

    // Wait for either task to complete
    tokio::select! {
        _ = client_to_target => debug!("Client to target connection closed"),
        _ = target_to_client => debug!("Target to client connection closed"),
    }

    Ok(())
}
