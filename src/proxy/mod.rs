//! Demultiplexing proxy module
//!
//! Everything around the prober: the per-connection driver that feeds it
//! bytes, the handler that routes a decided connection to its backend, and
//! the server that accepts connections.

pub mod connection;
pub mod server;
mod handler;
mod forwarder;

pub use connection::Connection;
pub use server::Demux;
pub use handler::handle_connection;
pub use forwarder::proxy_data;
