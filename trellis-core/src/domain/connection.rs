//! Client connections
//!
//! The view of a live connection handed to connection-level hooks.
//! Runtimes provide the implementation.

use std::net::SocketAddr;

/// A client connection accepted by a worker
pub trait Connection: Send + Sync {
    /// Identifier unique within the runtime
    fn id(&self) -> u64;

    /// Name of the worker that accepted the connection
    fn worker(&self) -> &str;

    /// Remote address, if known
    fn peer_addr(&self) -> Option<SocketAddr>;

    /// Queues `data` for sending
    ///
    /// # Returns
    /// `false` if the connection is already closed
    fn send(&self, data: &[u8]) -> bool;

    /// Closes the connection after queued data is flushed
    fn close(&self);

    /// Bytes queued but not yet written to the socket
    fn pending_bytes(&self) -> usize;
}
