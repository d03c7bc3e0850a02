//! TCP connections
//!
//! Outbound data goes through an unbounded queue drained by a writer task, so
//! `send` never blocks a callback. The queue size is tracked to fire the
//! buffer-full and buffer-drain hooks.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{Notify, mpsc};
use tracing::debug;
use trellis_core::{Callbacks, Connection};

use crate::listen::Transport;

/// Error code passed to `on_error` when writing to the socket fails
pub const ERROR_SEND_FAIL: i32 = 2;

/// Error code passed to `on_error` when reading from the socket fails
pub const ERROR_READ_FAIL: i32 = 3;

/// Error code passed to `on_error` when a text frame exceeds `max_package_size`
pub const ERROR_PACKAGE_TOO_LARGE: i32 = 4;

pub(crate) enum Outbound {
    Data(Vec<u8>),
    Close,
}

/// A client connection accepted by a worker
pub struct TcpConnection {
    id: u64,
    worker: String,
    peer: SocketAddr,
    transport: Transport,
    callbacks: Callbacks,
    outbound: mpsc::UnboundedSender<Outbound>,
    pending: AtomicUsize,
    max_send_buffer_size: usize,
    buffer_full: AtomicBool,
    closed: AtomicBool,
    closing: Notify,
}

impl TcpConnection {
    pub(crate) fn new(
        id: u64,
        worker: String,
        peer: SocketAddr,
        transport: Transport,
        callbacks: Callbacks,
        outbound: mpsc::UnboundedSender<Outbound>,
        max_send_buffer_size: usize,
    ) -> Self {
        Self {
            id,
            worker,
            peer,
            transport,
            callbacks,
            outbound,
            pending: AtomicUsize::new(0),
            max_send_buffer_size,
            buffer_full: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            closing: Notify::new(),
        }
    }

    pub(crate) fn callbacks(&self) -> &Callbacks {
        &self.callbacks
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Resolves once `close` has been called
    pub(crate) async fn closed(&self) {
        if self.is_closed() {
            return;
        }
        self.closing.notified().await;
    }

    /// Marks `n` queued bytes as written
    ///
    /// # Returns
    /// `true` if the queue just emptied after having been full
    fn release(&self, n: usize) -> bool {
        let remaining = self.pending.fetch_sub(n, Ordering::SeqCst) - n;
        remaining == 0 && self.buffer_full.swap(false, Ordering::SeqCst)
    }
}

impl Connection for TcpConnection {
    fn id(&self) -> u64 {
        self.id
    }

    fn worker(&self) -> &str {
        &self.worker
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        Some(self.peer)
    }

    fn send(&self, data: &[u8]) -> bool {
        if self.is_closed() {
            return false;
        }

        let mut payload = data.to_vec();
        if self.transport == Transport::Text {
            payload.push(b'\n');
        }

        // The full flag must be set before the writer can see the data,
        // otherwise it may drain the queue without firing the drain hook.
        let len = payload.len();
        let pending = self.pending.fetch_add(len, Ordering::SeqCst) + len;
        if pending >= self.max_send_buffer_size && !self.buffer_full.swap(true, Ordering::SeqCst) {
            debug!("Connection {} send buffer full ({} bytes)", self.id, pending);
            if let Some(on_buffer_full) = &self.callbacks.on_buffer_full {
                on_buffer_full(self);
            }
        }

        if self.outbound.send(Outbound::Data(payload)).is_err() {
            self.pending.fetch_sub(len, Ordering::SeqCst);
            return false;
        }

        true
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.outbound.send(Outbound::Close);
        self.closing.notify_one();
    }

    fn pending_bytes(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

/// Drains the outbound queue into the socket until closed
pub(crate) async fn write_loop(
    connection: Arc<TcpConnection>,
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    while let Some(message) = outbound.recv().await {
        let data = match message {
            Outbound::Data(data) => data,
            Outbound::Close => break,
        };

        if let Err(e) = writer.write_all(&data).await {
            debug!("Connection {} write failed: {}", connection.id, e);
            if let Some(on_error) = &connection.callbacks.on_error {
                on_error(&*connection, ERROR_SEND_FAIL, &e.to_string());
            }
            connection.close();
            break;
        }

        if connection.release(data.len()) {
            if let Some(on_buffer_drain) = &connection.callbacks.on_buffer_drain {
                on_buffer_drain(&*connection);
            }
        }
    }

    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::ConnectionHook;

    fn connection(
        transport: Transport,
        callbacks: Callbacks,
        max_send_buffer_size: usize,
    ) -> (TcpConnection, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let peer: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let connection = TcpConnection::new(
            7,
            "gate".to_string(),
            peer,
            transport,
            callbacks,
            tx,
            max_send_buffer_size,
        );
        (connection, rx)
    }

    #[test]
    fn test_text_send_appends_newline() {
        let (connection, mut rx) = connection(Transport::Text, Callbacks::default(), 1024);

        assert!(connection.send(b"hello"));
        assert_eq!(connection.pending_bytes(), 6);
        match rx.try_recv().unwrap() {
            Outbound::Data(data) => assert_eq!(data, b"hello\n"),
            Outbound::Close => panic!("expected data"),
        }
    }

    #[test]
    fn test_buffer_full_fires_once_and_drain_after() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let on_full: ConnectionHook = Arc::new(move |_connection: &dyn Connection| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let callbacks = Callbacks {
            on_buffer_full: Some(on_full),
            ..Callbacks::default()
        };
        let (connection, _rx) = connection(Transport::Tcp, callbacks, 8);

        assert!(connection.send(b"12345"));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(connection.send(b"67890"));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(connection.send(b"x"));
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        assert!(!connection.release(5));
        assert!(!connection.release(5));
        assert!(connection.release(1));
        assert_eq!(connection.pending_bytes(), 0);
    }

    #[test]
    fn test_send_after_close_is_rejected() {
        let (connection, mut rx) = connection(Transport::Tcp, Callbacks::default(), 1024);

        connection.close();
        connection.close();
        assert!(connection.is_closed());
        assert!(!connection.send(b"late"));

        assert!(matches!(rx.try_recv(), Ok(Outbound::Close)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_identity() {
        let (connection, _rx) = connection(Transport::Tcp, Callbacks::default(), 1024);
        assert_eq!(connection.id(), 7);
        assert_eq!(connection.worker(), "gate");
        assert_eq!(connection.peer_addr().unwrap().port(), 4000);
    }
}
