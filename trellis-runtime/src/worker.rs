//! Worker tasks
//!
//! Each worker runs an accept loop until the stop signal flips. Every
//! accepted connection gets a reader loop (this task) and a writer task.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, warn};
use trellis_core::{Connection, Worker};

use crate::connection::{self, ERROR_PACKAGE_TOO_LARGE, ERROR_READ_FAIL, TcpConnection};
use crate::listen::Transport;
use crate::log::RuntimeLog;

const DEFAULT_MAX_SEND_BUFFER_SIZE: usize = 1024 * 1024;
const DEFAULT_MAX_PACKAGE_SIZE: usize = 10 * 1024 * 1024;
const READ_BUFFER_SIZE: usize = 64 * 1024;
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// What every worker task shares with the runtime
#[derive(Clone)]
pub(crate) struct WorkerEnv {
    pub stop: watch::Receiver<bool>,
    pub reload: broadcast::Sender<()>,
    pub next_id: Arc<AtomicU64>,
    pub log: Arc<RuntimeLog>,
}

/// Runs one worker until stopped
pub(crate) async fn serve_worker(
    worker: Arc<Worker>,
    listener: Option<(TcpListener, Transport)>,
    env: WorkerEnv,
) {
    let mut stop = env.stop.clone();
    let mut reload = env.reload.subscribe();
    let mut reload_open = true;

    env.log.write(&format!("Worker '{}' started", worker.name));
    if let Some(on_start) = &worker.callbacks.on_start {
        on_start(&worker);
    }

    let mut connections = JoinSet::new();
    loop {
        if *stop.borrow() {
            break;
        }

        tokio::select! {
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
            received = reload.recv(), if reload_open => match received {
                Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {
                    env.log.write(&format!("Worker '{}' reloading", worker.name));
                    if let Some(on_reload) = &worker.callbacks.on_reload {
                        on_reload(&worker);
                    }
                }
                Err(broadcast::error::RecvError::Closed) => reload_open = false,
            },
            accepted = accept(&listener) => match accepted {
                Ok((stream, peer, transport)) => {
                    let id = env.next_id.fetch_add(1, Ordering::SeqCst);
                    connections.spawn(serve_connection(
                        Arc::clone(&worker),
                        stream,
                        peer,
                        id,
                        transport,
                        env.stop.clone(),
                    ));
                }
                Err(e) => {
                    warn!("Worker '{}' failed to accept: {}", worker.name, e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    drop(listener);
    while connections.join_next().await.is_some() {}

    if let Some(on_stop) = &worker.callbacks.on_stop {
        on_stop(&worker);
    }
    env.log.write(&format!("Worker '{}' stopped", worker.name));
}

async fn accept(
    listener: &Option<(TcpListener, Transport)>,
) -> std::io::Result<(TcpStream, SocketAddr, Transport)> {
    match listener {
        Some((listener, transport)) => {
            let (stream, peer) = listener.accept().await?;
            Ok((stream, peer, *transport))
        }
        None => std::future::pending().await,
    }
}

async fn serve_connection(
    worker: Arc<Worker>,
    stream: TcpStream,
    peer: SocketAddr,
    id: u64,
    transport: Transport,
    mut stop: watch::Receiver<bool>,
) {
    let max_send_buffer_size = worker
        .context_u64("max_send_buffer_size")
        .map(|size| size as usize)
        .unwrap_or(DEFAULT_MAX_SEND_BUFFER_SIZE);
    let max_package_size = worker
        .context_u64("max_package_size")
        .map(|size| size as usize)
        .unwrap_or(DEFAULT_MAX_PACKAGE_SIZE);

    let (mut reader, writer) = stream.into_split();
    let (tx, rx) = mpsc::unbounded_channel();
    let connection = Arc::new(TcpConnection::new(
        id,
        worker.name.clone(),
        peer,
        transport,
        worker.callbacks.clone(),
        tx,
        max_send_buffer_size,
    ));
    let writer_task = tokio::spawn(connection::write_loop(Arc::clone(&connection), writer, rx));

    debug!("Worker '{}' accepted connection {} from {}", worker.name, id, peer);
    if let Some(on_connect) = &worker.callbacks.on_connect {
        on_connect(&*connection);
    }

    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    let mut frame = Vec::new();
    loop {
        if connection.is_closed() || *stop.borrow() {
            break;
        }

        tokio::select! {
            _ = connection.closed() => break,
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
            read = reader.read(&mut buffer) => match read {
                Ok(0) => break,
                Ok(n) => {
                    if !deliver(&connection, transport, &buffer[..n], &mut frame, max_package_size) {
                        break;
                    }
                }
                Err(e) => {
                    if let Some(on_error) = &worker.callbacks.on_error {
                        on_error(&*connection, ERROR_READ_FAIL, &e.to_string());
                    }
                    break;
                }
            },
        }
    }

    connection.close();
    let _ = writer_task.await;

    debug!("Worker '{}' closed connection {}", worker.name, id);
    if let Some(on_close) = &worker.callbacks.on_close {
        on_close(&*connection);
    }
}

/// Hands received bytes to `on_message`
///
/// # Returns
/// `false` if the connection must be dropped
fn deliver(
    connection: &TcpConnection,
    transport: Transport,
    chunk: &[u8],
    frame: &mut Vec<u8>,
    max_package_size: usize,
) -> bool {
    let callbacks = connection.callbacks();
    match transport {
        Transport::Tcp => {
            if let Some(on_message) = &callbacks.on_message {
                on_message(connection, chunk);
            }
            true
        }
        Transport::Text => {
            frame.extend_from_slice(chunk);
            for line in take_lines(frame) {
                if line.len() > max_package_size {
                    reject_oversized(connection, line.len(), max_package_size);
                    return false;
                }
                if let Some(on_message) = &callbacks.on_message {
                    on_message(connection, &line);
                }
            }

            if frame.len() > max_package_size {
                reject_oversized(connection, frame.len(), max_package_size);
                return false;
            }
            true
        }
    }
}

fn reject_oversized(connection: &TcpConnection, size: usize, max_package_size: usize) {
    debug!(
        "Connection {} sent a {} byte frame (max {})",
        connection.id(),
        size,
        max_package_size
    );
    if let Some(on_error) = &connection.callbacks().on_error {
        on_error(
            connection,
            ERROR_PACKAGE_TOO_LARGE,
            &format!("frame of {} bytes exceeds {} bytes", size, max_package_size),
        );
    }
}

/// Removes every complete line from `frame`, without "\n" or "\r\n"
fn take_lines(frame: &mut Vec<u8>) -> Vec<Vec<u8>> {
    let mut lines = Vec::new();
    while let Some(end) = frame.iter().position(|byte| *byte == b'\n') {
        let mut line: Vec<u8> = frame.drain(..=end).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        lines.push(line);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_lines_keeps_partial_frame() {
        let mut frame = b"ping\r\npong\nhal".to_vec();

        let lines = take_lines(&mut frame);
        assert_eq!(lines, vec![b"ping".to_vec(), b"pong".to_vec()]);
        assert_eq!(frame, b"hal");

        frame.extend_from_slice(b"f\n");
        assert_eq!(take_lines(&mut frame), vec![b"half".to_vec()]);
        assert!(frame.is_empty());
    }

    #[test]
    fn test_deliver_rejects_oversized_line_in_one_chunk() {
        use std::sync::Mutex;
        use trellis_core::{Callbacks, ErrorHook, MessageHook};

        let events = Arc::new(Mutex::new(Vec::new()));
        let messages = events.clone();
        let on_message: MessageHook = Arc::new(move |_connection: &dyn Connection, data: &[u8]| {
            messages.lock().unwrap().push(format!("message:{}", data.len()));
        });
        let errors = events.clone();
        let on_error: ErrorHook = Arc::new(move |_connection: &dyn Connection, code: i32, _message: &str| {
            errors.lock().unwrap().push(format!("error:{}", code));
        });
        let callbacks = Callbacks {
            on_message: Some(on_message),
            on_error: Some(on_error),
            ..Callbacks::default()
        };

        let (tx, _rx) = mpsc::unbounded_channel();
        let connection = TcpConnection::new(
            1,
            "gate".to_string(),
            "127.0.0.1:4000".parse().unwrap(),
            Transport::Text,
            callbacks,
            tx,
            DEFAULT_MAX_SEND_BUFFER_SIZE,
        );

        let mut frame = Vec::new();
        assert!(deliver(&connection, Transport::Text, b"ok\n", &mut frame, 4));
        assert!(!deliver(
            &connection,
            Transport::Text,
            b"abcdefghijklmnopqrst\nok\n",
            &mut frame,
            4
        ));

        assert_eq!(*events.lock().unwrap(), vec!["message:2", "error:4"]);
    }

    #[test]
    fn test_take_lines_empty_line() {
        let mut frame = b"\n".to_vec();
        assert_eq!(take_lines(&mut frame), vec![Vec::<u8>::new()]);
    }
}
