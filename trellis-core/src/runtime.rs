//! Worker runtime contract
//!
//! The registrar prepares workers; a runtime owns them from `run_all` on.

use std::path::Path;
use thiserror::Error;

use crate::domain::worker::{SocketContext, Worker};

/// Errors raised by a worker runtime
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Listen address could not be parsed
    #[error("Invalid listen address '{listen}': {reason}")]
    InvalidListen {
        /// The address as configured
        listen: String,
        /// Why it was rejected
        reason: String,
    },

    /// Listener could not be bound
    #[error("Failed to bind worker '{worker}' to {address}: {source}")]
    Bind {
        /// Worker name
        worker: String,
        /// Socket address
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// I/O failure outside a listener
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Runtime could not start
    #[error("Runtime startup failed: {0}")]
    Startup(String),
}

/// An engine that runs workers
pub trait WorkerRuntime {
    /// Creates a worker handle for a listen address and socket context
    fn create_worker(&self, listen: &str, context: SocketContext) -> Worker {
        Worker::new(listen, context)
    }

    /// Sets the file that receives the runtime's console output
    fn set_stdout_file(&mut self, path: &Path);

    /// Sets the runtime's own log file
    fn set_log_file(&mut self, path: &Path);

    /// Runs all workers, blocking until the runtime shuts down
    fn run_all(&mut self, workers: Vec<Worker>) -> Result<(), RuntimeError>;

    /// Asks every running worker to stop
    fn stop_all(&self);
}
