//! Trellis Runtime
//!
//! A tokio-based `WorkerRuntime`. Each worker gets a task with an optional
//! TCP listener; each accepted connection gets a task of its own. Callbacks
//! bound by the registrar fire from inside these tasks.
//!
//! Listen addresses:
//! - `tcp://host:port`: every read chunk is one message
//! - `text://host:port`: newline-delimited messages
//! - empty: no listener; the worker only runs its start/stop/reload hooks

mod connection;
pub mod listen;
mod log;
mod runtime;
mod worker;

pub use connection::{ERROR_PACKAGE_TOO_LARGE, ERROR_READ_FAIL, ERROR_SEND_FAIL, TcpConnection};
pub use listen::{ListenAddress, Transport};
pub use runtime::{StopHandle, TokioRuntime};
