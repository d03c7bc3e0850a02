//! Trellis Core
//!
//! Types shared by the service registrar and the worker runtimes it drives.
//!
//! This crate contains:
//! - Domain types: lifecycle hooks, worker handles, connections
//! - The `WorkerRuntime` contract a runtime implements
//! - Naming helpers for the service/hook method-name convention

pub mod domain;
pub mod naming;
pub mod runtime;

pub use domain::connection::Connection;
pub use domain::hook::{HookId, Signature};
pub use domain::worker::{
    Callback, Callbacks, ConnectionHook, ErrorHook, MessageHook, SocketContext, Worker,
    WorkerHook,
};
pub use runtime::{RuntimeError, WorkerRuntime};
