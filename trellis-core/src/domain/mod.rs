//! Domain types
//!
//! Entities shared between the registrar and worker runtimes.

pub mod connection;
pub mod hook;
pub mod worker;
