//! Error types for the registrar

use std::path::PathBuf;
use thiserror::Error;
use trellis_core::{HookId, RuntimeError, Signature};

use crate::environment::EnvironmentError;

/// Result type alias for registrar operations
pub type Result<T> = std::result::Result<T, RegistrarError>;

/// Errors that can occur while setting up or running services
#[derive(Debug, Error)]
pub enum RegistrarError {
    /// The environment check reported blocking problems
    #[error(transparent)]
    Environment(#[from] EnvironmentError),

    /// Configuration is inconsistent
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A log directory could not be created
    #[error("Failed to create log directory: {}", .0.display())]
    LogDirectory(PathBuf),

    /// A resolved method cannot handle the hook it was resolved for
    #[error(
        "Method '{method}' cannot handle {hook} for service '{service}': expected {expected:?} handler, found {found:?}"
    )]
    SignatureMismatch {
        /// Service being set up
        service: String,
        /// Declared method name
        method: String,
        /// Hook the method was resolved for
        hook: HookId,
        /// Signature the hook requires
        expected: Signature,
        /// Signature the method was declared with
        found: Signature,
    },

    /// The worker runtime failed
    #[error("Worker runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}

impl RegistrarError {
    /// Check if this error came from the environment check
    pub fn is_environment(&self) -> bool {
        matches!(self, Self::Environment(_))
    }
}
