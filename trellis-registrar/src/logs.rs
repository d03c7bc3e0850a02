//! Runtime log setup
//!
//! Creates the directories for the runtime's log files and hands the paths
//! to the runtime, at most once per registrar.

use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};
use trellis_core::WorkerRuntime;

use crate::error::{RegistrarError, Result};

/// Creates `path` and its parents
///
/// # Returns
/// `true` if the directory exists afterwards
pub fn ensure_directory(path: &Path) -> bool {
    if path.as_os_str().is_empty() || path.is_dir() {
        return true;
    }

    match fs::create_dir_all(path) {
        Ok(()) => true,
        Err(e) => {
            // Another process may have created it in between
            warn!("Failed to create directory {}: {}", path.display(), e);
            path.is_dir()
        }
    }
}

/// Once-only log configuration
#[derive(Debug, Default)]
pub struct LogSetup {
    configured: bool,
}

impl LogSetup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    /// Creates the log directories and sets the runtime's log paths
    ///
    /// # Returns
    /// `true` if this call configured the runtime, `false` if it already was
    pub fn apply<R>(&mut self, runtime: &mut R, stdout_file: &Path, log_file: &Path) -> Result<bool>
    where
        R: WorkerRuntime + ?Sized,
    {
        if self.configured {
            debug!("Runtime log files already configured");
            return Ok(false);
        }

        for file in [stdout_file, log_file] {
            if let Some(dir) = file.parent() {
                if !ensure_directory(dir) {
                    return Err(RegistrarError::LogDirectory(dir.to_path_buf()));
                }
            }
        }

        runtime.set_stdout_file(stdout_file);
        runtime.set_log_file(log_file);
        self.configured = true;

        info!(
            "Runtime logs: stdout={}, log={}",
            stdout_file.display(),
            log_file.display()
        );
        Ok(true)
    }
}
