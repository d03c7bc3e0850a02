//! Environment checks
//!
//! Collects every blocking problem with the host platform in one pass so
//! they can be reported together before any worker starts.

use std::fmt;
use thiserror::Error;
use tracing::info;

/// Source of blocking environment problems
pub trait EnvironmentCheck: Send + Sync {
    /// Returns human-readable problems; empty means the environment is usable
    fn problems(&self) -> Vec<String>;
}

impl<F> EnvironmentCheck for F
where
    F: Fn() -> Vec<String> + Send + Sync,
{
    fn problems(&self) -> Vec<String> {
        self()
    }
}

/// Checks the platform the bundled runtime depends on
pub struct SystemEnvironment;

impl EnvironmentCheck for SystemEnvironment {
    fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if std::env::consts::OS.to_lowercase().starts_with("win") {
            problems.push("Do not support windows!".to_string());
        }

        if !cfg!(unix) {
            problems.push(
                "Process control signals (SIGTERM, SIGHUP) are unavailable on this platform"
                    .to_string(),
            );
        }

        problems
    }
}

/// The environment check failed
#[derive(Debug, Error)]
#[error("Service environment check failed with {} problem(s)", problems.len())]
pub struct EnvironmentError {
    pub problems: Vec<String>,
}

impl EnvironmentError {
    /// Lines for the console: a header, the numbered problems, and a closing hint
    pub fn report(&self) -> Report<'_> {
        Report(&self.problems)
    }
}

/// Console rendering of an `EnvironmentError`
pub struct Report<'a>(&'a [String]);

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Service environment check failed! Error messages: ")?;
        for (i, problem) in self.0.iter().enumerate() {
            writeln!(f, "{}.{}", i + 1, problem)?;
        }
        write!(f, "Please fix the issues above.")
    }
}

/// Runs a check, failing with every problem found
pub fn check(environment: &dyn EnvironmentCheck) -> Result<(), EnvironmentError> {
    let problems = environment.problems();
    if !problems.is_empty() {
        return Err(EnvironmentError { problems });
    }

    info!("Service environment check passed!");
    Ok(())
}
