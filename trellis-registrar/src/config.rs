//! Registrar configuration
//!
//! Defines the naming conventions, excluded services, log file locations,
//! and per-service listen addresses and socket contexts. A configuration is
//! handed to the registrar once and never changes during a run.

use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::path::PathBuf;
use trellis_core::SocketContext;
use trellis_core::naming::{eq_ignore_case, underscore_to_camel};

use crate::error::{RegistrarError, Result};

const ENV_PREFIX: &str = "TRELLIS_";
const LISTEN_VAR_PREFIX: &str = "TRELLIS_LISTEN_";
const CONTEXT_VAR_PREFIX: &str = "TRELLIS_CONTEXT_";

/// Registrar configuration
#[derive(Debug, Clone)]
pub struct RegistrarConfig {
    /// Service created even when the host declares none; its generic-named
    /// methods serve as fallback handlers. Empty disables it.
    pub default_service: String,

    /// Prefix marking a method as a service declaration (e.g. "service")
    pub service_prefix: String,

    /// Services that are discovered but not instantiated
    pub exclusions: Vec<String>,

    /// File receiving the runtime's console output
    pub stdout_file: PathBuf,

    /// The runtime's own log file
    pub log_file: PathBuf,

    /// Listen address per service (e.g. "default" -> "text://0.0.0.0:5678")
    pub listens: HashMap<String, String>,

    /// Socket context per service
    pub contexts: HashMap<String, SocketContext>,
}

impl RegistrarConfig {
    /// Creates a configuration with default log paths and no listeners
    pub fn new(default_service: impl Into<String>, service_prefix: impl Into<String>) -> Self {
        Self {
            default_service: default_service.into(),
            service_prefix: service_prefix.into(),
            exclusions: Vec::new(),
            stdout_file: PathBuf::from("./data/logs/trellis/stdout.log"),
            log_file: PathBuf::from("./data/logs/trellis/trellis.log"),
            listens: HashMap::new(),
            contexts: HashMap::new(),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Recognized environment variables (all optional):
    /// - TRELLIS_DEFAULT_SERVICE (default: "default", may be empty)
    /// - TRELLIS_SERVICE_PREFIX (default: "service")
    /// - TRELLIS_EXCLUDE (comma-separated service names)
    /// - TRELLIS_STDOUT_FILE
    /// - TRELLIS_LOG_FILE
    /// - TRELLIS_LISTEN_<SERVICE> (e.g. TRELLIS_LISTEN_FOO_BAR for service "fooBar")
    /// - TRELLIS_CONTEXT_<SERVICE> (JSON object)
    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars())
    }

    /// Creates configuration from an explicit set of variables
    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut config = Self::default();

        for (key, value) in vars {
            if !key.starts_with(ENV_PREFIX) {
                continue;
            }

            if let Some(service) = key.strip_prefix(LISTEN_VAR_PREFIX) {
                config
                    .listens
                    .insert(service_from_var(service), value.trim().to_string());
                continue;
            }

            if let Some(service) = key.strip_prefix(CONTEXT_VAR_PREFIX) {
                let context = parse_context(&key, &value)?;
                config.contexts.insert(service_from_var(service), context);
                continue;
            }

            match key.as_str() {
                "TRELLIS_DEFAULT_SERVICE" => config.default_service = value.trim().to_string(),
                "TRELLIS_SERVICE_PREFIX" => config.service_prefix = value.trim().to_string(),
                "TRELLIS_EXCLUDE" => {
                    config.exclusions = value
                        .split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect();
                }
                "TRELLIS_STDOUT_FILE" => config.stdout_file = PathBuf::from(value),
                "TRELLIS_LOG_FILE" => config.log_file = PathBuf::from(value),
                _ => {}
            }
        }

        Ok(config)
    }

    /// Sets the listen address of a service
    pub fn with_listen(mut self, service: impl Into<String>, listen: impl Into<String>) -> Self {
        self.listens.insert(service.into(), listen.into());
        self
    }

    /// Sets the socket context of a service
    pub fn with_context(mut self, service: impl Into<String>, context: SocketContext) -> Self {
        self.contexts.insert(service.into(), context);
        self
    }

    /// Excludes a service from instantiation
    pub fn with_exclusion(mut self, service: impl Into<String>) -> Self {
        self.exclusions.push(service.into());
        self
    }

    /// Sets both log file paths
    pub fn with_log_files(mut self, stdout_file: impl Into<PathBuf>, log_file: impl Into<PathBuf>) -> Self {
        self.stdout_file = stdout_file.into();
        self.log_file = log_file.into();
        self
    }

    /// Listen address for a service, empty when not configured
    pub fn listen_for(&self, service: &str) -> &str {
        self.listens
            .iter()
            .find(|(name, _)| eq_ignore_case(name, service))
            .map(|(_, listen)| listen.as_str())
            .unwrap_or("")
    }

    /// Socket context for a service, empty when not configured
    pub fn context_for(&self, service: &str) -> SocketContext {
        self.contexts
            .iter()
            .find(|(name, _)| eq_ignore_case(name, service))
            .map(|(_, context)| context.clone())
            .unwrap_or_default()
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if self.service_prefix.is_empty() {
            return Err(RegistrarError::Config(
                "service_prefix cannot be empty".to_string(),
            ));
        }

        if self.stdout_file.as_os_str().is_empty() {
            return Err(RegistrarError::Config(
                "stdout_file cannot be empty".to_string(),
            ));
        }

        if self.log_file.as_os_str().is_empty() {
            return Err(RegistrarError::Config("log_file cannot be empty".to_string()));
        }

        // Service names compare without case, so two keys naming the same
        // service would make the lookup ambiguous.
        check_distinct_keys("listens", self.listens.keys())?;
        check_distinct_keys("contexts", self.contexts.keys())?;

        Ok(())
    }
}

impl Default for RegistrarConfig {
    fn default() -> Self {
        Self::new("default", "service")
    }
}

/// Maps the suffix of a per-service variable to a service name (FOO_BAR -> fooBar)
fn service_from_var(suffix: &str) -> String {
    underscore_to_camel(&suffix.to_lowercase())
}

fn parse_context(key: &str, value: &str) -> Result<SocketContext> {
    match serde_json::from_str::<JsonValue>(value) {
        Ok(JsonValue::Object(map)) => Ok(map.into_iter().collect()),
        Ok(_) => Err(RegistrarError::Config(format!(
            "{key} must be a JSON object"
        ))),
        Err(e) => Err(RegistrarError::Config(format!(
            "{key} is not valid JSON: {e}"
        ))),
    }
}

fn check_distinct_keys<'a>(field: &str, keys: impl Iterator<Item = &'a String>) -> Result<()> {
    let mut seen: Vec<&str> = Vec::new();
    for key in keys {
        if let Some(existing) = seen.iter().find(|s| eq_ignore_case(s, key)) {
            return Err(RegistrarError::Config(format!(
                "{field} has entries '{existing}' and '{key}' for the same service"
            )));
        }
        seen.push(key);
    }
    Ok(())
}
