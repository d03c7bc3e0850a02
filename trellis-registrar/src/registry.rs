//! Service discovery
//!
//! Enumerates the services a host declares and decides which of them are
//! instantiated. A method whose name starts with the service prefix declares
//! a service; the rest of the name is the service name (`serviceFoo` -> `foo`).

use serde::Serialize;
use tracing::debug;
use trellis_core::naming::{contains_ignore_case, eq_ignore_case, lower_first, strip_prefix_ignore_case};

use crate::config::RegistrarConfig;

/// One service found during discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceDescriptor {
    pub name: String,
    /// Whether this is the configured default service
    pub is_default: bool,
    /// False when the service is excluded
    pub enabled: bool,
}

/// Discovers services for one configuration
pub struct ServiceRegistry<'a> {
    config: &'a RegistrarConfig,
}

impl<'a> ServiceRegistry<'a> {
    pub fn new(config: &'a RegistrarConfig) -> Self {
        Self { config }
    }

    /// Discovers service names from a host's method names
    pub fn discover<'m, I>(&self, methods: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'m str>,
    {
        discover(
            methods,
            &self.config.default_service,
            &self.config.service_prefix,
        )
    }

    /// Discovers services and marks the default and disabled ones
    pub fn describe<'m, I>(&self, methods: I) -> Vec<ServiceDescriptor>
    where
        I: IntoIterator<Item = &'m str>,
    {
        self.discover(methods)
            .into_iter()
            .map(|name| ServiceDescriptor {
                is_default: !self.config.default_service.is_empty()
                    && eq_ignore_case(&name, &self.config.default_service),
                enabled: is_enabled(&name, &self.config.exclusions),
                name,
            })
            .collect()
    }
}

/// Returns the ordered, case-insensitively unique service names
///
/// The default service comes first unless it is empty. Declared services
/// follow in method declaration order; the first spelling of a name wins.
pub fn discover<'m, I>(methods: I, default_service: &str, service_prefix: &str) -> Vec<String>
where
    I: IntoIterator<Item = &'m str>,
{
    let mut services: Vec<String> = Vec::new();
    if !default_service.is_empty() {
        services.push(default_service.to_string());
    }

    if service_prefix.is_empty() {
        return services;
    }

    for method in methods {
        let Some(rest) = strip_prefix_ignore_case(method, service_prefix) else {
            continue;
        };
        if rest.is_empty() {
            continue;
        }

        let service = lower_first(rest);
        if contains_ignore_case(&services, &service) {
            debug!("Method '{}' names already known service '{}'", method, service);
            continue;
        }

        debug!("Method '{}' declares service '{}'", method, service);
        services.push(service);
    }

    services
}

/// Checks whether a service is not excluded
///
/// Empty exclusion entries are ignored; matching ignores case.
pub fn is_enabled<S: AsRef<str>>(service: &str, exclusions: &[S]) -> bool {
    !exclusions
        .iter()
        .map(AsRef::as_ref)
        .filter(|entry| !entry.is_empty())
        .any(|entry| eq_ignore_case(entry, service))
}
