//! Trellis Registrar
//!
//! Turns one host type into independently configured network workers by
//! naming convention.
//!
//! It includes:
//! - Method tables a host declares its service and hook methods into
//! - Service discovery (`serviceFoo` declares service `foo`)
//! - Hook resolution and binding (`onFooStart`, falling back to `onStart` for
//!   the default service)
//! - The registrar that checks the environment, configures runtime logs, sets
//!   up every worker and hands them to a `WorkerRuntime`

pub mod binder;
pub mod config;
pub mod environment;
pub mod error;
pub mod host;
pub mod logs;
pub mod registrar;
pub mod registry;

pub use binder::{BindingTable, CallbackBinder};
pub use config::RegistrarConfig;
pub use environment::{EnvironmentCheck, EnvironmentError, SystemEnvironment};
pub use error::{RegistrarError, Result};
pub use host::{Method, MethodTable, ServiceHost};
pub use logs::{LogSetup, ensure_directory};
pub use registrar::{Registrar, ServicePlan, Stage};
pub use registry::{ServiceDescriptor, ServiceRegistry};
