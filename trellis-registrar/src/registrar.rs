//! Service registrar
//!
//! Drives one host through its setup and hands the resulting workers to the
//! runtime:
//!
//! Uninitialized -> EnvironmentChecked -> LogsConfigured -> (per-service setup) -> Running
//!
//! Per enabled service, in discovery order: pre-instantiation method, worker
//! creation, post-instantiation method, event hook binding. Every failure is
//! reported during setup, before any worker runs.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;
use trellis_core::{HookId, Worker, WorkerRuntime};

use crate::binder::{BindingTable, CallbackBinder};
use crate::config::RegistrarConfig;
use crate::environment::{self, EnvironmentCheck, SystemEnvironment};
use crate::error::Result;
use crate::host::{MethodTable, ServiceHost};
use crate::logs::LogSetup;
use crate::registry::{ServiceDescriptor, ServiceRegistry};

/// Setup progress of a registrar
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Uninitialized,
    EnvironmentChecked,
    LogsConfigured,
    Running,
}

/// What setup would do for one service
#[derive(Debug, Clone, Serialize)]
pub struct ServicePlan {
    #[serde(flatten)]
    pub service: ServiceDescriptor,
    pub listen: String,
    pub bindings: BTreeMap<HookId, String>,
}

/// Turns a host's declared services into running workers
pub struct Registrar<H: ServiceHost, R: WorkerRuntime> {
    config: RegistrarConfig,
    host: Arc<H>,
    runtime: R,
    environment: Box<dyn EnvironmentCheck>,
    logs: LogSetup,
    stage: Stage,
}

impl<H: ServiceHost, R: WorkerRuntime> Registrar<H, R> {
    /// Creates a registrar checking the real system environment
    pub fn new(config: RegistrarConfig, host: H, runtime: R) -> Self {
        Self {
            config,
            host: Arc::new(host),
            runtime,
            environment: Box::new(SystemEnvironment),
            logs: LogSetup::new(),
            stage: Stage::Uninitialized,
        }
    }

    /// Replaces the environment check
    pub fn with_environment(mut self, environment: impl EnvironmentCheck + 'static) -> Self {
        self.environment = Box::new(environment);
        self
    }

    pub fn config(&self) -> &RegistrarConfig {
        &self.config
    }

    pub fn host(&self) -> &Arc<H> {
        &self.host
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Runs the environment check
    pub fn check_environment(&mut self) -> Result<()> {
        environment::check(&*self.environment)?;
        self.advance(Stage::EnvironmentChecked);
        Ok(())
    }

    /// Configures the runtime's log files; later calls do nothing
    pub fn configure_logs(&mut self) -> Result<bool> {
        let configured = self.logs.apply(
            &mut self.runtime,
            &self.config.stdout_file,
            &self.config.log_file,
        )?;
        self.advance(Stage::LogsConfigured);
        Ok(configured)
    }

    /// Discovered services with their default and enabled flags
    pub fn services(&self) -> Vec<ServiceDescriptor> {
        let methods = MethodTable::<H>::of();
        ServiceRegistry::new(&self.config).describe(methods.names())
    }

    /// Resolved bindings per discovered service, without side effects
    pub fn plan(&self) -> Vec<ServicePlan> {
        let (services, binder) = self.binder();
        services
            .into_iter()
            .map(|service| ServicePlan {
                listen: self.config.listen_for(&service.name).to_string(),
                bindings: binder.table().for_service(&service.name),
                service,
            })
            .collect()
    }

    /// Checks the environment, configures logs, and creates a bound worker
    /// per enabled service
    ///
    /// # Returns
    /// The workers in discovery order, each named after its service
    pub fn setup(&mut self) -> Result<Vec<Worker>> {
        self.config.validate()?;
        self.check_environment()?;
        self.configure_logs()?;

        let (services, binder) = self.binder();
        info!("Discovered {} service(s)", services.len());

        let mut workers = Vec::new();
        for service in &services {
            if !service.enabled {
                info!("Skipping excluded service '{}'", service.name);
                continue;
            }

            binder.before_instantiate(&service.name)?;

            let listen = self.config.listen_for(&service.name);
            let context = self.config.context_for(&service.name);
            let mut worker = self.runtime.create_worker(listen, context);

            binder.after_instantiate(&mut worker, &service.name)?;
            let bound = binder.bind_lifecycle_hooks(&mut worker, &service.name)?;

            info!(
                "Worker '{}' ready (listen: '{}', {} hook(s) bound)",
                worker.name,
                worker.listen,
                bound.len()
            );
            workers.push(worker);
        }

        Ok(workers)
    }

    /// Sets up all services and runs them
    ///
    /// Blocks until the runtime shuts down. To stop from elsewhere, use a
    /// stop handle the runtime provides before calling this.
    pub fn run(&mut self) -> Result<()> {
        let workers = self.setup()?;
        self.advance(Stage::Running);

        info!("Running {} worker(s)", workers.len());
        self.runtime.run_all(workers)?;
        Ok(())
    }

    /// Asks the runtime to stop every worker
    pub fn stop_all(&self) {
        self.runtime.stop_all();
    }

    fn binder(&self) -> (Vec<ServiceDescriptor>, CallbackBinder<H>) {
        let methods = MethodTable::<H>::of();
        let services = ServiceRegistry::new(&self.config).describe(methods.names());
        let table = BindingTable::build(&methods, &services, &self.config.service_prefix);
        let binder = CallbackBinder::new(Arc::clone(&self.host), methods, table);
        (services, binder)
    }

    fn advance(&mut self, stage: Stage) {
        if stage > self.stage {
            self.stage = stage;
        }
    }
}
