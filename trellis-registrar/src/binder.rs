//! Callback binding
//!
//! Resolves which host method handles each hook of each service and attaches
//! the result to worker instances.
//!
//! Resolution for a (service, hook) pair:
//! 1. the qualified name (`onFooStart`) if the host declares it;
//! 2. otherwise, for the default service only, the generic name (`onStart`),
//!    unless that name is also a qualified name of another discovered service
//!    (with service prefix `on`, `onStart` declares service `start`);
//! 3. otherwise nothing, and the slot keeps the runtime default.
//!
//! All pairs are resolved once into a `BindingTable`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;
use trellis_core::naming::eq_ignore_case;
use trellis_core::{
    Callback, Connection, ConnectionHook, ErrorHook, HookId, MessageHook, Worker, WorkerHook,
};

use crate::error::{RegistrarError, Result};
use crate::host::{Method, MethodTable};
use crate::registry::ServiceDescriptor;

/// Resolved method names keyed by service and hook
#[derive(Debug, Clone, Default)]
pub struct BindingTable {
    entries: HashMap<(String, HookId), String>,
}

impl BindingTable {
    /// Resolves every hook for every discovered service
    pub fn build<H>(
        methods: &MethodTable<H>,
        services: &[ServiceDescriptor],
        service_prefix: &str,
    ) -> Self {
        let mut entries = HashMap::new();
        for service in services {
            for hook in HookId::ALL {
                if let Some(method) = resolve(methods, hook, service, services, service_prefix) {
                    entries.insert((key(&service.name), hook), method);
                }
            }
        }
        Self { entries }
    }

    /// Method resolved for a service's hook
    pub fn get(&self, service: &str, hook: HookId) -> Option<&str> {
        self.entries
            .get(&(key(service), hook))
            .map(String::as_str)
    }

    /// All resolved hooks of a service
    pub fn for_service(&self, service: &str) -> BTreeMap<HookId, String> {
        HookId::ALL
            .into_iter()
            .filter_map(|hook| self.get(service, hook).map(|m| (hook, m.to_string())))
            .collect()
    }
}

fn key(service: &str) -> String {
    service.to_ascii_lowercase()
}

/// Resolves the method handling `hook` for `service`
///
/// `services` is the full discovery result, used to reject a generic name
/// that is also a qualified name of another service.
pub fn resolve<H>(
    methods: &MethodTable<H>,
    hook: HookId,
    service: &ServiceDescriptor,
    services: &[ServiceDescriptor],
    service_prefix: &str,
) -> Option<String> {
    let qualified = hook.qualified_name(&service.name, service_prefix);
    if let Some((declared, _)) = methods.get(&qualified) {
        return Some(declared.to_string());
    }

    if !service.is_default {
        return None;
    }

    let generic = hook.generic_name(service_prefix);
    let (declared, _) = methods.get(&generic)?;

    let claimed = services
        .iter()
        .filter(|other| !eq_ignore_case(&other.name, &service.name))
        .any(|other| {
            HookId::ALL.into_iter().any(|other_hook| {
                eq_ignore_case(&other_hook.qualified_name(&other.name, service_prefix), &generic)
            })
        });
    if claimed {
        return None;
    }

    Some(declared.to_string())
}

/// Attaches resolved methods of a host to workers
pub struct CallbackBinder<H> {
    host: Arc<H>,
    methods: MethodTable<H>,
    table: BindingTable,
}

impl<H: Send + Sync + 'static> CallbackBinder<H> {
    pub fn new(host: Arc<H>, methods: MethodTable<H>, table: BindingTable) -> Self {
        Self {
            host,
            methods,
            table,
        }
    }

    /// Method name resolved for a service's hook
    pub fn resolve(&self, hook: HookId, service: &str) -> Option<&str> {
        self.table.get(service, hook)
    }

    pub fn table(&self) -> &BindingTable {
        &self.table
    }

    /// Looks up the resolved method and checks it can handle the hook
    fn method(&self, hook: HookId, service: &str) -> Result<Option<(&str, &Method<H>)>> {
        let Some(name) = self.table.get(service, hook) else {
            return Ok(None);
        };
        let Some((declared, method)) = self.methods.get(name) else {
            return Ok(None);
        };

        if method.signature() != hook.signature() {
            return Err(RegistrarError::SignatureMismatch {
                service: service.to_string(),
                method: declared.to_string(),
                hook,
                expected: hook.signature(),
                found: method.signature(),
            });
        }

        Ok(Some((declared, method)))
    }

    /// Runs the service's pre-instantiation method, if any
    pub fn before_instantiate(&self, service: &str) -> Result<()> {
        if let Some((name, Method::Nullary(f))) = self.method(HookId::BeforeInstantiation, service)? {
            debug!("Invoking '{}' before creating worker '{}'", name, service);
            f(&self.host);
        }
        Ok(())
    }

    /// Names the worker after the service and runs the post-instantiation method, if any
    pub fn after_instantiate(&self, worker: &mut Worker, service: &str) -> Result<()> {
        worker.name = service.to_string();

        if let Some((name, Method::WorkerSetup(f))) =
            self.method(HookId::AfterInstantiation, service)?
        {
            debug!("Invoking '{}' after creating worker '{}'", name, service);
            f(&self.host, worker);
        }
        Ok(())
    }

    /// Assigns resolved methods to the worker's event slots
    ///
    /// Unresolved slots are left untouched.
    ///
    /// # Returns
    /// The hooks that were bound
    pub fn bind_lifecycle_hooks(&self, worker: &mut Worker, service: &str) -> Result<Vec<HookId>> {
        let mut bound = Vec::new();

        for hook in HookId::EVENTS {
            let Some((name, method)) = self.method(hook, service)? else {
                continue;
            };
            let Some(callback) = self.callback(method) else {
                continue;
            };

            if let Err(rejected) = worker.callbacks.set(hook, callback) {
                return Err(RegistrarError::SignatureMismatch {
                    service: service.to_string(),
                    method: name.to_string(),
                    hook,
                    expected: hook.signature(),
                    found: rejected.signature(),
                });
            }

            debug!("Bound '{}' to {} of worker '{}'", name, hook, service);
            bound.push(hook);
        }

        Ok(bound)
    }

    /// Wraps a method into a callback owning a handle to the host
    fn callback(&self, method: &Method<H>) -> Option<Callback> {
        let host = Arc::clone(&self.host);
        match method {
            Method::Worker(f) => {
                let f = Arc::clone(f);
                let hook: WorkerHook = Arc::new(move |worker: &Worker| f(&host, worker));
                Some(Callback::Worker(hook))
            }
            Method::Connection(f) => {
                let f = Arc::clone(f);
                let hook: ConnectionHook =
                    Arc::new(move |connection: &dyn Connection| f(&host, connection));
                Some(Callback::Connection(hook))
            }
            Method::Message(f) => {
                let f = Arc::clone(f);
                let hook: MessageHook = Arc::new(move |connection: &dyn Connection, data: &[u8]| {
                    f(&host, connection, data)
                });
                Some(Callback::Message(hook))
            }
            Method::Error(f) => {
                let f = Arc::clone(f);
                let hook: ErrorHook =
                    Arc::new(move |connection: &dyn Connection, code: i32, message: &str| {
                        f(&host, connection, code, message)
                    });
                Some(Callback::Error(hook))
            }
            Method::Nullary(_) | Method::WorkerSetup(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ServiceHost;
    use std::sync::Mutex;
    use trellis_core::SocketContext;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    /// Declares both the generic and the qualified start handler for the default service
    struct BothStarts;

    impl ServiceHost for BothStarts {
        fn declare(methods: &mut MethodTable<Self>) {
            methods
                .worker("onStart", |_, _| {})
                .worker("onDefaultStart", |_, _| {})
                .nullary("serviceFoo", |_| {});
        }
    }

    fn descriptor(name: &str, is_default: bool) -> ServiceDescriptor {
        ServiceDescriptor {
            name: name.to_string(),
            is_default,
            enabled: true,
        }
    }

    fn binder_for<H: ServiceHost>(host: H, services: &[ServiceDescriptor]) -> CallbackBinder<H> {
        let methods = MethodTable::<H>::of();
        let table = BindingTable::build(&methods, services, "service");
        CallbackBinder::new(Arc::new(host), methods, table)
    }

    #[test]
    fn test_qualified_beats_generic_for_default() {
        let methods = MethodTable::<BothStarts>::of();
        let services = vec![descriptor("default", true), descriptor("foo", false)];

        let resolved = resolve(&methods, HookId::OnStart, &services[0], &services, "service");
        assert_eq!(resolved.as_deref(), Some("onDefaultStart"));
    }

    #[test]
    fn test_generic_only_for_default_service() {
        let methods = MethodTable::<BothStarts>::of();
        let services = vec![descriptor("default", true), descriptor("foo", false)];

        let resolved = resolve(&methods, HookId::OnStart, &services[1], &services, "service");
        assert_eq!(resolved, None);
    }

    #[test]
    fn test_generic_fallback_for_default() {
        struct GenericOnly;
        impl ServiceHost for GenericOnly {
            fn declare(methods: &mut MethodTable<Self>) {
                methods.worker("onStart", |_, _| {});
            }
        }

        let methods = MethodTable::<GenericOnly>::of();
        let services = vec![descriptor("main", true)];
        let table = BindingTable::build(&methods, &services, "service");

        assert_eq!(table.get("main", HookId::OnStart), Some("onStart"));
        assert_eq!(table.get("MAIN", HookId::OnStart), Some("onStart"));
        assert_eq!(table.get("main", HookId::OnStop), None);
    }

    #[test]
    fn test_generic_claimed_by_other_service_is_not_used() {
        struct Claimed;
        impl ServiceHost for Claimed {
            fn declare(methods: &mut MethodTable<Self>) {
                methods.worker("onStart", |_, _| {});
            }
        }

        // With prefix "on", `onStart` declares service "start" and is that
        // service's pre-instantiation method.
        let methods = MethodTable::<Claimed>::of();
        let services = vec![descriptor("default", true), descriptor("start", false)];

        let resolved = resolve(&methods, HookId::OnStart, &services[0], &services, "on");
        assert_eq!(resolved, None);

        let resolved = resolve(
            &methods,
            HookId::BeforeInstantiation,
            &services[1],
            &services,
            "on",
        );
        assert_eq!(resolved.as_deref(), Some("onStart"));

        // Under the usual prefix nothing claims it
        let services = vec![descriptor("default", true)];
        let resolved = resolve(&methods, HookId::OnStart, &services[0], &services, "service");
        assert_eq!(resolved.as_deref(), Some("onStart"));
    }

    #[test]
    fn test_before_instantiate_invokes_once() {
        struct Setup(Recorder);
        impl ServiceHost for Setup {
            fn declare(methods: &mut MethodTable<Self>) {
                methods.nullary("serviceFoo", |host| host.0.record("serviceFoo"));
            }
        }

        let services = vec![descriptor("default", true), descriptor("foo", false)];
        let binder = binder_for(Setup(Recorder::default()), &services);

        binder.before_instantiate("default").unwrap();
        assert!(binder.host.0.calls().is_empty());

        binder.before_instantiate("foo").unwrap();
        assert_eq!(binder.host.0.calls(), vec!["serviceFoo"]);
    }

    #[test]
    fn test_after_instantiate_names_worker_without_hook() {
        let services = vec![descriptor("default", true), descriptor("foo", false)];
        let binder = binder_for(BothStarts, &services);

        let mut worker = Worker::new("", SocketContext::new());
        binder.after_instantiate(&mut worker, "foo").unwrap();
        assert_eq!(worker.name, "foo");
    }

    #[test]
    fn test_after_instantiate_runs_hook_with_worker() {
        struct Tuning;
        impl ServiceHost for Tuning {
            fn declare(methods: &mut MethodTable<Self>) {
                methods.worker_setup("setAfterInstantiate", |_, worker| {
                    worker.listen = format!("{}-tuned", worker.name);
                });
            }
        }

        let services = vec![descriptor("default", true)];
        let binder = binder_for(Tuning, &services);

        let mut worker = Worker::new("", SocketContext::new());
        binder.after_instantiate(&mut worker, "default").unwrap();
        assert_eq!(worker.name, "default");
        assert_eq!(worker.listen, "default-tuned");
    }

    #[test]
    fn test_bind_lifecycle_hooks_uses_qualified_only() {
        struct Host(Recorder);
        impl ServiceHost for Host {
            fn declare(methods: &mut MethodTable<Self>) {
                methods
                    .worker("onStart", |host, _| host.0.record("onStart"))
                    .worker("onDefaultStart", |host, _| host.0.record("onDefaultStart"))
                    .connection("onClose", |host, _| host.0.record("onClose"));
            }
        }

        let services = vec![descriptor("default", true)];
        let binder = binder_for(Host(Recorder::default()), &services);

        let mut worker = Worker::new("", SocketContext::new());
        let bound = binder.bind_lifecycle_hooks(&mut worker, "default").unwrap();
        assert_eq!(bound, vec![HookId::OnStart, HookId::OnClose]);

        let on_start = worker.callbacks.on_start.clone().unwrap();
        on_start(&worker);
        assert_eq!(binder.host.0.calls(), vec!["onDefaultStart"]);
    }

    #[test]
    fn test_bind_rejects_signature_mismatch() {
        struct Wrong;
        impl ServiceHost for Wrong {
            fn declare(methods: &mut MethodTable<Self>) {
                methods.nullary("onFooMessage", |_| {});
            }
        }

        let services = vec![descriptor("foo", false)];
        let binder = binder_for(Wrong, &services);

        let mut worker = Worker::new("", SocketContext::new());
        let err = binder.bind_lifecycle_hooks(&mut worker, "foo").unwrap_err();
        assert!(matches!(
            err,
            RegistrarError::SignatureMismatch { hook: HookId::OnMessage, .. }
        ));
    }

    #[test]
    fn test_for_service_lists_resolved_hooks() {
        let methods = MethodTable::<BothStarts>::of();
        let services = vec![descriptor("default", true), descriptor("foo", false)];
        let table = BindingTable::build(&methods, &services, "service");

        let foo = table.for_service("foo");
        assert_eq!(foo.len(), 1);
        assert_eq!(foo.get(&HookId::BeforeInstantiation).map(String::as_str), Some("serviceFoo"));

        let default = table.for_service("default");
        assert_eq!(default.get(&HookId::OnStart).map(String::as_str), Some("onDefaultStart"));
    }
}
