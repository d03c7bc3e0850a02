//! Service hosts and their method tables
//!
//! A host type declares, once, every method the registrar may discover or
//! bind. Methods are registered by name in declaration order; the names
//! follow the service/hook convention (`serviceFoo`, `onFooStart`, `onStart`)
//! and the registrar resolves hooks against this table.

use std::sync::Arc;
use trellis_core::naming::eq_ignore_case;
use trellis_core::{Connection, Signature, Worker};

/// A type whose declared methods define services and their hooks
///
/// # Example
///
/// ```rust
/// use trellis_core::Worker;
/// use trellis_registrar::{MethodTable, ServiceHost};
///
/// struct Counter;
///
/// impl Counter {
///     fn on_start(&self, worker: &Worker) {
///         println!("{} started", worker.name);
///     }
///
///     fn service_foo(&self) {}
/// }
///
/// impl ServiceHost for Counter {
///     fn declare(methods: &mut MethodTable<Self>) {
///         methods
///             .worker("onStart", Self::on_start)
///             .nullary("serviceFoo", Self::service_foo)
///             .worker("onFooStart", Self::on_start);
///     }
/// }
/// ```
pub trait ServiceHost: Send + Sync + Sized + 'static {
    /// Declares this host's methods, in declaration order
    ///
    /// Called once per registrar; the table is closed afterwards.
    fn declare(methods: &mut MethodTable<Self>);
}

/// A declared host method, tagged by the arguments it accepts
pub enum Method<H> {
    Nullary(Arc<dyn Fn(&H) + Send + Sync>),
    WorkerSetup(Arc<dyn Fn(&H, &mut Worker) + Send + Sync>),
    Worker(Arc<dyn Fn(&H, &Worker) + Send + Sync>),
    Connection(Arc<dyn Fn(&H, &dyn Connection) + Send + Sync>),
    Message(Arc<dyn Fn(&H, &dyn Connection, &[u8]) + Send + Sync>),
    Error(Arc<dyn Fn(&H, &dyn Connection, i32, &str) + Send + Sync>),
}

impl<H> Method<H> {
    pub fn signature(&self) -> Signature {
        match self {
            Method::Nullary(_) => Signature::Nullary,
            Method::WorkerSetup(_) => Signature::WorkerSetup,
            Method::Worker(_) => Signature::Worker,
            Method::Connection(_) => Signature::Connection,
            Method::Message(_) => Signature::Message,
            Method::Error(_) => Signature::Error,
        }
    }
}

impl<H> Clone for Method<H> {
    fn clone(&self) -> Self {
        match self {
            Method::Nullary(f) => Method::Nullary(Arc::clone(f)),
            Method::WorkerSetup(f) => Method::WorkerSetup(Arc::clone(f)),
            Method::Worker(f) => Method::Worker(Arc::clone(f)),
            Method::Connection(f) => Method::Connection(Arc::clone(f)),
            Method::Message(f) => Method::Message(Arc::clone(f)),
            Method::Error(f) => Method::Error(Arc::clone(f)),
        }
    }
}

/// Ordered table of a host's declared methods
///
/// Names are unique and compare without regard to ASCII case.
pub struct MethodTable<H> {
    entries: Vec<(String, Method<H>)>,
}

impl<H: ServiceHost> MethodTable<H> {
    /// Builds the table a host declares
    pub fn of() -> Self {
        let mut table = Self::new();
        H::declare(&mut table);
        table
    }
}

impl<H> MethodTable<H> {
    /// Creates an empty table
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Declares a method
    ///
    /// # Panics
    /// Panics if a method with the same name (ignoring case) is already declared
    pub fn declare(&mut self, name: &str, method: Method<H>) -> &mut Self {
        if self.contains(name) {
            panic!("Method '{}' is already declared", name);
        }
        self.entries.push((name.to_string(), method));
        self
    }

    /// Declares a method taking no arguments (service declarations)
    pub fn nullary<F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: Fn(&H) + Send + Sync + 'static,
    {
        self.declare(name, Method::Nullary(Arc::new(f)))
    }

    /// Declares a method run on a freshly created worker
    pub fn worker_setup<F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: Fn(&H, &mut Worker) + Send + Sync + 'static,
    {
        self.declare(name, Method::WorkerSetup(Arc::new(f)))
    }

    /// Declares a method taking a running worker
    pub fn worker<F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: Fn(&H, &Worker) + Send + Sync + 'static,
    {
        self.declare(name, Method::Worker(Arc::new(f)))
    }

    /// Declares a method taking a connection
    pub fn connection<F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: Fn(&H, &dyn Connection) + Send + Sync + 'static,
    {
        self.declare(name, Method::Connection(Arc::new(f)))
    }

    /// Declares a method taking a connection and received data
    pub fn message<F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: Fn(&H, &dyn Connection, &[u8]) + Send + Sync + 'static,
    {
        self.declare(name, Method::Message(Arc::new(f)))
    }

    /// Declares a method taking a connection, an error code and a message
    pub fn error<F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: Fn(&H, &dyn Connection, i32, &str) + Send + Sync + 'static,
    {
        self.declare(name, Method::Error(Arc::new(f)))
    }

    /// Looks up a method by name, ignoring case
    ///
    /// # Returns
    /// The name as declared, and the method
    pub fn get(&self, name: &str) -> Option<(&str, &Method<H>)> {
        self.entries
            .iter()
            .find(|(declared, _)| eq_ignore_case(declared, name))
            .map(|(declared, method)| (declared.as_str(), method))
    }

    /// Checks whether a method is declared, ignoring case
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Declared names in declaration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<H> Default for MethodTable<H> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl Echo {
        fn on_message(&self, connection: &dyn Connection, data: &[u8]) {
            connection.send(data);
        }
    }

    impl ServiceHost for Echo {
        fn declare(methods: &mut MethodTable<Self>) {
            methods
                .message("onMessage", Self::on_message)
                .nullary("serviceGate", |_| {})
                .worker("onGateStart", |_, _| {});
        }
    }

    #[test]
    fn test_declaration_order() {
        let table = MethodTable::<Echo>::of();
        let names: Vec<&str> = table.names().collect();
        assert_eq!(names, vec!["onMessage", "serviceGate", "onGateStart"]);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_lookup_ignores_case() {
        let table = MethodTable::<Echo>::of();

        let (declared, method) = table.get("ONGATESTART").unwrap();
        assert_eq!(declared, "onGateStart");
        assert_eq!(method.signature(), Signature::Worker);

        assert!(table.contains("servicegate"));
        assert!(!table.contains("onStart"));
    }

    #[test]
    #[should_panic(expected = "already declared")]
    fn test_duplicate_declaration() {
        let mut table = MethodTable::<Echo>::new();
        table.nullary("serviceFoo", |_| {});
        table.nullary("SERVICEFOO", |_| {});
    }
}
