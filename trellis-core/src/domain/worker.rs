//! Worker handles
//!
//! A `Worker` is one listening service: its name, listen address, socket
//! context, and the callback slots the runtime fires during its life.
//! Slots left empty fall back to the runtime's no-op default.

use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::connection::Connection;
use super::hook::{HookId, Signature};

/// Socket context options keyed by option name
pub type SocketContext = BTreeMap<String, JsonValue>;

/// Callback taking a running worker (start, stop, reload)
pub type WorkerHook = Arc<dyn Fn(&Worker) + Send + Sync>;

/// Callback taking a connection (connect, close, buffer full, buffer drain)
pub type ConnectionHook = Arc<dyn Fn(&dyn Connection) + Send + Sync>;

/// Callback taking a connection and a received payload
pub type MessageHook = Arc<dyn Fn(&dyn Connection, &[u8]) + Send + Sync>;

/// Callback taking a connection, an error code and a message
pub type ErrorHook = Arc<dyn Fn(&dyn Connection, i32, &str) + Send + Sync>;

/// A callback ready to be stored in a slot
#[derive(Clone)]
pub enum Callback {
    Worker(WorkerHook),
    Connection(ConnectionHook),
    Message(MessageHook),
    Error(ErrorHook),
}

impl Callback {
    pub fn signature(&self) -> Signature {
        match self {
            Callback::Worker(_) => Signature::Worker,
            Callback::Connection(_) => Signature::Connection,
            Callback::Message(_) => Signature::Message,
            Callback::Error(_) => Signature::Error,
        }
    }
}

/// The runtime's callback slots, one per event hook
#[derive(Clone, Default)]
pub struct Callbacks {
    pub on_start: Option<WorkerHook>,
    pub on_connect: Option<ConnectionHook>,
    pub on_message: Option<MessageHook>,
    pub on_close: Option<ConnectionHook>,
    pub on_error: Option<ErrorHook>,
    pub on_buffer_full: Option<ConnectionHook>,
    pub on_buffer_drain: Option<ConnectionHook>,
    pub on_stop: Option<WorkerHook>,
    pub on_reload: Option<WorkerHook>,
}

impl Callbacks {
    /// Stores `callback` in the slot for `hook`
    ///
    /// # Errors
    /// Hands the callback back if `hook` is not an event hook or the
    /// callback's signature does not fit the slot
    pub fn set(&mut self, hook: HookId, callback: Callback) -> Result<(), Callback> {
        if !hook.is_event() || callback.signature() != hook.signature() {
            return Err(callback);
        }

        match (hook, callback) {
            (HookId::OnStart, Callback::Worker(f)) => self.on_start = Some(f),
            (HookId::OnStop, Callback::Worker(f)) => self.on_stop = Some(f),
            (HookId::OnReload, Callback::Worker(f)) => self.on_reload = Some(f),
            (HookId::OnConnect, Callback::Connection(f)) => self.on_connect = Some(f),
            (HookId::OnClose, Callback::Connection(f)) => self.on_close = Some(f),
            (HookId::OnBufferFull, Callback::Connection(f)) => self.on_buffer_full = Some(f),
            (HookId::OnBufferDrain, Callback::Connection(f)) => self.on_buffer_drain = Some(f),
            (HookId::OnMessage, Callback::Message(f)) => self.on_message = Some(f),
            (HookId::OnError, Callback::Error(f)) => self.on_error = Some(f),
            (_, other) => return Err(other),
        }
        Ok(())
    }

    /// Checks whether the slot for `hook` holds a callback
    pub fn is_bound(&self, hook: HookId) -> bool {
        match hook {
            HookId::OnStart => self.on_start.is_some(),
            HookId::OnConnect => self.on_connect.is_some(),
            HookId::OnMessage => self.on_message.is_some(),
            HookId::OnClose => self.on_close.is_some(),
            HookId::OnError => self.on_error.is_some(),
            HookId::OnBufferFull => self.on_buffer_full.is_some(),
            HookId::OnBufferDrain => self.on_buffer_drain.is_some(),
            HookId::OnStop => self.on_stop.is_some(),
            HookId::OnReload => self.on_reload.is_some(),
            HookId::BeforeInstantiation | HookId::AfterInstantiation => false,
        }
    }

    /// Bound event hooks in slot order
    pub fn bound(&self) -> Vec<HookId> {
        HookId::EVENTS
            .into_iter()
            .filter(|hook| self.is_bound(*hook))
            .collect()
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.bound()).finish()
    }
}

/// A worker handle
#[derive(Debug, Clone)]
pub struct Worker {
    /// Service name, shown in runtime logs
    pub name: String,

    /// Listen address (e.g., "tcp://0.0.0.0:5678"); empty means no listener
    pub listen: String,

    /// Socket context options
    pub context: SocketContext,

    /// Event callback slots
    pub callbacks: Callbacks,
}

impl Worker {
    /// Name given to workers before a service claims them
    pub const UNNAMED: &'static str = "none";

    /// Creates an unnamed worker with empty callback slots
    pub fn new(listen: impl Into<String>, context: SocketContext) -> Self {
        Self {
            name: Self::UNNAMED.to_string(),
            listen: listen.into(),
            context,
            callbacks: Callbacks::default(),
        }
    }

    /// Reads a numeric socket context option
    pub fn context_u64(&self, key: &str) -> Option<u64> {
        self.context.get(key).and_then(JsonValue::as_u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_new_worker_is_unnamed_and_unbound() {
        let worker = Worker::new("tcp://127.0.0.1:9000", SocketContext::new());
        assert_eq!(worker.name, Worker::UNNAMED);
        assert_eq!(worker.listen, "tcp://127.0.0.1:9000");
        assert!(worker.callbacks.bound().is_empty());
    }

    #[test]
    fn test_set_slot_and_fire() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut worker = Worker::new("", SocketContext::new());

        let hook: WorkerHook = Arc::new(move |_worker: &Worker| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(
            worker
                .callbacks
                .set(HookId::OnStart, Callback::Worker(hook))
                .is_ok()
        );
        assert_eq!(worker.callbacks.bound(), vec![HookId::OnStart]);

        let on_start = worker.callbacks.on_start.clone().unwrap();
        on_start(&worker);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_set_rejects_mismatched_slot() {
        let mut callbacks = Callbacks::default();
        let hook: WorkerHook = Arc::new(|_worker: &Worker| {});

        let rejected = callbacks.set(HookId::OnMessage, Callback::Worker(hook.clone()));
        assert!(matches!(rejected, Err(Callback::Worker(_))));

        let rejected = callbacks.set(HookId::AfterInstantiation, Callback::Worker(hook));
        assert!(rejected.is_err());
        assert!(callbacks.bound().is_empty());
    }

    #[test]
    fn test_context_u64() {
        let mut context = SocketContext::new();
        context.insert("max_send_buffer_size".to_string(), serde_json::json!(1024));
        context.insert("label".to_string(), serde_json::json!("x"));
        let worker = Worker::new("", context);

        assert_eq!(worker.context_u64("max_send_buffer_size"), Some(1024));
        assert_eq!(worker.context_u64("label"), None);
        assert_eq!(worker.context_u64("missing"), None);
    }
}
