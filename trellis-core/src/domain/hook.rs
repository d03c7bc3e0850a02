//! Lifecycle hooks
//!
//! Every point in a worker's life where a host method may run. Each hook has a
//! generic method name (used as a fallback by the default service) and a
//! qualified name per service, formed by inserting the capitalized service
//! name after the hook's fixed prefix:
//!
//! | hook | generic | service `foo` |
//! |------|---------|---------------|
//! | `BeforeInstantiation` | `service` | `serviceFoo` |
//! | `AfterInstantiation` | `setAfterInstantiate` | `setFooAfterInstantiate` |
//! | `OnStart` | `onStart` | `onFooStart` |
//! | `OnConnect` | `onConnect` | `onFooConnect` |
//! | `OnMessage` | `onMessage` | `onFooMessage` |
//! | `OnClose` | `onClose` | `onFooClose` |
//! | `OnError` | `onError` | `onFooError` |
//! | `OnBufferFull` | `onBufferFull` | `onFooBufferFull` |
//! | `OnBufferDrain` | `onBufferDrain` | `onFooBufferDrain` |
//! | `OnStop` | `onStop` | `onFooStop` |
//! | `OnReload` | `onReload` | `onFooReload` |
//!
//! `BeforeInstantiation` uses the configured service prefix instead of a fixed one.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::naming::upper_first;

/// Lifecycle hook identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookId {
    BeforeInstantiation,
    AfterInstantiation,
    OnStart,
    OnConnect,
    OnMessage,
    OnClose,
    OnError,
    OnBufferFull,
    OnBufferDrain,
    OnStop,
    OnReload,
}

/// Argument shape a hook handler accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signature {
    /// No arguments
    Nullary,
    /// Mutable access to a worker that is not running yet
    WorkerSetup,
    /// A running worker
    Worker,
    /// A client connection
    Connection,
    /// A client connection and the received payload
    Message,
    /// A client connection, an error code and a message
    Error,
}

impl HookId {
    /// All hooks, setup hooks first
    pub const ALL: [HookId; 11] = [
        HookId::BeforeInstantiation,
        HookId::AfterInstantiation,
        HookId::OnStart,
        HookId::OnConnect,
        HookId::OnMessage,
        HookId::OnClose,
        HookId::OnError,
        HookId::OnBufferFull,
        HookId::OnBufferDrain,
        HookId::OnStop,
        HookId::OnReload,
    ];

    /// Hooks fired by the worker runtime, one callback slot each
    pub const EVENTS: [HookId; 9] = [
        HookId::OnStart,
        HookId::OnConnect,
        HookId::OnMessage,
        HookId::OnClose,
        HookId::OnError,
        HookId::OnBufferFull,
        HookId::OnBufferDrain,
        HookId::OnStop,
        HookId::OnReload,
    ];

    /// Returns true for hooks stored in a worker callback slot
    pub fn is_event(self) -> bool {
        !matches!(
            self,
            HookId::BeforeInstantiation | HookId::AfterInstantiation
        )
    }

    /// The handler signature this hook is invoked with
    pub fn signature(self) -> Signature {
        match self {
            HookId::BeforeInstantiation => Signature::Nullary,
            HookId::AfterInstantiation => Signature::WorkerSetup,
            HookId::OnStart | HookId::OnStop | HookId::OnReload => Signature::Worker,
            HookId::OnConnect | HookId::OnClose | HookId::OnBufferFull | HookId::OnBufferDrain => {
                Signature::Connection
            }
            HookId::OnMessage => Signature::Message,
            HookId::OnError => Signature::Error,
        }
    }

    /// Fixed prefix and suffix around the service name; `None` means the
    /// configured service prefix with no suffix
    fn affixes(self) -> Option<(&'static str, &'static str)> {
        match self {
            HookId::BeforeInstantiation => None,
            HookId::AfterInstantiation => Some(("set", "AfterInstantiate")),
            HookId::OnStart => Some(("on", "Start")),
            HookId::OnConnect => Some(("on", "Connect")),
            HookId::OnMessage => Some(("on", "Message")),
            HookId::OnClose => Some(("on", "Close")),
            HookId::OnError => Some(("on", "Error")),
            HookId::OnBufferFull => Some(("on", "BufferFull")),
            HookId::OnBufferDrain => Some(("on", "BufferDrain")),
            HookId::OnStop => Some(("on", "Stop")),
            HookId::OnReload => Some(("on", "Reload")),
        }
    }

    /// Shared method name used by the default service (e.g. `onStart`)
    pub fn generic_name(self, service_prefix: &str) -> String {
        match self.affixes() {
            Some((prefix, suffix)) => format!("{prefix}{suffix}"),
            None => service_prefix.to_string(),
        }
    }

    /// Service-specific method name (e.g. `onFooStart` for service `foo`)
    pub fn qualified_name(self, service: &str, service_prefix: &str) -> String {
        let (prefix, suffix) = match self.affixes() {
            Some(affixes) => affixes,
            None => (service_prefix, ""),
        };
        format!("{prefix}{}{suffix}", upper_first(service))
    }
}

impl fmt::Display for HookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HookId::BeforeInstantiation => "before_instantiation",
            HookId::AfterInstantiation => "after_instantiation",
            HookId::OnStart => "on_start",
            HookId::OnConnect => "on_connect",
            HookId::OnMessage => "on_message",
            HookId::OnClose => "on_close",
            HookId::OnError => "on_error",
            HookId::OnBufferFull => "on_buffer_full",
            HookId::OnBufferDrain => "on_buffer_drain",
            HookId::OnStop => "on_stop",
            HookId::OnReload => "on_reload",
        };
        f.write_str(label)
    }
}
