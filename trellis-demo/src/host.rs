//! Sample host
//!
//! Declares two services:
//! - `default`: an echo server that also logs a tick counter
//! - `foo` (from `serviceFoo`): a worker with its own tick counter
//!
//! The generic `on*` methods only serve the default service; `foo` gets
//! `onFooStart` and `setFooAfterInstantiate`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{info, warn};
use trellis_core::{Connection, Worker};
use trellis_registrar::{MethodTable, ServiceHost};

pub struct Counter {
    interval: Duration,
    connections: AtomicUsize,
}

impl Counter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            connections: AtomicUsize::new(0),
        }
    }

    fn service_foo(&self) {
        info!("Preparing service foo");
    }

    fn set_foo_after_instantiate(&self, worker: &mut Worker) {
        info!("Worker '{}' created (listen: '{}')", worker.name, worker.listen);
    }

    fn on_start(&self, worker: &Worker) {
        info!("Worker '{}' started", worker.name);
        self.spawn_counter("Default");
    }

    fn on_foo_start(&self, worker: &Worker) {
        info!("Worker '{}' started", worker.name);
        self.spawn_counter("Foo");
    }

    fn on_connect(&self, connection: &dyn Connection) {
        let open = self.connections.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            "Connection {} from {:?} ({} open)",
            connection.id(),
            connection.peer_addr(),
            open
        );
    }

    fn on_message(&self, connection: &dyn Connection, data: &[u8]) {
        if !connection.send(data) {
            warn!("Connection {} dropped an echo", connection.id());
        }
    }

    fn on_close(&self, connection: &dyn Connection) {
        let open = self.connections.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        info!("Connection {} closed ({} open)", connection.id(), open);
    }

    fn on_error(&self, connection: &dyn Connection, code: i32, message: &str) {
        warn!("Connection {} error {}: {}", connection.id(), code, message);
    }

    fn on_stop(&self, worker: &Worker) {
        info!("Worker '{}' stopped", worker.name);
    }

    fn on_reload(&self, worker: &Worker) {
        info!("Worker '{}' reloaded", worker.name);
    }

    fn spawn_counter(&self, label: &'static str) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("{} counter needs a tokio runtime", label);
            return;
        };

        let period = self.interval;
        handle.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            let mut count: u64 = 0;
            loop {
                ticker.tick().await;
                count += 1;
                info!("{}: {}", label, count);
            }
        });
    }
}

impl ServiceHost for Counter {
    fn declare(methods: &mut MethodTable<Self>) {
        methods
            .nullary("serviceFoo", Self::service_foo)
            .worker_setup("setFooAfterInstantiate", Self::set_foo_after_instantiate)
            .worker("onStart", Self::on_start)
            .worker("onFooStart", Self::on_foo_start)
            .connection("onConnect", Self::on_connect)
            .message("onMessage", Self::on_message)
            .connection("onClose", Self::on_close)
            .error("onError", Self::on_error)
            .worker("onStop", Self::on_stop)
            .worker("onReload", Self::on_reload);
    }
}
