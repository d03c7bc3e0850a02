//! Tokio worker runtime
//!
//! Binds every worker's listener up front, writes the startup table, then
//! runs each worker as its own task until stopped (ctrl-c, SIGTERM or
//! `stop_all`). SIGHUP fires every worker's reload hook.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;
use tracing::{error, info};
use trellis_core::{RuntimeError, Worker, WorkerRuntime};

use crate::listen::{ListenAddress, Transport};
use crate::log::{BannerRow, RuntimeLog, write_banner};
use crate::worker::{WorkerEnv, serve_worker};

/// Stops a running `TokioRuntime` from another thread or task
#[derive(Clone)]
pub struct StopHandle {
    stop: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }
}

/// Runs workers on a multi-threaded tokio runtime
pub struct TokioRuntime {
    stdout_file: Option<PathBuf>,
    log_file: Option<PathBuf>,
    stop: Arc<watch::Sender<bool>>,
    reload: broadcast::Sender<()>,
    handle_signals: bool,
    addresses: Arc<Mutex<HashMap<String, SocketAddr>>>,
    next_id: Arc<AtomicU64>,
}

impl TokioRuntime {
    pub fn new() -> Self {
        let (stop, _) = watch::channel(false);
        let (reload, _) = broadcast::channel(16);
        Self {
            stdout_file: None,
            log_file: None,
            stop: Arc::new(stop),
            reload,
            handle_signals: true,
            addresses: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Disables process signal handling (ctrl-c, SIGTERM, SIGHUP)
    pub fn without_signals(mut self) -> Self {
        self.handle_signals = false;
        self
    }

    pub fn stdout_file(&self) -> Option<&Path> {
        self.stdout_file.as_deref()
    }

    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            stop: Arc::clone(&self.stop),
        }
    }

    /// Fires the reload hook of every running worker
    pub fn reload_all(&self) {
        let _ = self.reload.send(());
    }

    /// Address a worker's listener is bound to, once serving
    pub fn local_addr(&self, worker: &str) -> Option<SocketAddr> {
        self.addresses
            .lock()
            .ok()
            .and_then(|addresses| addresses.get(worker).copied())
    }

    /// Serves workers on the current tokio runtime until stopped
    ///
    /// # Errors
    /// Fails before any worker starts if a listen address is invalid or a
    /// listener cannot be bound
    pub async fn serve(&self, workers: Vec<Worker>) -> Result<(), RuntimeError> {
        let log = Arc::new(RuntimeLog::open(self.log_file.as_deref())?);

        let mut bound: Vec<(Arc<Worker>, Option<(TcpListener, Transport)>)> = Vec::new();
        for worker in workers {
            let listener = match ListenAddress::parse(&worker.listen)? {
                Some(listen) => {
                    let listener = TcpListener::bind(&listen.address).await.map_err(|source| {
                        RuntimeError::Bind {
                            worker: worker.name.clone(),
                            address: listen.address.clone(),
                            source,
                        }
                    })?;
                    let local = listener.local_addr()?;
                    if let Ok(mut addresses) = self.addresses.lock() {
                        addresses.insert(worker.name.clone(), local);
                    }
                    log.write(&format!(
                        "Worker '{}' listening on {} ({})",
                        worker.name, listen, local
                    ));
                    Some((listener, listen.transport))
                }
                None => None,
            };
            bound.push((Arc::new(worker), listener));
        }

        let rows: Vec<BannerRow<'_>> = bound
            .iter()
            .map(|(worker, _)| BannerRow {
                worker: &worker.name,
                listen: &worker.listen,
                status: "ok",
            })
            .collect();
        write_banner(self.stdout_file.as_deref(), &rows)?;
        drop(rows);

        if self.handle_signals {
            tokio::spawn(watch_signals(self.stop_handle(), self.reload.clone()));
        }

        let env = WorkerEnv {
            stop: self.stop.subscribe(),
            reload: self.reload.clone(),
            next_id: Arc::clone(&self.next_id),
            log: Arc::clone(&log),
        };

        let mut tasks = JoinSet::new();
        for (worker, listener) in bound {
            tasks.spawn(serve_worker(worker, listener, env.clone()));
        }
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!("Worker task failed: {}", e);
            }
        }

        log.write("All workers stopped");
        Ok(())
    }
}

impl Default for TokioRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerRuntime for TokioRuntime {
    fn set_stdout_file(&mut self, path: &Path) {
        self.stdout_file = Some(path.to_path_buf());
    }

    fn set_log_file(&mut self, path: &Path) {
        self.log_file = Some(path.to_path_buf());
    }

    fn run_all(&mut self, workers: Vec<Worker>) -> Result<(), RuntimeError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| RuntimeError::Startup(e.to_string()))?;

        info!("Starting {} worker(s)", workers.len());
        runtime.block_on(self.serve(workers))
    }

    fn stop_all(&self) {
        self.stop.send_replace(true);
    }
}

#[cfg(unix)]
async fn watch_signals(stop: StopHandle, reload: broadcast::Sender<()>) {
    use tokio::signal::unix::{SignalKind, signal};

    let (mut terminate, mut hangup) =
        match (signal(SignalKind::terminate()), signal(SignalKind::hangup())) {
            (Ok(terminate), Ok(hangup)) => (terminate, hangup),
            (Err(e), _) | (_, Err(e)) => {
                error!("Failed to install signal handlers: {}", e);
                return;
            }
        };

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received ctrl-c, stopping workers");
                stop.stop();
                break;
            }
            _ = terminate.recv() => {
                info!("Received SIGTERM, stopping workers");
                stop.stop();
                break;
            }
            _ = hangup.recv() => {
                info!("Received SIGHUP, reloading workers");
                let _ = reload.send(());
            }
        }
    }
}

#[cfg(not(unix))]
async fn watch_signals(stop: StopHandle, _reload: broadcast::Sender<()>) {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Received ctrl-c, stopping workers");
        stop.stop();
    }
}
