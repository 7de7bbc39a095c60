// src/engine/runtime.rs

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::engine::queue::{RestartQueue, RestartRequest};
use crate::exec::Supervisor;
use crate::refresh::{send_hot_refresh, Notifier};
use crate::types::{ChangeClass, SignalKind};

/// Events sent into the runtime from the watcher, the console and signals.
///
/// - the watcher (after debouncing) sends `FileChanged`
/// - the console sends `RestartRequested`, `RefreshRequested`,
///   `ProbeRequested` and `StatusRequested`
/// - console `quit` and Ctrl-C handling send `ShutdownRequested`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEvent {
    FileChanged { path: PathBuf, class: ChangeClass },
    RestartRequested { reason: String },
    RefreshRequested { reason: String },
    ProbeRequested,
    StatusRequested,
    ShutdownRequested,
}

/// The main dispatch loop.
///
/// Responsibilities:
/// - Route `Reload` changes and manual reloads into the restart queue.
/// - Fire refresh signals at the currently supervised port without waiting
///   for them.
/// - Answer console probes and status queries.
/// - Stop on `ShutdownRequested`; teardown is left to the caller.
pub struct Runtime {
    supervisor: Arc<Supervisor>,
    queue: RestartQueue,
    notifier: Arc<dyn Notifier>,
    target_port: u16,

    /// Unified event stream from all producers.
    events_rx: mpsc::Receiver<RuntimeEvent>,
}

impl Runtime {
    pub fn new(
        supervisor: Arc<Supervisor>,
        queue: RestartQueue,
        notifier: Arc<dyn Notifier>,
        target_port: u16,
        events_rx: mpsc::Receiver<RuntimeEvent>,
    ) -> Self {
        Self {
            supervisor,
            queue,
            notifier,
            target_port,
            events_rx,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        info!("rekindle runtime started");

        while let Some(event) = self.events_rx.recv().await {
            debug!(?event, "runtime received event");

            match event {
                RuntimeEvent::FileChanged { path, class } => self.handle_file_change(path, class),
                RuntimeEvent::RestartRequested { reason } => {
                    info!(%reason, "restart requested");
                    self.request_restart(reason);
                }
                RuntimeEvent::RefreshRequested { reason } => {
                    info!(%reason, "refresh requested");
                    self.spawn_refresh(reason);
                }
                RuntimeEvent::ProbeRequested => self.probe().await,
                RuntimeEvent::StatusRequested => {
                    println!("{}", self.supervisor.status().await);
                }
                RuntimeEvent::ShutdownRequested => {
                    info!("shutdown requested, stopping runtime");
                    break;
                }
            }
        }

        info!("rekindle runtime exiting");
        Ok(())
    }

    fn handle_file_change(&self, path: PathBuf, class: ChangeClass) {
        match class {
            ChangeClass::Reload => {
                info!(path = ?path, "code change detected; scheduling restart");
                self.request_restart(format!("file change: {}", path.display()));
            }
            ChangeClass::Refresh => {
                info!(path = ?path, "asset change detected; refreshing browser");
                self.spawn_refresh(format!("asset change: {}", path.display()));
            }
            ChangeClass::Ignored => debug!(path = ?path, "ignored change reached runtime"),
        }
    }

    fn request_restart(&self, reason: String) {
        self.queue
            .enqueue(RestartRequest::new(reason, self.target_port));
    }

    /// Fire and forget: the loop never waits on the notifier.
    fn spawn_refresh(&self, reason: String) {
        let supervisor = Arc::clone(&self.supervisor);
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            fire_refresh(&supervisor, notifier.as_ref(), &reason).await;
        });
    }

    async fn probe(&self) {
        let Some(port) = self.supervisor.current_port().await else {
            println!("no server running");
            return;
        };
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            match notifier.signal(port, SignalKind::Test).await {
                Ok(()) => println!("refresh endpoint on port {port} is answering"),
                Err(err) => println!("refresh endpoint on port {port} failed: {err}"),
            }
        });
    }
}

async fn fire_refresh(supervisor: &Supervisor, notifier: &dyn Notifier, reason: &str) {
    match supervisor.current_port().await {
        Some(port) => {
            debug!(port, %reason, "sending hot-refresh");
            send_hot_refresh(notifier, port).await;
        }
        None => debug!(%reason, "no server running; refresh skipped"),
    }
}
