// src/engine/queue.rs

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Default bound of the restart queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// A request to run one restart cycle.
///
/// Created by whoever wants a restart (file change, health monitor, console)
/// and consumed exactly once by the restart worker; never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartRequest {
    pub reason: String,
    pub requested_at: Instant,
    /// Normalized desired port (no leading `:`).
    pub target_port: u16,
}

impl RestartRequest {
    pub fn new(reason: impl Into<String>, target_port: u16) -> Self {
        Self {
            reason: reason.into(),
            requested_at: Instant::now(),
            target_port,
        }
    }
}

/// Producer side of the bounded restart queue. Cheap to clone.
///
/// Enqueueing never blocks: when the queue is full the *new* request is
/// dropped and logged, so requests already waiting are preserved.
#[derive(Debug, Clone)]
pub struct RestartQueue {
    tx: mpsc::Sender<RestartRequest>,
}

/// Consumer side, owned by the restart worker.
#[derive(Debug)]
pub struct RestartReceiver {
    rx: mpsc::Receiver<RestartRequest>,
}

/// Create a restart queue holding at most `capacity` pending requests.
///
/// `capacity` is clamped to at least 1.
pub fn restart_queue(capacity: usize) -> (RestartQueue, RestartReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (RestartQueue { tx }, RestartReceiver { rx })
}

impl RestartQueue {
    /// Enqueue `request`; returns `false` if it was dropped.
    pub fn enqueue(&self, request: RestartRequest) -> bool {
        match self.tx.try_send(request) {
            Ok(()) => true,
            Err(TrySendError::Full(request)) => {
                warn!(
                    reason = %request.reason,
                    "restart queue full; dropping restart request"
                );
                false
            }
            Err(TrySendError::Closed(request)) => {
                debug!(reason = %request.reason, "restart worker gone; request discarded");
                false
            }
        }
    }

    /// Number of requests waiting to be processed.
    pub fn pending(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

impl RestartReceiver {
    /// Wait for the next request; `None` once every producer is gone.
    pub async fn recv(&mut self) -> Option<RestartRequest> {
        self.rx.recv().await
    }

    /// Take everything already queued and keep only the most recent request.
    ///
    /// Superseded reasons are logged.
    pub fn coalesce(&mut self, first: RestartRequest) -> RestartRequest {
        let mut rest = Vec::new();
        while let Ok(request) = self.rx.try_recv() {
            rest.push(request);
        }
        coalesce_latest(first, rest)
    }
}

/// Last-wins coalescing of a batch of requests.
pub fn coalesce_latest(
    first: RestartRequest,
    rest: impl IntoIterator<Item = RestartRequest>,
) -> RestartRequest {
    let mut latest = first;
    for next in rest {
        info!(
            superseded = %latest.reason,
            by = %next.reason,
            "coalescing restart requests"
        );
        latest = next;
    }
    latest
}
