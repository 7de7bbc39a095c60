// src/watch/debounce.rs

//! Single-timer debouncing of classified changes.
//!
//! There is one timer per watcher, not one per file: every change re-arms it
//! to fire `window` after the latest change, and only the latest change is
//! dispatched when it fires.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace};

use crate::engine::RuntimeEvent;
use crate::types::{ChangeClass, WatchEvent};

/// A filtered change together with the class it was given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedChange {
    pub event: WatchEvent,
    pub class: ChangeClass,
}

/// Pure debounce state; the caller supplies the clock.
#[derive(Debug)]
pub struct Debouncer<T> {
    window: Duration,
    pending: Option<T>,
    deadline: Option<Instant>,
    superseded: usize,
}

impl<T> Debouncer<T> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
            deadline: None,
            superseded: 0,
        }
    }

    /// Record `item` at `now`, replacing any pending item and re-arming the
    /// timer. Returns `true` if a pending item was replaced.
    pub fn push(&mut self, item: T, now: Instant) -> bool {
        let replaced = self.pending.replace(item).is_some();
        if replaced {
            self.superseded += 1;
        }
        self.deadline = Some(now + self.window);
        replaced
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Take the pending item if its deadline has passed at `now`.
    ///
    /// Also returns how many earlier items it superseded.
    pub fn take_due(&mut self, now: Instant) -> Option<(T, usize)> {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                let superseded = std::mem::take(&mut self.superseded);
                self.pending.take().map(|item| (item, superseded))
            }
            _ => None,
        }
    }
}

/// Spawn the debounce task.
///
/// Consumes classified changes from `changes_rx` and sends one
/// `RuntimeEvent::FileChanged` per quiet period to `runtime_tx`. A change
/// still pending when the input closes is discarded.
pub fn spawn_debouncer(
    window: Duration,
    mut changes_rx: mpsc::Receiver<ClassifiedChange>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut debouncer = Debouncer::new(window);

        loop {
            let deadline = debouncer.deadline();

            tokio::select! {
                maybe = changes_rx.recv() => {
                    let Some(change) = maybe else {
                        if debouncer.is_pending() {
                            debug!("watch input closed; discarding pending change");
                        }
                        break;
                    };
                    trace!(path = ?change.event.path, class = %change.class, "debounce re-armed");
                    debouncer.push(change, Instant::now());
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    let Some((change, superseded)) = debouncer.take_due(Instant::now()) else {
                        continue;
                    };

                    debug!(
                        path = ?change.event.path,
                        kind = ?change.event.kind,
                        class = %change.class,
                        superseded,
                        "debounced change fired"
                    );

                    let event = RuntimeEvent::FileChanged {
                        path: change.event.path,
                        class: change.class,
                    };
                    if runtime_tx.send(event).await.is_err() {
                        debug!("runtime channel closed; debouncer exiting");
                        break;
                    }
                }
            }
        }
    })
}
