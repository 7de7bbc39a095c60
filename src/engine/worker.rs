// src/engine/worker.rs

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::engine::queue::RestartReceiver;
use crate::exec::Supervisor;

/// Spawn the single consumer of the restart queue.
///
/// For every request it:
/// 1. waits out the rest of the minimum interval since the last finished
///    restart,
/// 2. coalesces whatever arrived meanwhile, keeping the latest request,
/// 3. runs one restart cycle.
///
/// Requests are processed strictly one at a time; a request arriving
/// mid-cycle waits for the next iteration.
pub fn spawn_restart_worker(
    supervisor: Arc<Supervisor>,
    mut requests: RestartReceiver,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let min_interval = supervisor.timings().min_restart_interval;

        while let Some(first) = requests.recv().await {
            if let Some(last) = supervisor.last_restart_at().await {
                let ready_at = last + min_interval;
                let now = Instant::now();
                if now < ready_at {
                    debug!(
                        wait = ?(ready_at - now),
                        reason = %first.reason,
                        "enforcing minimum interval between restarts"
                    );
                    sleep_until(ready_at).await;
                }
            }

            let request = requests.coalesce(first);
            let outcome = supervisor.restart(request).await;
            debug!(%outcome, "restart request processed");
        }

        info!("restart queue closed; worker exiting");
    })
}

/// Stop the server, then the background tasks.
///
/// The supervisor goes first: an in-flight cycle on the worker notices the
/// shutdown, stops what it launched and returns, so aborting the worker
/// afterwards cannot drop a live process.
pub async fn teardown(supervisor: &Supervisor, tasks: Vec<JoinHandle<()>>) {
    supervisor.shutdown().await;

    for task in &tasks {
        task.abort();
    }
    for task in tasks {
        match task.await {
            Err(err) if err.is_panic() => warn!(error = %err, "background task panicked"),
            _ => {}
        }
    }
}
