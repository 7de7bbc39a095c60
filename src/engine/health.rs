// src/engine/health.rs

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::engine::queue::{RestartQueue, RestartRequest};
use crate::exec::{Liveness, Supervisor};

/// Reason attached to restarts raised by the health monitor.
pub const HEALTH_FAILURE_REASON: &str = "health-check-failure";

/// Probe the supervised process once; enqueue a restart if it is gone.
pub async fn check_once(
    supervisor: &Supervisor,
    queue: &RestartQueue,
    target_port: u16,
) -> Liveness {
    let liveness = supervisor.probe_liveness().await;
    match liveness {
        Liveness::Alive => debug!("health check: server alive"),
        Liveness::Dead => {
            warn!("health check failed: server process is gone; requesting restart");
            queue.enqueue(RestartRequest::new(HEALTH_FAILURE_REASON, target_port));
        }
        Liveness::NoProcess => debug!("health check: no server process"),
        Liveness::Busy => debug!("health check skipped: restart in progress"),
    }
    liveness
}

/// Spawn the fixed-interval health monitor. The first probe runs one
/// `period` after spawning.
pub fn spawn_health_monitor(
    supervisor: Arc<Supervisor>,
    queue: RestartQueue,
    period: Duration,
    target_port: u16,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            check_once(&supervisor, &queue, target_port).await;
        }
    })
}
