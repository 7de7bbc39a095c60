// tests/teardown.rs
//
// Teardown in the order the binary runs it: worker and health monitor
// spawned, a shutdown arrives, then `teardown`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};

use rekindle::engine::{
    restart_queue, spawn_health_monitor, spawn_restart_worker, teardown, RestartRequest, Runtime,
    RuntimeEvent,
};
use rekindle::errors::Result;
use rekindle::exec::{BoxFuture, PreflightCheck, RestartOutcome, StdoutReadiness, Supervisor};
use rekindle::refresh::Notifier;
use rekindle_test_utils::{
    fake_supervisor, init_tracing, test_timings, FakeBehaviour, FakeLauncher, RecordingNotifier,
};

const PORT: u16 = 39_711;

/// A preflight that never finishes, like a compiler stuck on a lock.
struct StuckPreflight;

impl PreflightCheck for StuckPreflight {
    fn check(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(std::future::pending())
    }
}

#[tokio::test(start_paused = true)]
async fn teardown_stops_a_server_stuck_in_its_startup_wait() {
    init_tracing();
    let (supervisor, ledger) =
        fake_supervisor(FakeLauncher::new(FakeBehaviour::NeverReady), 3, test_timings());

    let (queue, requests) = restart_queue(10);
    queue.enqueue(RestartRequest::new("initial-start", PORT));
    let tasks = vec![
        spawn_restart_worker(Arc::clone(&supervisor), requests),
        spawn_health_monitor(
            Arc::clone(&supervisor),
            queue.clone(),
            Duration::from_secs(30),
            PORT,
        ),
    ];

    sleep(Duration::from_secs(1)).await;
    assert_eq!(ledger.launches(), 1);
    assert_eq!(ledger.live(), 1, "server is waiting to become ready");

    let started = Instant::now();
    teardown(&supervisor, tasks).await;

    assert!(started.elapsed() < test_timings().startup_timeout);
    assert_eq!(ledger.live(), 0, "no server may outlive the teardown");
    assert!(ledger.interrupts() + ledger.kills() >= 1);
    assert_eq!(ledger.launches(), 1);
    assert!(!supervisor.status().await.running);
}

#[tokio::test(start_paused = true)]
async fn shutdown_event_during_the_initial_start_leaves_nothing_running() {
    let launcher =
        FakeLauncher::new(FakeBehaviour::Healthy).with_launch_delay(Duration::from_secs(1));
    let (supervisor, ledger) = fake_supervisor(launcher, 3, test_timings());

    let (rt_tx, rt_rx) = mpsc::channel(16);
    let (queue, requests) = restart_queue(10);
    queue.enqueue(RestartRequest::new("initial-start", PORT));
    let tasks = vec![spawn_restart_worker(Arc::clone(&supervisor), requests)];

    let notifier: Arc<dyn Notifier> = Arc::new(RecordingNotifier::new());
    let runtime = tokio::spawn(
        Runtime::new(Arc::clone(&supervisor), queue, notifier, PORT, rt_rx).run(),
    );

    // Ctrl-C arrives while the first launch is still in flight.
    sleep(Duration::from_millis(500)).await;
    rt_tx.send(RuntimeEvent::ShutdownRequested).await.unwrap();
    runtime.await.unwrap().unwrap();

    teardown(&supervisor, tasks).await;

    assert_eq!(ledger.live(), 0);
    assert_eq!(ledger.max_live(), 1);
    assert!(!supervisor.status().await.running);
}

#[tokio::test(start_paused = true)]
async fn shutdown_abandons_a_stuck_preflight() {
    let launcher = FakeLauncher::new(FakeBehaviour::Healthy);
    let ledger = launcher.ledger();
    let supervisor = Arc::new(
        Supervisor::new(
            Arc::new(launcher),
            Arc::new(StdoutReadiness),
            3,
            test_timings(),
        )
        .with_preflight(Arc::new(StuckPreflight)),
    );

    let restarting = {
        let supervisor = Arc::clone(&supervisor);
        tokio::spawn(async move {
            supervisor
                .restart(RestartRequest::new("initial-start", PORT))
                .await
        })
    };
    sleep(Duration::from_secs(1)).await;
    assert!(supervisor.is_restarting());

    supervisor.shutdown().await;

    assert_eq!(restarting.await.unwrap(), RestartOutcome::Skipped);
    assert!(!supervisor.is_restarting());
    assert_eq!(ledger.launches(), 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_waits_for_the_cycle_that_is_installing_a_server() {
    // Shutdown lands right as the launch completes; whichever side wins,
    // the new server must not survive.
    for offset_ms in [999, 1000, 1001] {
        let launcher =
            FakeLauncher::new(FakeBehaviour::Healthy).with_launch_delay(Duration::from_secs(1));
        let (supervisor, ledger) = fake_supervisor(launcher, 3, test_timings());

        let restarting = {
            let supervisor = Arc::clone(&supervisor);
            tokio::spawn(async move {
                supervisor
                    .restart(RestartRequest::new("initial-start", PORT))
                    .await
            })
        };
        sleep(Duration::from_millis(offset_ms)).await;
        supervisor.shutdown().await;
        restarting.await.unwrap();

        assert_eq!(ledger.live(), 0, "offset {offset_ms}ms");
        assert_eq!(supervisor.current_port().await, None, "offset {offset_ms}ms");
    }
}
