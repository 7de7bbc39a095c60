// tests/restart_queue.rs

use std::time::Duration;

use tokio::time::{sleep, Instant};

use rekindle::config::Timings;
use rekindle::engine::{
    coalesce_latest, restart_queue, spawn_restart_worker, RestartRequest,
};
use rekindle::exec::RestartOutcome;
use rekindle_test_utils::{fake_supervisor, init_tracing, test_timings, FakeBehaviour, FakeLauncher};

const PORT: u16 = 39_311;

#[tokio::test]
async fn overflow_drops_the_new_request_and_keeps_the_old_ones() {
    let (queue, mut rx) = restart_queue(2);

    assert!(queue.enqueue(RestartRequest::new("a", PORT)));
    assert!(queue.enqueue(RestartRequest::new("b", PORT)));
    assert_eq!(queue.pending(), 2);
    assert!(!queue.enqueue(RestartRequest::new("c", PORT)));

    assert_eq!(rx.recv().await.unwrap().reason, "a");
    assert_eq!(rx.recv().await.unwrap().reason, "b");
    assert_eq!(queue.pending(), 0);
}

#[tokio::test]
async fn default_capacity_holds_ten_requests() {
    let (queue, _rx) = restart_queue(rekindle::engine::DEFAULT_QUEUE_CAPACITY);
    let accepted = (0..12)
        .filter(|i| queue.enqueue(RestartRequest::new(format!("r{i}"), PORT)))
        .count();
    assert_eq!(accepted, 10);
}

#[tokio::test]
async fn enqueue_after_the_worker_is_gone_is_not_an_error() {
    let (queue, rx) = restart_queue(4);
    drop(rx);
    assert!(!queue.enqueue(RestartRequest::new("late", PORT)));
}

#[tokio::test]
async fn coalescing_keeps_only_the_latest_request() {
    let latest = coalesce_latest(
        RestartRequest::new("A", PORT),
        vec![
            RestartRequest::new("B", PORT),
            RestartRequest::new("C", PORT + 1),
        ],
    );
    assert_eq!(latest.reason, "C");
    assert_eq!(latest.target_port, PORT + 1);

    let (queue, mut rx) = restart_queue(10);
    for reason in ["B", "C"] {
        queue.enqueue(RestartRequest::new(reason, PORT));
    }
    let first = RestartRequest::new("A", PORT);
    assert_eq!(rx.coalesce(first).reason, "C");
}

#[tokio::test(start_paused = true)]
async fn a_burst_within_the_minimum_interval_runs_one_restart_with_the_last_reason() {
    init_tracing();

    let (supervisor, ledger) =
        fake_supervisor(FakeLauncher::new(FakeBehaviour::Healthy), 3, test_timings());
    let seeded = supervisor
        .restart(RestartRequest::new("initial-start", PORT))
        .await;
    assert!(seeded.is_running());
    assert_eq!(ledger.launches(), 1);

    let (queue, rx) = restart_queue(10);
    let _worker = spawn_restart_worker(supervisor.clone(), rx);

    queue.enqueue(RestartRequest::new("A", PORT));
    sleep(Duration::from_millis(100)).await;
    queue.enqueue(RestartRequest::new("B", PORT));
    sleep(Duration::from_millis(50)).await;
    queue.enqueue(RestartRequest::new("C", PORT));

    sleep(Duration::from_secs(10)).await;

    assert_eq!(ledger.launches(), 2, "A, B and C collapse into one restart");
    let status = supervisor.status().await;
    assert_eq!(status.last_reason.as_deref(), Some("C"));
    assert!(matches!(status.last_outcome, Some(RestartOutcome::Running { .. })));
    assert_eq!(ledger.live(), 1);
}

#[tokio::test(start_paused = true)]
async fn the_worker_waits_out_the_minimum_interval() {
    let timings = Timings {
        min_restart_interval: Duration::from_secs(2),
        ..test_timings()
    };
    let (supervisor, ledger) =
        fake_supervisor(FakeLauncher::new(FakeBehaviour::Healthy), 3, timings);
    supervisor
        .restart(RestartRequest::new("initial-start", PORT))
        .await;
    let finished_at = supervisor.last_restart_at().await.unwrap();

    let (queue, rx) = restart_queue(10);
    let _worker = spawn_restart_worker(supervisor.clone(), rx);
    queue.enqueue(RestartRequest::new("change", PORT));

    sleep(Duration::from_millis(1500)).await;
    assert_eq!(ledger.launches(), 1, "still inside the minimum interval");

    sleep(Duration::from_secs(3)).await;
    assert_eq!(ledger.launches(), 2);
    let second = supervisor.last_restart_at().await.unwrap();
    assert!(second - finished_at >= Duration::from_secs(2));
    assert!(Instant::now() >= second);
}

#[tokio::test(start_paused = true)]
async fn the_queue_keeps_processing_after_a_failed_cycle() {
    let launcher = FakeLauncher::new(FakeBehaviour::Healthy)
        .with_script([FakeBehaviour::FailLaunch; 3]);
    let (supervisor, ledger) = fake_supervisor(launcher, 3, test_timings());

    let (queue, rx) = restart_queue(10);
    let _worker = spawn_restart_worker(supervisor.clone(), rx);

    queue.enqueue(RestartRequest::new("first", PORT));
    sleep(Duration::from_secs(5)).await;
    assert_eq!(
        supervisor.status().await.last_outcome,
        Some(RestartOutcome::Exhausted { attempts: 3 })
    );

    queue.enqueue(RestartRequest::new("second", PORT));
    sleep(Duration::from_secs(5)).await;
    assert!(matches!(
        supervisor.status().await.last_outcome,
        Some(RestartOutcome::Running { attempts: 1, .. })
    ));
    assert_eq!(ledger.launches(), 4);
    assert_eq!(ledger.live(), 1);
}
