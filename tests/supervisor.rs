// tests/supervisor.rs

use std::net::{Ipv4Addr, TcpListener};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};

use rekindle::engine::RestartRequest;
use rekindle::exec::{Liveness, RestartOutcome, StdoutReadiness, Supervisor};
use rekindle_test_utils::{
    fake_supervisor, init_tracing, test_timings, FakeBehaviour, FakeLauncher, FakePreflight,
};

const PORT: u16 = 39_411;

fn request(reason: &str) -> RestartRequest {
    RestartRequest::new(reason, PORT)
}

fn with_preflight(
    launcher: FakeLauncher,
    preflight: Arc<FakePreflight>,
) -> (Arc<Supervisor>, Arc<rekindle_test_utils::ProcessLedger>) {
    let ledger = launcher.ledger();
    let supervisor = Supervisor::new(
        Arc::new(launcher),
        Arc::new(StdoutReadiness),
        3,
        test_timings(),
    )
    .with_preflight(preflight);
    (Arc::new(supervisor), ledger)
}

#[tokio::test(start_paused = true)]
async fn healthy_start_installs_one_process() {
    init_tracing();
    let (supervisor, ledger) =
        fake_supervisor(FakeLauncher::new(FakeBehaviour::Healthy), 3, test_timings());

    assert_eq!(supervisor.probe_liveness().await, Liveness::NoProcess);

    let outcome = supervisor.restart(request("initial-start")).await;
    let RestartOutcome::Running { port, attempts } = outcome else {
        panic!("expected Running, got {outcome:?}");
    };
    assert_eq!(attempts, 1);
    assert_eq!(ledger.ports(), vec![port]);
    assert_eq!(ledger.live(), 1);

    let status = supervisor.status().await;
    assert_eq!(status.port, Some(port));
    assert!(status.running);
    assert!(status.pid.is_some());
    assert!(!status.restart_in_progress);
    assert_eq!(supervisor.current_port().await, Some(port));
    assert_eq!(supervisor.probe_liveness().await, Liveness::Alive);
}

#[tokio::test(start_paused = true)]
async fn restart_stops_the_old_process_before_starting_the_new_one() {
    let (supervisor, ledger) =
        fake_supervisor(FakeLauncher::new(FakeBehaviour::Healthy), 3, test_timings());

    for i in 0..4 {
        let outcome = supervisor.restart(request(&format!("change {i}"))).await;
        assert!(outcome.is_running(), "{outcome:?}");
        assert_eq!(ledger.live(), 1);
    }

    assert_eq!(ledger.launches(), 4);
    assert_eq!(ledger.interrupts(), 3);
    assert_eq!(ledger.kills(), 0);
    assert_eq!(ledger.max_live(), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_restart_is_skipped_not_interleaved() {
    let launcher =
        FakeLauncher::new(FakeBehaviour::Healthy).with_launch_delay(Duration::from_secs(1));
    let (supervisor, ledger) = fake_supervisor(launcher, 3, test_timings());
    supervisor.restart(request("initial-start")).await;

    let (a, b) = tokio::join!(
        supervisor.restart(request("first")),
        supervisor.restart(request("second")),
    );

    let outcomes = [a, b];
    assert_eq!(
        outcomes
            .iter()
            .filter(|o| **o == RestartOutcome::Skipped)
            .count(),
        1,
        "{outcomes:?}"
    );
    assert_eq!(outcomes.iter().filter(|o| o.is_running()).count(), 1);
    assert_eq!(ledger.max_live(), 1);
    assert_eq!(ledger.live(), 1);
    assert_eq!(ledger.launches(), 2);
}

#[tokio::test(start_paused = true)]
async fn restarts_from_many_tasks_never_overlap() {
    let launcher =
        FakeLauncher::new(FakeBehaviour::Healthy).with_launch_delay(Duration::from_millis(300));
    let (supervisor, ledger) = fake_supervisor(launcher, 3, test_timings());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let supervisor = Arc::clone(&supervisor);
            tokio::spawn(async move {
                sleep(Duration::from_millis(100 * i)).await;
                supervisor.restart(request(&format!("task {i}"))).await
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(ledger.max_live(), 1);
    assert_eq!(ledger.live(), 1);
    assert!(supervisor.status().await.running);
}

#[tokio::test(start_paused = true)]
async fn never_ready_server_gets_exactly_three_attempts() {
    let (supervisor, ledger) =
        fake_supervisor(FakeLauncher::new(FakeBehaviour::NeverReady), 3, test_timings());

    let started = Instant::now();
    let outcome = supervisor.restart(request("change")).await;

    assert_eq!(outcome, RestartOutcome::Exhausted { attempts: 3 });
    assert_eq!(ledger.launches(), 3);
    assert_eq!(ledger.live(), 0, "half-started processes are stopped");
    assert!(started.elapsed() >= Duration::from_secs(30));

    let status = supervisor.status().await;
    assert!(!status.running);
    assert_eq!(status.port, None);
    assert_eq!(status.last_outcome, Some(RestartOutcome::Exhausted { attempts: 3 }));
}

#[tokio::test(start_paused = true)]
async fn launch_failures_count_as_attempts() {
    let (supervisor, ledger) =
        fake_supervisor(FakeLauncher::new(FakeBehaviour::FailLaunch), 3, test_timings());

    let outcome = supervisor.restart(request("change")).await;

    assert_eq!(outcome, RestartOutcome::Exhausted { attempts: 3 });
    assert_eq!(ledger.launches(), 3);
    assert_eq!(ledger.max_live(), 0);
}

#[tokio::test(start_paused = true)]
async fn a_crash_during_startup_gets_one_extra_pass() {
    let launcher = FakeLauncher::new(FakeBehaviour::Healthy)
        .with_script([FakeBehaviour::NeverReady, FakeBehaviour::CrashOnStart]);
    let (supervisor, ledger) = fake_supervisor(launcher, 3, test_timings());

    let outcome = supervisor.restart(request("change")).await;

    assert!(
        matches!(outcome, RestartOutcome::Running { attempts: 3, .. }),
        "{outcome:?}"
    );
    assert_eq!(ledger.launches(), 3);
    assert_eq!(ledger.live(), 1);
}

#[tokio::test(start_paused = true)]
async fn repeated_crashes_do_not_loop_forever() {
    let (supervisor, ledger) =
        fake_supervisor(FakeLauncher::new(FakeBehaviour::CrashOnStart), 3, test_timings());

    let outcome = supervisor.restart(request("change")).await;

    // One attempt per pass: the crash ends the pass, one extra pass follows.
    assert_eq!(outcome, RestartOutcome::Exhausted { attempts: 2 });
    assert_eq!(ledger.launches(), 2);
    assert_eq!(ledger.live(), 0);
}

#[tokio::test(start_paused = true)]
async fn the_extra_pass_has_the_same_cap() {
    let launcher =
        FakeLauncher::new(FakeBehaviour::NeverReady).with_script([FakeBehaviour::CrashOnStart]);
    let (supervisor, ledger) = fake_supervisor(launcher, 3, test_timings());

    let outcome = supervisor.restart(request("change")).await;

    assert_eq!(outcome, RestartOutcome::Exhausted { attempts: 4 });
    assert_eq!(ledger.launches(), 4);
}

#[tokio::test(start_paused = true)]
async fn failing_preflight_never_starts_and_leaves_old_process_stopped() {
    let preflight = Arc::new(FakePreflight::new(true));
    let (supervisor, ledger) =
        with_preflight(FakeLauncher::new(FakeBehaviour::Healthy), preflight.clone());

    assert!(supervisor.restart(request("initial-start")).await.is_running());
    assert_eq!(ledger.live(), 1);

    preflight.set_passing(false);
    sleep(Duration::from_secs(6)).await; // past the preflight cache

    let outcome = supervisor.restart(request("broken change")).await;

    let RestartOutcome::PreflightFailed { message } = outcome else {
        panic!("expected PreflightFailed, got {outcome:?}");
    };
    assert!(message.contains("undefined: foo"), "{message}");
    assert_eq!(ledger.launches(), 1, "Starting must not be entered");
    assert_eq!(ledger.live(), 0, "old process is fully stopped");

    let status = supervisor.status().await;
    assert!(!status.running);
    assert_eq!(status.port, None);
    assert!(!status.build_in_progress);
    assert_eq!(supervisor.probe_liveness().await, Liveness::NoProcess);

    // Fixing the build brings the server back.
    preflight.set_passing(true);
    assert!(supervisor.restart(request("fixed")).await.is_running());
    assert_eq!(ledger.live(), 1);
}

#[tokio::test(start_paused = true)]
async fn a_recent_successful_preflight_is_reused() {
    let preflight = Arc::new(FakePreflight::new(true));
    let (supervisor, _ledger) =
        with_preflight(FakeLauncher::new(FakeBehaviour::Healthy), preflight.clone());

    supervisor.restart(request("one")).await;
    supervisor.restart(request("two")).await;
    assert_eq!(preflight.calls(), 1, "second check within 5s is skipped");

    sleep(Duration::from_secs(6)).await;
    supervisor.restart(request("three")).await;
    assert_eq!(preflight.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn a_failed_preflight_is_not_cached() {
    let preflight = Arc::new(FakePreflight::new(false));
    let (supervisor, ledger) =
        with_preflight(FakeLauncher::new(FakeBehaviour::Healthy), preflight.clone());

    assert!(matches!(
        supervisor.restart(request("one")).await,
        RestartOutcome::PreflightFailed { .. }
    ));
    preflight.set_passing(true);
    assert!(supervisor.restart(request("two")).await.is_running());
    assert_eq!(preflight.calls(), 2);
    assert_eq!(ledger.launches(), 1);
}

#[tokio::test(start_paused = true)]
async fn a_process_ignoring_the_interrupt_is_killed_after_the_stop_timeout() {
    let launcher = FakeLauncher::new(FakeBehaviour::Healthy)
        .with_script([FakeBehaviour::IgnoreInterrupt]);
    let (supervisor, ledger) = fake_supervisor(launcher, 3, test_timings());
    supervisor.restart(request("initial-start")).await;

    let started = Instant::now();
    let outcome = supervisor.restart(request("change")).await;

    assert!(outcome.is_running());
    assert_eq!(ledger.interrupts(), 1);
    assert_eq!(ledger.kills(), 1);
    assert!(started.elapsed() >= Duration::from_secs(5));
    assert_eq!(ledger.max_live(), 1);
}

#[tokio::test(start_paused = true)]
async fn occupied_port_falls_back_to_a_nearby_one() {
    let blocker = TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0)).unwrap();
    let busy = blocker.local_addr().unwrap().port();

    let (supervisor, _ledger) =
        fake_supervisor(FakeLauncher::new(FakeBehaviour::Healthy), 3, test_timings());
    let outcome = supervisor
        .restart(RestartRequest::new("change", busy))
        .await;

    let RestartOutcome::Running { port, .. } = outcome else {
        panic!("expected Running, got {outcome:?}");
    };
    assert_ne!(port, busy);
    assert!((port as i32 - busy as i32).abs() <= 10, "{port} vs {busy}");
}

#[tokio::test(start_paused = true)]
async fn a_free_desired_port_is_kept() {
    let free = {
        let probe = TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0)).unwrap();
        probe.local_addr().unwrap().port()
    };

    let (supervisor, _ledger) =
        fake_supervisor(FakeLauncher::new(FakeBehaviour::Healthy), 3, test_timings());
    let outcome = supervisor.restart(RestartRequest::new("change", free)).await;

    assert_eq!(outcome, RestartOutcome::Running { port: free, attempts: 1 });
}

#[tokio::test(start_paused = true)]
async fn liveness_probe_notices_a_dead_process() {
    let (supervisor, ledger) =
        fake_supervisor(FakeLauncher::new(FakeBehaviour::Healthy), 3, test_timings());
    supervisor.restart(request("initial-start")).await;

    ledger.crash_latest();

    assert_eq!(supervisor.probe_liveness().await, Liveness::Dead);
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_the_server_and_rejects_later_restarts() {
    let (supervisor, ledger) =
        fake_supervisor(FakeLauncher::new(FakeBehaviour::Healthy), 3, test_timings());
    supervisor.restart(request("initial-start")).await;

    supervisor.shutdown().await;

    assert_eq!(ledger.live(), 0);
    let status = supervisor.status().await;
    assert!(!status.running);
    assert_eq!(status.port, None);
    assert_eq!(status.last_outcome, None);

    assert_eq!(
        supervisor.restart(request("after shutdown")).await,
        RestartOutcome::Skipped
    );
    assert_eq!(ledger.launches(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_during_a_restart_stops_the_new_process() {
    let launcher =
        FakeLauncher::new(FakeBehaviour::Healthy).with_launch_delay(Duration::from_secs(1));
    let (supervisor, ledger) = fake_supervisor(launcher, 3, test_timings());

    let restarting = {
        let supervisor = Arc::clone(&supervisor);
        tokio::spawn(async move { supervisor.restart(request("slow")).await })
    };
    sleep(Duration::from_millis(500)).await;
    supervisor.shutdown().await;

    assert_eq!(restarting.await.unwrap(), RestartOutcome::Skipped);
    assert_eq!(ledger.live(), 0);
    assert!(!supervisor.status().await.running);
}

#[tokio::test(start_paused = true)]
async fn status_renders_for_the_operator() {
    let (supervisor, _ledger) =
        fake_supervisor(FakeLauncher::new(FakeBehaviour::Healthy), 3, test_timings());
    assert_eq!(supervisor.status().await.to_string(), "server stopped");

    supervisor.restart(request("initial-start")).await;
    let text = supervisor.status().await.to_string();
    assert!(text.starts_with("server running, port "), "{text}");
    assert!(text.contains("(initial-start)"), "{text}");
}
