use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rekindle::config::Timings;
use rekindle::errors::{Result, SupervisorError};
use rekindle::exec::{
    BoxFuture, LaunchSpec, Launcher, PreflightCheck, ServerProcess, StdoutReadiness, Supervisor,
};
use rekindle::refresh::Notifier;
use rekindle::types::SignalKind;
use tokio::sync::watch;

/// How the next fake server instance behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeBehaviour {
    /// Becomes ready immediately and exits when interrupted.
    Healthy,
    /// Stays alive but never becomes ready.
    NeverReady,
    /// Exits right after launch.
    CrashOnStart,
    /// The launch itself fails.
    FailLaunch,
    /// Becomes ready but ignores the graceful signal; only a kill stops it.
    IgnoreInterrupt,
}

#[derive(Debug, Default)]
struct LedgerState {
    launches: u32,
    live: usize,
    max_live: usize,
    ports: Vec<u16>,
    interrupts: u32,
    kills: u32,
    next_pid: u32,
    processes: Vec<Arc<watch::Sender<bool>>>,
}

/// Shared bookkeeping of every fake process ever launched.
#[derive(Debug, Default)]
pub struct ProcessLedger {
    state: Mutex<LedgerState>,
}

impl ProcessLedger {
    fn register(&self, port: u16) -> (u32, Arc<watch::Sender<bool>>) {
        let (alive, _) = watch::channel(true);
        let alive = Arc::new(alive);

        let mut st = self.state.lock().unwrap();
        st.launches += 1;
        st.live += 1;
        st.max_live = st.max_live.max(st.live);
        st.ports.push(port);
        st.next_pid += 1;
        st.processes.push(Arc::clone(&alive));
        (10_000 + st.next_pid, alive)
    }

    fn record_failed_launch(&self, port: u16) {
        let mut st = self.state.lock().unwrap();
        st.launches += 1;
        st.ports.push(port);
    }

    fn mark_dead(&self, alive: &watch::Sender<bool>) {
        if alive.send_replace(false) {
            self.state.lock().unwrap().live -= 1;
        }
    }

    /// Kill the most recently launched process behind the supervisor's back.
    pub fn crash_latest(&self) {
        let latest = self.state.lock().unwrap().processes.last().cloned();
        if let Some(alive) = latest {
            self.mark_dead(&alive);
        }
    }

    /// Launch attempts, failed ones included.
    pub fn launches(&self) -> u32 {
        self.state.lock().unwrap().launches
    }

    pub fn live(&self) -> usize {
        self.state.lock().unwrap().live
    }

    /// Highest number of simultaneously live processes ever observed.
    pub fn max_live(&self) -> usize {
        self.state.lock().unwrap().max_live
    }

    /// Port of every launch attempt, in order.
    pub fn ports(&self) -> Vec<u16> {
        self.state.lock().unwrap().ports.clone()
    }

    pub fn interrupts(&self) -> u32 {
        self.state.lock().unwrap().interrupts
    }

    pub fn kills(&self) -> u32 {
        self.state.lock().unwrap().kills
    }
}

/// A server process that lives only in memory.
pub struct FakeProcess {
    pid: u32,
    alive: Arc<watch::Sender<bool>>,
    ledger: Arc<ProcessLedger>,
    behaviour: FakeBehaviour,
}

impl ServerProcess for FakeProcess {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn interrupt(&mut self) -> io::Result<()> {
        self.ledger.state.lock().unwrap().interrupts += 1;
        if self.behaviour != FakeBehaviour::IgnoreInterrupt {
            self.ledger.mark_dead(&self.alive);
        }
        Ok(())
    }

    fn kill(&mut self) -> io::Result<()> {
        self.ledger.state.lock().unwrap().kills += 1;
        self.ledger.mark_dead(&self.alive);
        Ok(())
    }

    fn wait(&mut self) -> BoxFuture<'_, io::Result<Option<i32>>> {
        let mut rx = self.alive.subscribe();
        Box::pin(async move {
            rx.wait_for(|alive| !*alive)
                .await
                .map_err(|e| io::Error::other(e.to_string()))?;
            Ok(Some(0))
        })
    }

    fn is_alive(&mut self) -> bool {
        *self.alive.borrow()
    }

    fn saw_ready_line(&self) -> bool {
        matches!(
            self.behaviour,
            FakeBehaviour::Healthy | FakeBehaviour::IgnoreInterrupt
        ) && *self.alive.borrow()
    }
}

/// Launcher handing out [`FakeProcess`]es.
///
/// Behaviours are taken from the script in order; once it is empty every
/// launch uses the default behaviour.
pub struct FakeLauncher {
    ledger: Arc<ProcessLedger>,
    default: FakeBehaviour,
    script: Mutex<VecDeque<FakeBehaviour>>,
    launch_delay: Option<Duration>,
}

impl FakeLauncher {
    pub fn new(default: FakeBehaviour) -> Self {
        Self {
            ledger: Arc::new(ProcessLedger::default()),
            default,
            script: Mutex::new(VecDeque::new()),
            launch_delay: None,
        }
    }

    pub fn with_script(self, script: impl IntoIterator<Item = FakeBehaviour>) -> Self {
        self.script.lock().unwrap().extend(script);
        self
    }

    /// Make every launch take `delay` (virtual time in paused tests).
    pub fn with_launch_delay(mut self, delay: Duration) -> Self {
        self.launch_delay = Some(delay);
        self
    }

    pub fn ledger(&self) -> Arc<ProcessLedger> {
        Arc::clone(&self.ledger)
    }

    /// Queue further behaviours for later launches.
    pub fn push_script(&self, behaviour: FakeBehaviour) {
        self.script.lock().unwrap().push_back(behaviour);
    }

    fn next_behaviour(&self) -> FakeBehaviour {
        self.script.lock().unwrap().pop_front().unwrap_or(self.default)
    }
}

impl Launcher for FakeLauncher {
    fn launch(&self, spec: LaunchSpec) -> BoxFuture<'_, Result<Box<dyn ServerProcess>>> {
        Box::pin(async move {
            if let Some(delay) = self.launch_delay {
                tokio::time::sleep(delay).await;
            }

            let behaviour = self.next_behaviour();
            if behaviour == FakeBehaviour::FailLaunch {
                self.ledger.record_failed_launch(spec.port);
                return Err(SupervisorError::LaunchFailed(format!(
                    "fake launch failure (attempt {})",
                    spec.attempt
                )));
            }

            let (pid, alive) = self.ledger.register(spec.port);
            if behaviour == FakeBehaviour::CrashOnStart {
                self.ledger.mark_dead(&alive);
            }

            Ok(Box::new(FakeProcess {
                pid,
                alive,
                ledger: Arc::clone(&self.ledger),
                behaviour,
            }) as Box<dyn ServerProcess>)
        })
    }
}

/// Preflight check with a switchable verdict and a call counter.
#[derive(Debug)]
pub struct FakePreflight {
    passing: AtomicBool,
    calls: AtomicU32,
}

impl FakePreflight {
    pub fn new(passing: bool) -> Self {
        Self {
            passing: AtomicBool::new(passing),
            calls: AtomicU32::new(0),
        }
    }

    pub fn set_passing(&self, passing: bool) {
        self.passing.store(passing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PreflightCheck for FakePreflight {
    fn check(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.passing.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(SupervisorError::PreflightFailed(
                    "main.go:3: undefined: foo".to_string(),
                ))
            }
        })
    }
}

/// Notifier that records every signal and answers with a fixed verdict.
#[derive(Debug)]
pub struct RecordingNotifier {
    signals: Mutex<Vec<(u16, SignalKind)>>,
    answering: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            signals: Mutex::new(Vec::new()),
            answering: AtomicBool::new(true),
        }
    }

    pub fn set_answering(&self, answering: bool) {
        self.answering.store(answering, Ordering::SeqCst);
    }

    pub fn signals(&self) -> Vec<(u16, SignalKind)> {
        self.signals.lock().unwrap().clone()
    }

    /// Poll until at least `n` signals were recorded.
    pub async fn wait_for_signals(&self, n: usize) -> Vec<(u16, SignalKind)> {
        loop {
            let signals = self.signals();
            if signals.len() >= n {
                return signals;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Default for RecordingNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for RecordingNotifier {
    fn signal(&self, port: u16, kind: SignalKind) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.signals.lock().unwrap().push((port, kind));
            if self.answering.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(SupervisorError::RefreshRejected(503))
            }
        })
    }
}

/// Supervisor over `launcher` using the stdout readiness probe, which the
/// fake processes answer directly.
pub fn fake_supervisor(
    launcher: FakeLauncher,
    max_attempts: u32,
    timings: Timings,
) -> (Arc<Supervisor>, Arc<ProcessLedger>) {
    let ledger = launcher.ledger();
    let supervisor = Supervisor::new(
        Arc::new(launcher),
        Arc::new(StdoutReadiness),
        max_attempts,
        timings,
    );
    (Arc::new(supervisor), ledger)
}

/// Production timings with the post-stop port wait shortened.
pub fn test_timings() -> Timings {
    Timings {
        port_release_grace: Duration::from_millis(10),
        port_poll_attempts: 1,
        port_poll_interval: Duration::from_millis(10),
        ..Timings::default()
    }
}
