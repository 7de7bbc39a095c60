// src/exec/supervisor.rs

//! Restart orchestration for the single supervised server process.
//!
//! One restart cycle walks through:
//!
//! `Stopping(old) -> PortWait -> PreflightCheck -> Starting(new) -> HealthWait`
//!
//! and ends in a [`RestartOutcome`]. All mutable supervisor state lives in
//! one [`SupervisorState`] behind a mutex. A second mutex is held for the
//! whole cycle: a concurrently requested cycle returns
//! [`RestartOutcome::Skipped`] instead of interleaving, and
//! [`Supervisor::shutdown`] waits on it so an in-flight cycle has stopped
//! whatever it launched before the final stop runs. The old process is
//! always fully stopped before a new one is launched, so at most one child
//! is alive.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, error, info, warn};

use crate::config::Timings;
use crate::engine::RestartRequest;
use crate::exec::backend::{
    LaunchSpec, Launcher, PreflightCheck, ReadinessProbe, ServerProcess,
};
use crate::exec::port::{is_port_available, select_port};

/// Typed result of one restart cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartOutcome {
    /// A new instance is serving on `port`.
    Running { port: u16, attempts: u32 },
    /// The build check failed; nothing was started.
    PreflightFailed { message: String },
    /// Every launch attempt failed; the server is left down.
    Exhausted { attempts: u32 },
    /// Another cycle was in flight, or the supervisor is shutting down.
    Skipped,
}

impl RestartOutcome {
    pub fn is_running(&self) -> bool {
        matches!(self, RestartOutcome::Running { .. })
    }
}

impl fmt::Display for RestartOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestartOutcome::Running { port, attempts } => {
                write!(f, "running on port {port} (attempts: {attempts})")
            }
            RestartOutcome::PreflightFailed { message } => {
                write!(f, "preflight check failed: {message}")
            }
            RestartOutcome::Exhausted { attempts } => {
                write!(f, "failed to start after {attempts} attempts")
            }
            RestartOutcome::Skipped => f.write_str("skipped"),
        }
    }
}

/// Everything the supervisor mutates, guarded by a single mutex.
#[derive(Default)]
pub struct SupervisorState {
    port: Option<u16>,
    process: Option<Box<dyn ServerProcess>>,
    last_build_check_at: Option<Instant>,
    build_in_progress: bool,
    last_restart_at: Option<Instant>,
    last_reason: Option<String>,
    last_outcome: Option<RestartOutcome>,
}

/// Snapshot returned by [`Supervisor::status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorStatus {
    pub port: Option<u16>,
    pub pid: Option<u32>,
    pub running: bool,
    pub restart_in_progress: bool,
    pub build_in_progress: bool,
    pub last_reason: Option<String>,
    pub last_outcome: Option<RestartOutcome>,
}

impl fmt::Display for SupervisorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.restart_in_progress {
            "restarting"
        } else if self.running {
            "running"
        } else {
            "stopped"
        };
        write!(f, "server {state}")?;
        if let Some(port) = self.port {
            write!(f, ", port {port}")?;
        }
        if let Some(pid) = self.pid {
            write!(f, ", pid {pid}")?;
        }
        if let Some(ref outcome) = self.last_outcome {
            write!(f, "; last restart: {outcome}")?;
        }
        if let Some(ref reason) = self.last_reason {
            write!(f, " ({reason})")?;
        }
        Ok(())
    }
}

/// Result of a health probe against the current process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    Dead,
    /// No process is supervised right now (never started or left down).
    NoProcess,
    /// A restart cycle is running; the probe was not attempted.
    Busy,
}

enum Readiness {
    Ready,
    TimedOut,
    Exited,
    Cancelled,
}

enum PassResult {
    Healthy {
        process: Box<dyn ServerProcess>,
        port: u16,
    },
    Crashed,
    Exhausted,
    Cancelled,
}

/// Raises the in-progress flag; lowers it on every exit path, including
/// panics.
struct RestartGuard<'a>(&'a AtomicBool);

impl<'a> RestartGuard<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for RestartGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Owner of the supervised server process.
pub struct Supervisor {
    launcher: Arc<dyn Launcher>,
    readiness: Arc<dyn ReadinessProbe>,
    preflight: Option<Arc<dyn PreflightCheck>>,
    max_attempts: u32,
    timings: Timings,
    state: Mutex<SupervisorState>,
    /// Held for the duration of one restart cycle.
    cycle: Mutex<()>,
    restart_in_progress: AtomicBool,
    stop_signal: watch::Sender<bool>,
}

impl fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("max_attempts", &self.max_attempts)
            .field("timings", &self.timings)
            .field("restart_in_progress", &self.restart_in_progress)
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    pub fn new(
        launcher: Arc<dyn Launcher>,
        readiness: Arc<dyn ReadinessProbe>,
        max_attempts: u32,
        timings: Timings,
    ) -> Self {
        Self {
            launcher,
            readiness,
            preflight: None,
            max_attempts: max_attempts.max(1),
            timings,
            state: Mutex::new(SupervisorState::default()),
            cycle: Mutex::new(()),
            restart_in_progress: AtomicBool::new(false),
            stop_signal: watch::Sender::new(false),
        }
    }

    pub fn with_preflight(mut self, preflight: Arc<dyn PreflightCheck>) -> Self {
        self.preflight = Some(preflight);
        self
    }

    pub fn timings(&self) -> &Timings {
        &self.timings
    }

    /// Port of the currently running instance, if any.
    pub async fn current_port(&self) -> Option<u16> {
        self.state.lock().await.port
    }

    /// When the last restart cycle finished (any outcome except `Skipped`).
    pub async fn last_restart_at(&self) -> Option<Instant> {
        self.state.lock().await.last_restart_at
    }

    pub fn is_restarting(&self) -> bool {
        self.restart_in_progress.load(Ordering::Acquire)
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.stop_signal.borrow()
    }

    /// Resolves once [`Supervisor::shutdown`] has been called.
    async fn shutdown_requested(&self) {
        let mut rx = self.stop_signal.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    pub async fn status(&self) -> SupervisorStatus {
        let st = self.state.lock().await;
        SupervisorStatus {
            port: st.port,
            pid: st.process.as_ref().and_then(|p| p.pid()),
            running: st.process.is_some(),
            restart_in_progress: self.is_restarting(),
            build_in_progress: st.build_in_progress,
            last_reason: st.last_reason.clone(),
            last_outcome: st.last_outcome.clone(),
        }
    }

    /// Zero-effect liveness probe of the current process.
    pub async fn probe_liveness(&self) -> Liveness {
        if self.is_restarting() {
            return Liveness::Busy;
        }
        let mut st = self.state.lock().await;
        match st.process.as_mut() {
            None => Liveness::NoProcess,
            Some(process) => {
                if process.is_alive() {
                    Liveness::Alive
                } else {
                    Liveness::Dead
                }
            }
        }
    }

    /// Run one full restart cycle for `request`.
    pub async fn restart(&self, request: RestartRequest) -> RestartOutcome {
        if self.is_shutting_down() {
            debug!(reason = %request.reason, "supervisor shutting down; ignoring restart");
            return RestartOutcome::Skipped;
        }

        let Ok(_cycle) = self.cycle.try_lock() else {
            info!(
                reason = %request.reason,
                "restart already in progress; skipping concurrent request"
            );
            return RestartOutcome::Skipped;
        };
        let _busy = RestartGuard::raise(&self.restart_in_progress);

        info!(
            reason = %request.reason,
            port = request.target_port,
            "restart cycle started"
        );

        let outcome = self.run_cycle(&request).await;

        match &outcome {
            RestartOutcome::Running { port, attempts } => {
                info!(port, attempts, reason = %request.reason, "server running");
            }
            RestartOutcome::PreflightFailed { message } => {
                error!(reason = %request.reason, "build failed; server left down:\n{message}");
            }
            RestartOutcome::Exhausted { attempts } => {
                error!(
                    attempts,
                    reason = %request.reason,
                    "server failed to start; left down until the next change"
                );
            }
            RestartOutcome::Skipped => {
                info!(reason = %request.reason, "restart abandoned for shutdown");
            }
        }

        let mut st = self.state.lock().await;
        if outcome != RestartOutcome::Skipped {
            st.last_restart_at = Some(Instant::now());
        }
        st.last_reason = Some(request.reason.clone());
        st.last_outcome = Some(outcome.clone());
        outcome
    }

    /// Stop the current process (graceful, then forced) and clear all state.
    ///
    /// An in-flight cycle notices the shutdown at its next step, stops any
    /// process it launched and returns `Skipped`; this waits for that first.
    pub async fn shutdown(&self) {
        self.stop_signal.send_replace(true);

        let _cycle = self.cycle.lock().await;
        let process = {
            let mut st = self.state.lock().await;
            let process = st.process.take();
            *st = SupervisorState::default();
            process
        };

        match process {
            Some(process) => {
                info!(pid = ?process.pid(), "stopping server for shutdown");
                stop_process(process, &self.timings).await;
            }
            None => debug!("shutdown: no server process to stop"),
        }
    }

    async fn run_cycle(&self, request: &RestartRequest) -> RestartOutcome {
        // Stopping
        let old = {
            let mut st = self.state.lock().await;
            st.port = None;
            st.process.take()
        };

        if let Some(process) = old {
            info!(pid = ?process.pid(), "stopping previous server");
            stop_process(process, &self.timings).await;

            tokio::select! {
                _ = self.wait_for_port_release(request.target_port) => {}
                _ = self.shutdown_requested() => return RestartOutcome::Skipped,
            }
        }

        // PreflightCheck
        let preflight = tokio::select! {
            result = self.run_preflight() => result,
            _ = self.shutdown_requested() => return RestartOutcome::Skipped,
        };
        if let Err(message) = preflight {
            return RestartOutcome::PreflightFailed { message };
        }

        // Starting + HealthWait
        self.start_with_retries(request.target_port).await
    }

    /// Best-effort wait for the old listener to release `port`.
    async fn wait_for_port_release(&self, port: u16) {
        sleep(self.timings.port_release_grace).await;

        let polls = self.timings.port_poll_attempts.max(1);
        for poll in 1..=polls {
            if is_port_available(port) {
                debug!(port, poll, "port released");
                return;
            }
            debug!(port, poll, polls, "port still in use");
            if poll < polls {
                sleep(self.timings.port_poll_interval).await;
            }
        }

        warn!(port, "port still busy after waiting; continuing anyway");
    }

    async fn run_preflight(&self) -> std::result::Result<(), String> {
        let Some(check) = self.preflight.as_ref() else {
            return Ok(());
        };

        {
            let mut st = self.state.lock().await;
            if let Some(at) = st.last_build_check_at {
                if at.elapsed() < self.timings.preflight_cache {
                    debug!("preflight passed recently; skipping");
                    return Ok(());
                }
            }
            st.build_in_progress = true;
        }

        let result = check.check().await;

        let mut st = self.state.lock().await;
        st.build_in_progress = false;
        match result {
            Ok(()) => {
                st.last_build_check_at = Some(Instant::now());
                Ok(())
            }
            Err(err) => {
                st.last_build_check_at = None;
                Err(err.to_string())
            }
        }
    }

    async fn start_with_retries(&self, desired_port: u16) -> RestartOutcome {
        let mut attempts = 0;
        let mut extra_pass_used = false;

        loop {
            match self.run_pass(desired_port, &mut attempts).await {
                PassResult::Healthy { process, port } => {
                    return self.install(process, port, attempts).await;
                }
                PassResult::Crashed if !extra_pass_used => {
                    extra_pass_used = true;
                    warn!(attempts, "server crashed during startup; running one more retry pass");
                }
                PassResult::Crashed | PassResult::Exhausted => {
                    return RestartOutcome::Exhausted { attempts };
                }
                PassResult::Cancelled => return RestartOutcome::Skipped,
            }
        }
    }

    /// Up to `max_attempts` launches; stops early if the child crashes.
    async fn run_pass(&self, desired_port: u16, attempts: &mut u32) -> PassResult {
        for _ in 0..self.max_attempts {
            if self.is_shutting_down() {
                return PassResult::Cancelled;
            }
            *attempts += 1;
            let port = select_port(desired_port);
            let spec = LaunchSpec {
                port,
                attempt: *attempts,
            };

            let mut process = match self.launcher.launch(spec).await {
                Ok(process) => process,
                Err(err) => {
                    warn!(attempt = *attempts, port, error = %err, "launch failed");
                    continue;
                }
            };

            match self.await_ready(process.as_mut(), port).await {
                Readiness::Ready => return PassResult::Healthy { process, port },
                Readiness::TimedOut => {
                    warn!(
                        attempt = *attempts,
                        port,
                        timeout = ?self.timings.startup_timeout,
                        "server not ready in time; stopping it"
                    );
                    stop_process(process, &self.timings).await;
                }
                Readiness::Exited => {
                    warn!(attempt = *attempts, port, "server exited during startup");
                    stop_process(process, &self.timings).await;
                    return PassResult::Crashed;
                }
                Readiness::Cancelled => {
                    info!(attempt = *attempts, port, "shutdown during startup; stopping server");
                    stop_process(process, &self.timings).await;
                    return PassResult::Cancelled;
                }
            }
        }

        PassResult::Exhausted
    }

    async fn await_ready(&self, process: &mut dyn ServerProcess, port: u16) -> Readiness {
        let deadline = Instant::now() + self.timings.startup_timeout;

        loop {
            if self.is_shutting_down() {
                return Readiness::Cancelled;
            }
            if !process.is_alive() {
                return Readiness::Exited;
            }

            let probe = self.readiness.is_ready(port, &*process);
            if probe.await {
                return Readiness::Ready;
            }

            if Instant::now() >= deadline {
                return Readiness::TimedOut;
            }
            tokio::select! {
                _ = sleep(self.timings.readiness_poll) => {}
                _ = self.shutdown_requested() => return Readiness::Cancelled,
            }
        }
    }

    async fn install(
        &self,
        process: Box<dyn ServerProcess>,
        port: u16,
        attempts: u32,
    ) -> RestartOutcome {
        // Checked under the state lock so a concurrent shutdown either sees
        // the new process or the new process sees the shutdown.
        let mut st = self.state.lock().await;
        if self.is_shutting_down() {
            drop(st);
            info!("shutdown requested during restart; stopping the new server");
            stop_process(process, &self.timings).await;
            return RestartOutcome::Skipped;
        }
        st.port = Some(port);
        st.process = Some(process);
        RestartOutcome::Running { port, attempts }
    }
}

/// Stop `process`: interrupt, wait up to `stop_timeout`, then force-kill and
/// wait unconditionally.
///
/// A failed interrupt escalates straight to the force-kill.
pub async fn stop_process(mut process: Box<dyn ServerProcess>, timings: &Timings) {
    let pid = process.pid();

    if let Err(err) = process.interrupt() {
        warn!(?pid, error = %err, "graceful signal failed; force-killing");
        force_kill(process.as_mut(), pid).await;
        return;
    }

    let exited = timeout(timings.stop_timeout, process.wait()).await;
    match exited {
        Ok(Ok(code)) => debug!(?pid, ?code, "server exited"),
        Ok(Err(err)) => warn!(?pid, error = %err, "waiting for server exit failed"),
        Err(_) => {
            warn!(
                ?pid,
                timeout = ?timings.stop_timeout,
                "server did not exit in time; force-killing"
            );
            force_kill(process.as_mut(), pid).await;
        }
    }
}

async fn force_kill(process: &mut dyn ServerProcess, pid: Option<u32>) {
    if let Err(err) = process.kill() {
        warn!(?pid, error = %err, "force-kill failed");
    }
    match process.wait().await {
        Ok(code) => debug!(?pid, ?code, "server killed"),
        Err(err) => warn!(?pid, error = %err, "waiting for killed server failed"),
    }
}
