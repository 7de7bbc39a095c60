// src/exec/backend.rs

//! Pluggable process backend abstraction.
//!
//! The supervisor never touches `tokio::process` directly. It talks to:
//! - a [`Launcher`] that starts one server instance on a given port,
//! - the [`ServerProcess`] handle it returns,
//! - a [`PreflightCheck`] that verifies the project builds,
//! - a [`ReadinessProbe`] that decides when a fresh instance is serving.
//!
//! Production implementations live in [`super::process`],
//! [`super::preflight`] and [`super::readiness`]; tests plug in fakes that
//! never spawn OS processes.

use std::future::Future;
use std::io;
use std::pin::Pin;

use crate::errors::Result;

/// Boxed, sendable future returned by the backend traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a single launch attempt needs to know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Port the new instance must listen on (already fallback-resolved).
    pub port: u16,
    /// 1-based attempt number within the current restart cycle.
    pub attempt: u32,
}

/// Handle to one running server instance.
///
/// Exactly one owner holds it; dropping it must not leave an orphan behind
/// (the real implementation spawns with `kill_on_drop`).
pub trait ServerProcess: Send {
    /// OS process id, if the platform exposes one.
    fn pid(&self) -> Option<u32>;

    /// Ask the process to terminate gracefully (interrupt signal).
    ///
    /// An error means the signal could not be delivered; the caller then
    /// escalates to [`ServerProcess::kill`].
    fn interrupt(&mut self) -> io::Result<()>;

    /// Force-kill the process. Does not wait for it to exit.
    fn kill(&mut self) -> io::Result<()>;

    /// Wait for the process to exit, returning its exit code if it has one.
    fn wait(&mut self) -> BoxFuture<'_, io::Result<Option<i32>>>;

    /// Zero-effect liveness probe: `false` only if the process is gone.
    fn is_alive(&mut self) -> bool;

    /// Whether a stdout line matched the configured readiness pattern.
    fn saw_ready_line(&self) -> bool {
        false
    }
}

/// Starts server instances.
pub trait Launcher: Send + Sync {
    fn launch(&self, spec: LaunchSpec) -> BoxFuture<'_, Result<Box<dyn ServerProcess>>>;
}

/// Verifies the project compiles without running it.
pub trait PreflightCheck: Send + Sync {
    fn check(&self) -> BoxFuture<'_, Result<()>>;
}

/// Decides whether a freshly launched instance is serving.
///
/// Implementations read whatever they need from `process` synchronously;
/// the returned future only borrows the probe itself.
pub trait ReadinessProbe: Send + Sync {
    fn is_ready(&self, port: u16, process: &dyn ServerProcess) -> BoxFuture<'_, bool>;
}
