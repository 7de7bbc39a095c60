// src/exec/mod.rs

//! Process execution layer.
//!
//! Everything that touches the supervised server process lives here:
//!
//! - [`backend`] defines the `Launcher` / `ServerProcess` / `PreflightCheck`
//!   / `ReadinessProbe` traits the supervisor is written against, so tests
//!   can replace them with fakes.
//! - [`process`] spawns the real child through the shell.
//! - [`preflight`] runs the build check before a launch.
//! - [`readiness`] contains the HTTP, TCP and stdout readiness probes.
//! - [`port`] parses ports and finds a free one near the desired port.
//! - [`supervisor`] owns the single running child and the restart cycle.

pub mod backend;
pub mod port;
pub mod preflight;
pub mod process;
pub mod readiness;
pub mod supervisor;

pub use backend::{BoxFuture, LaunchSpec, Launcher, PreflightCheck, ReadinessProbe, ServerProcess};
pub use port::{is_port_available, parse_port, select_port, PORT_SEARCH_RADIUS};
pub use preflight::CommandPreflight;
pub use process::{dev_environment, shell_command, ChildProcess, CommandLauncher};
pub use readiness::{HttpReadiness, StdoutReadiness, TcpReadiness};
pub use supervisor::{
    stop_process, Liveness, RestartOutcome, Supervisor, SupervisorStatus,
};
