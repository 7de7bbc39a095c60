// src/exec/process.rs

//! Real server processes, spawned with `tokio::process::Command`.

use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::errors::{Result, SupervisorError};
use crate::exec::backend::{BoxFuture, LaunchSpec, Launcher, ServerProcess};

/// Build a shell command appropriate for the platform.
pub fn shell_command(cmd: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd);
        c
    }
}

/// Development-mode environment for a child listening on `port`.
///
/// `framework` is the upper-cased prefix (e.g. `APP` yields `APP_PORT`,
/// `APP_DEBUG`, ...). `extra` entries come last so they can override.
pub fn dev_environment(
    framework: &str,
    port: u16,
    extra: &[(String, String)],
) -> Vec<(String, String)> {
    let port = port.to_string();
    let mut env = vec![
        ("PORT".to_string(), port.clone()),
        (format!("{framework}_PORT"), port),
        (format!("{framework}_DEBUG"), "true".to_string()),
        (format!("{framework}_HOT_RELOAD"), "true".to_string()),
        (format!("{framework}_WEBSOCKET"), "true".to_string()),
        (format!("{framework}_WATCH"), "true".to_string()),
    ];
    env.extend(extra.iter().cloned());
    env
}

/// Launches the configured server command through the shell.
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    command: String,
    workdir: PathBuf,
    framework: String,
    extra_env: Vec<(String, String)>,
    ready_pattern: Option<Regex>,
}

impl CommandLauncher {
    pub fn new(command: impl Into<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            workdir: workdir.into(),
            framework: "APP".to_string(),
            extra_env: Vec::new(),
            ready_pattern: None,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            command: settings.command.clone(),
            workdir: settings.root.clone(),
            framework: settings.framework.clone(),
            extra_env: settings.extra_env.clone(),
            ready_pattern: settings.ready_pattern.clone(),
        }
    }

    pub fn with_framework(mut self, framework: impl Into<String>) -> Self {
        self.framework = framework.into();
        self
    }

    pub fn with_ready_pattern(mut self, pattern: Regex) -> Self {
        self.ready_pattern = Some(pattern);
        self
    }

    fn spawn(&self, spec: &LaunchSpec) -> Result<ChildProcess> {
        info!(
            cmd = %self.command,
            port = spec.port,
            attempt = spec.attempt,
            "starting server process"
        );

        let mut cmd = shell_command(&self.command);
        cmd.current_dir(&self.workdir)
            .envs(dev_environment(&self.framework, spec.port, &self.extra_env))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group, so signals reach the server and not just the shell.
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| {
            SupervisorError::LaunchFailed(format!("spawning {:?}: {e}", self.command))
        })?;

        let ready_line = Arc::new(AtomicBool::new(false));
        if let Some(stdout) = child.stdout.take() {
            forward_output(stdout, "stdout", self.ready_pattern.clone(), Arc::clone(&ready_line));
        }
        if let Some(stderr) = child.stderr.take() {
            forward_output(stderr, "stderr", None, Arc::clone(&ready_line));
        }

        Ok(ChildProcess {
            pid: child.id(),
            child,
            ready_line,
        })
    }
}

impl Launcher for CommandLauncher {
    fn launch(&self, spec: LaunchSpec) -> BoxFuture<'_, Result<Box<dyn ServerProcess>>> {
        Box::pin(async move {
            let process = self.spawn(&spec)?;
            Ok(Box::new(process) as Box<dyn ServerProcess>)
        })
    }
}

/// Forward child output lines to the log, flagging a readiness match.
///
/// Output is always consumed so the pipe buffers never fill up.
fn forward_output<R>(
    stream: R,
    stream_name: &'static str,
    ready_pattern: Option<Regex>,
    ready_line: Arc<AtomicBool>,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            info!(target: "child", stream = stream_name, "{}", line);

            if let Some(re) = &ready_pattern {
                if !ready_line.load(Ordering::Acquire) && re.is_match(&line) {
                    debug!(stream = stream_name, "output matched ready_pattern");
                    ready_line.store(true, Ordering::Release);
                }
            }
        }
        debug!(stream = stream_name, "child output stream closed");
    });
}

/// A live child spawned by [`CommandLauncher`].
#[derive(Debug)]
pub struct ChildProcess {
    child: Child,
    pid: Option<u32>,
    ready_line: Arc<AtomicBool>,
}

impl ServerProcess for ChildProcess {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    #[cfg(unix)]
    fn interrupt(&mut self) -> io::Result<()> {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let pid = self
            .pid
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "process has no pid"))?;
        killpg(Pid::from_raw(pid as i32), Signal::SIGINT).map_err(io::Error::from)
    }

    #[cfg(not(unix))]
    fn interrupt(&mut self) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "graceful interrupt is not supported on this platform",
        ))
    }

    fn kill(&mut self) -> io::Result<()> {
        #[cfg(unix)]
        if let Some(pid) = self.pid {
            use nix::errno::Errno;
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(e) => warn!(pid, error = %e, "failed to kill process group"),
            }
        }

        match self.child.start_kill() {
            Ok(()) => Ok(()),
            // Already exited and reaped.
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn wait(&mut self) -> BoxFuture<'_, io::Result<Option<i32>>> {
        Box::pin(async move {
            let status = self.child.wait().await?;
            Ok(status.code())
        })
    }

    fn is_alive(&mut self) -> bool {
        // Reap first: an exited but unreaped child still answers signal 0.
        match self.child.try_wait() {
            Ok(Some(_)) => return false,
            Ok(None) => {}
            Err(e) => {
                warn!(pid = ?self.pid, error = %e, "try_wait failed; assuming process is gone");
                return false;
            }
        }

        #[cfg(unix)]
        {
            use nix::errno::Errno;
            use nix::sys::signal::kill;
            use nix::unistd::Pid;

            match self.pid {
                Some(pid) => !matches!(kill(Pid::from_raw(pid as i32), None), Err(Errno::ESRCH)),
                None => false,
            }
        }

        #[cfg(not(unix))]
        {
            true
        }
    }

    fn saw_ready_line(&self) -> bool {
        self.ready_line.load(Ordering::Acquire)
    }
}

/// `kill_on_drop` only reaches the shell; the rest of the group (the actual
/// server, compiler children) is killed here.
impl Drop for ChildProcess {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(pid) = self.pid {
            use nix::errno::Errno;
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                Ok(()) => debug!(pid, "killed process group on drop"),
                Err(Errno::ESRCH) => {}
                Err(e) => warn!(pid, error = %e, "failed to kill process group on drop"),
            }
        }
    }
}
