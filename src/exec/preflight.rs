// src/exec/preflight.rs

//! Build verification run before every (re)start.

use std::path::PathBuf;
use std::process::Stdio;

use tracing::{debug, info};

use crate::errors::{Result, SupervisorError};
use crate::exec::backend::{BoxFuture, PreflightCheck};
use crate::exec::process::shell_command;

/// Lines of compiler output kept in a preflight failure message.
const OUTPUT_TAIL_LINES: usize = 20;

/// Runs a shell command (e.g. `go vet ./...`) and treats a non-zero exit
/// as a build failure.
#[derive(Debug, Clone)]
pub struct CommandPreflight {
    command: String,
    workdir: PathBuf,
}

impl CommandPreflight {
    pub fn new(command: impl Into<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            workdir: workdir.into(),
        }
    }
}

impl PreflightCheck for CommandPreflight {
    fn check(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            info!(cmd = %self.command, "running preflight check");

            let output = shell_command(&self.command)
                .current_dir(&self.workdir)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output()
                .await?;

            if output.status.success() {
                debug!(cmd = %self.command, "preflight check passed");
                return Ok(());
            }

            let mut text = String::from_utf8_lossy(&output.stderr).into_owned();
            if text.trim().is_empty() {
                text = String::from_utf8_lossy(&output.stdout).into_owned();
            }

            Err(SupervisorError::PreflightFailed(format!(
                "`{}` exited with {}: {}",
                self.command,
                output.status.code().map_or("signal".to_string(), |c| c.to_string()),
                tail(&text, OUTPUT_TAIL_LINES)
            )))
        })
    }
}

fn tail(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.trim_end().lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}
