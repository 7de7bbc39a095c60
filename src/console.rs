// src/console.rs

//! Optional interactive operator console on stdin.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::engine::RuntimeEvent;

/// A recognised console command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Reload,
    Refresh,
    Test,
    Status,
    Quit,
    Help,
}

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    Command(ConsoleCommand),
    Empty,
    Unknown(String),
}

pub const HELP_TEXT: &str = "\
commands:
  r, reload    restart the server
  R, refresh   send a hot-refresh to the browser
  t, test      check that the refresh endpoint answers
  s, status    show supervisor status
  q, quit      stop the server and exit
  h, help      show this help";

/// Parse one line. `r` and `R` are distinct; words are case-insensitive.
pub fn parse_command(line: &str) -> ConsoleInput {
    let input = line.trim();
    let command = match input {
        "" => return ConsoleInput::Empty,
        "r" => ConsoleCommand::Reload,
        "R" => ConsoleCommand::Refresh,
        "t" | "T" => ConsoleCommand::Test,
        "s" | "S" => ConsoleCommand::Status,
        "q" | "Q" => ConsoleCommand::Quit,
        "h" | "H" | "?" => ConsoleCommand::Help,
        word => match word.to_ascii_lowercase().as_str() {
            "reload" => ConsoleCommand::Reload,
            "refresh" => ConsoleCommand::Refresh,
            "test" => ConsoleCommand::Test,
            "status" => ConsoleCommand::Status,
            "quit" | "exit" => ConsoleCommand::Quit,
            "help" => ConsoleCommand::Help,
            _ => return ConsoleInput::Unknown(word.to_string()),
        },
    };
    ConsoleInput::Command(command)
}

/// The runtime event a command maps to; `Help` is handled locally.
pub fn command_event(command: ConsoleCommand) -> Option<RuntimeEvent> {
    match command {
        ConsoleCommand::Reload => Some(RuntimeEvent::RestartRequested {
            reason: "manual reload".to_string(),
        }),
        ConsoleCommand::Refresh => Some(RuntimeEvent::RefreshRequested {
            reason: "manual refresh".to_string(),
        }),
        ConsoleCommand::Test => Some(RuntimeEvent::ProbeRequested),
        ConsoleCommand::Status => Some(RuntimeEvent::StatusRequested),
        ConsoleCommand::Quit => Some(RuntimeEvent::ShutdownRequested),
        ConsoleCommand::Help => None,
    }
}

/// Read commands from `reader` until EOF or `quit`.
///
/// End of input stops the console but not the supervisor.
pub async fn run_console<R>(reader: R, runtime_tx: mpsc::Sender<RuntimeEvent>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("console input closed");
                return;
            }
            Err(err) => {
                debug!(error = %err, "console read failed; console disabled");
                return;
            }
        };

        let command = match parse_command(&line) {
            ConsoleInput::Empty => continue,
            ConsoleInput::Unknown(word) => {
                println!("unknown command: {word} (h for help)");
                continue;
            }
            ConsoleInput::Command(command) => command,
        };

        let Some(event) = command_event(command) else {
            println!("{HELP_TEXT}");
            continue;
        };

        if runtime_tx.send(event).await.is_err() || command == ConsoleCommand::Quit {
            return;
        }
    }
}

/// Spawn the console on the process stdin.
pub fn spawn_console(runtime_tx: mpsc::Sender<RuntimeEvent>) -> JoinHandle<()> {
    println!("{HELP_TEXT}");
    tokio::spawn(run_console(BufReader::new(tokio::io::stdin()), runtime_tx))
}
