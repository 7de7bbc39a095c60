// src/cli.rs

//! CLI argument parsing using `clap`.
//!
//! Every flag except `--config`, `--log-level` and `--dry-run` overrides the
//! matching entry of the TOML config file.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `rekindle`.
#[derive(Debug, Clone, Parser, Default)]
#[command(
    name = "rekindle",
    version,
    about = "Supervise a development server: restart it on code changes, refresh the browser on asset changes.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// A missing file is not an error; built-in defaults are used instead.
    #[arg(long, value_name = "PATH", default_value = "Rekindle.toml")]
    pub config: String,

    /// Command that starts the supervised server (run through the shell).
    #[arg(long, value_name = "CMD")]
    pub command: Option<String>,

    /// Desired server port, e.g. `3000` or `:3000`.
    #[arg(long, short, value_name = "PORT")]
    pub port: Option<String>,

    /// Project root to watch.
    #[arg(long, value_name = "DIR")]
    pub root: Option<String>,

    /// Disable file watching (health monitor and console still work).
    #[arg(long)]
    pub no_watch: bool,

    /// Debounce window for file changes, in milliseconds.
    #[arg(long, value_name = "MS")]
    pub debounce_ms: Option<u64>,

    /// Launch attempts per restart cycle.
    #[arg(long, value_name = "N")]
    pub retries: Option<u32>,

    /// Read operator commands (reload, refresh, ...) from stdin.
    #[arg(long, short)]
    pub interactive: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `REKINDLE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Resolve and print the effective settings without starting anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
