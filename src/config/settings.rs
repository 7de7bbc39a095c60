// src/config/settings.rs

//! Resolved, typed settings consumed by the supervisor.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Error, Result};
use regex::Regex;

use crate::config::model::ConfigFile;
use crate::config::validate::validate_config;
use crate::exec::port::parse_port;
use crate::types::ReadinessMode;

/// Every timer and retry bound of a restart cycle.
///
/// Only `min_restart_interval`, `health_interval` and `startup_timeout` are
/// exposed in the config file; the rest are fixed in production and shrunk
/// in tests.
#[derive(Debug, Clone)]
pub struct Timings {
    /// Wait for a gracefully signalled child before force-killing it.
    pub stop_timeout: Duration,
    /// Pause after a stop before the first port availability poll.
    pub port_release_grace: Duration,
    /// Port availability polls after a stop; best-effort.
    pub port_poll_attempts: u32,
    pub port_poll_interval: Duration,
    /// A successful preflight check is reused for this long.
    pub preflight_cache: Duration,
    /// How long a fresh child has to become ready.
    pub startup_timeout: Duration,
    pub readiness_poll: Duration,
    pub min_restart_interval: Duration,
    pub health_interval: Duration,
    /// Per-request timeout of the refresh notifier.
    pub refresh_timeout: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            stop_timeout: Duration::from_secs(5),
            port_release_grace: Duration::from_secs(1),
            port_poll_attempts: 5,
            port_poll_interval: Duration::from_secs(2),
            preflight_cache: Duration::from_secs(5),
            startup_timeout: Duration::from_secs(10),
            readiness_poll: Duration::from_millis(250),
            min_restart_interval: Duration::from_secs(2),
            health_interval: Duration::from_secs(30),
            refresh_timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub root: PathBuf,
    pub command: String,
    pub port: u16,
    /// Upper-cased framework prefix for the child environment.
    pub framework: String,
    pub extra_env: Vec<(String, String)>,
    pub preflight: Option<String>,

    pub watch_enabled: bool,
    pub debounce: Duration,
    pub watch_dirs: Vec<String>,
    pub exclude: Vec<String>,

    pub max_attempts: u32,
    pub queue_capacity: usize,

    pub readiness: ReadinessMode,
    pub ready_pattern: Option<Regex>,

    pub interactive: bool,
    pub timings: Timings,
}

impl TryFrom<ConfigFile> for Settings {
    type Error = Error;

    fn try_from(cfg: ConfigFile) -> Result<Self> {
        validate_config(&cfg)?;

        let port = parse_port(&cfg.server.port)?;
        let ready_pattern = cfg
            .health
            .ready_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .context("compiling [health].ready_pattern")?;

        let preflight = cfg
            .build
            .preflight
            .filter(|cmd| !cmd.trim().is_empty());

        let timings = Timings {
            min_restart_interval: Duration::from_millis(cfg.restart.min_interval_ms),
            health_interval: Duration::from_secs(cfg.health.interval_secs),
            startup_timeout: Duration::from_secs(cfg.health.startup_timeout_secs),
            ..Timings::default()
        };

        Ok(Self {
            root: PathBuf::from(&cfg.watch.root),
            command: cfg.server.command,
            port,
            framework: cfg.server.framework.trim().to_uppercase(),
            extra_env: cfg.server.env.into_iter().collect(),
            preflight,
            watch_enabled: cfg.watch.enabled,
            debounce: Duration::from_millis(cfg.watch.debounce_ms),
            watch_dirs: cfg.watch.dirs,
            exclude: cfg.watch.exclude,
            max_attempts: cfg.restart.max_attempts,
            queue_capacity: cfg.restart.queue_capacity,
            readiness: cfg.health.readiness,
            ready_pattern,
            interactive: cfg.console.interactive,
            timings,
        })
    }
}
