// src/config/validate.rs

use anyhow::{anyhow, Context, Result};
use regex::Regex;

use crate::config::model::ConfigFile;
use crate::exec::port::parse_port;
use crate::types::ReadinessMode;
use crate::watch::ExcludePatterns;

/// Run basic semantic validation against a loaded configuration.
///
/// This checks:
/// - the server command is not empty
/// - the port parses (optionally with a leading `:`)
/// - the framework prefix is usable as an environment variable prefix
/// - attempt count, queue capacity and intervals are non-zero
/// - `stdout` readiness comes with a valid `ready_pattern`
/// - `[watch].exclude` globs compile
pub fn validate_config(cfg: &ConfigFile) -> Result<()> {
    validate_server(cfg)?;
    validate_restart(cfg)?;
    validate_health(cfg)?;
    validate_watch(cfg)?;
    Ok(())
}

fn validate_server(cfg: &ConfigFile) -> Result<()> {
    if cfg.server.command.trim().is_empty() {
        return Err(anyhow!("[server].command must not be empty"));
    }

    parse_port(&cfg.server.port).context("invalid [server].port")?;

    let framework = cfg.server.framework.trim();
    if framework.is_empty()
        || !framework
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(anyhow!(
            "[server].framework must be a non-empty identifier (got {:?})",
            cfg.server.framework
        ));
    }

    Ok(())
}

fn validate_restart(cfg: &ConfigFile) -> Result<()> {
    if cfg.restart.max_attempts == 0 {
        return Err(anyhow!("[restart].max_attempts must be >= 1 (got 0)"));
    }
    if cfg.restart.queue_capacity == 0 {
        return Err(anyhow!("[restart].queue_capacity must be >= 1 (got 0)"));
    }
    Ok(())
}

fn validate_health(cfg: &ConfigFile) -> Result<()> {
    if cfg.health.interval_secs == 0 {
        return Err(anyhow!("[health].interval_secs must be >= 1 (got 0)"));
    }
    if cfg.health.startup_timeout_secs == 0 {
        return Err(anyhow!(
            "[health].startup_timeout_secs must be >= 1 (got 0)"
        ));
    }

    match (&cfg.health.readiness, &cfg.health.ready_pattern) {
        (ReadinessMode::Stdout, None) => {
            return Err(anyhow!(
                "[health].readiness = \"stdout\" requires [health].ready_pattern"
            ));
        }
        (_, Some(pattern)) => {
            Regex::new(pattern)
                .with_context(|| format!("invalid [health].ready_pattern {:?}", pattern))?;
        }
        _ => {}
    }

    Ok(())
}

fn validate_watch(cfg: &ConfigFile) -> Result<()> {
    ExcludePatterns::compile(&cfg.watch.exclude).context("invalid [watch].exclude")?;
    Ok(())
}
