// src/config/loader.rs

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::cli::CliArgs;
use crate::config::model::ConfigFile;

/// Load a configuration file from a given path.
///
/// This only performs TOML deserialization; semantic checks live in
/// [`crate::config::validate_config`].
pub fn load_from_path(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading config file at {:?}", path))?;

    let config: ConfigFile = toml::from_str(&contents)
        .with_context(|| format!("parsing TOML config from {:?}", path))?;

    Ok(config)
}

/// Like [`load_from_path`], but a missing file yields the built-in defaults.
pub fn load_or_default(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    if !path.exists() {
        debug!(?path, "no config file found; using defaults");
        return Ok(ConfigFile::default());
    }
    load_from_path(path)
}

/// Apply command-line overrides on top of a loaded config.
pub fn apply_cli_overrides(cfg: &mut ConfigFile, args: &CliArgs) {
    if let Some(ref command) = args.command {
        cfg.server.command = command.clone();
    }
    if let Some(ref port) = args.port {
        cfg.server.port = port.clone();
    }
    if let Some(ref root) = args.root {
        cfg.watch.root = root.clone();
    }
    if args.no_watch {
        cfg.watch.enabled = false;
    }
    if let Some(ms) = args.debounce_ms {
        cfg.watch.debounce_ms = ms;
    }
    if let Some(n) = args.retries {
        cfg.restart.max_attempts = n;
    }
    if args.interactive {
        cfg.console.interactive = true;
    }
}
