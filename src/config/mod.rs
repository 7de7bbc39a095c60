// src/config/mod.rs

//! Configuration loading and validation for rekindle.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk, falling back to defaults (`loader.rs`).
//! - Validate basic invariants (`validate.rs`).
//! - Resolve the raw model into typed [`Settings`] (`settings.rs`).

pub mod loader;
pub mod model;
pub mod settings;
pub mod validate;

pub use loader::{apply_cli_overrides, load_from_path, load_or_default};
pub use model::{
    BuildSection, ConfigFile, ConsoleSection, HealthSection, RestartSection, ServerSection,
    WatchSection,
};
pub use settings::{Settings, Timings};
pub use validate::validate_config;
