// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::types::ReadinessMode;

/// Top-level configuration as read from `Rekindle.toml`.
///
/// ```toml
/// [server]
/// command = "go run ."
/// port = ":3000"
/// framework = "app"
///
/// [build]
/// preflight = "go vet ./..."
///
/// [watch]
/// debounce_ms = 300
/// exclude = ["**/*_test.go"]
///
/// [restart]
/// max_attempts = 3
///
/// [health]
/// readiness = "tcp"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub build: BuildSection,

    #[serde(default)]
    pub watch: WatchSection,

    #[serde(default)]
    pub restart: RestartSection,

    #[serde(default)]
    pub health: HealthSection,

    #[serde(default)]
    pub console: ConsoleSection,
}

/// `[server]` section: how to launch the supervised process.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    /// Shell command that starts the server.
    #[serde(default = "default_command")]
    pub command: String,

    /// Desired port; a leading `:` is accepted and stripped.
    #[serde(default = "default_port")]
    pub port: String,

    /// Framework name used as prefix for the dev-mode environment flags
    /// (`<FRAMEWORK>_PORT`, `<FRAMEWORK>_DEBUG`, ...).
    #[serde(default = "default_framework")]
    pub framework: String,

    /// Extra environment variables for the child, applied last.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_command() -> String {
    "go run .".to_string()
}

fn default_port() -> String {
    "3000".to_string()
}

fn default_framework() -> String {
    "app".to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            command: default_command(),
            port: default_port(),
            framework: default_framework(),
            env: BTreeMap::new(),
        }
    }
}

/// `[build]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildSection {
    /// Command that verifies the project compiles without running it.
    ///
    /// An empty string disables the preflight check.
    #[serde(default = "default_preflight")]
    pub preflight: Option<String>,
}

fn default_preflight() -> Option<String> {
    Some("go vet ./...".to_string())
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            preflight: default_preflight(),
        }
    }
}

/// `[watch]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchSection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Project root, relative to the working directory.
    #[serde(default = "default_root")]
    pub root: String,

    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Conventional subdirectories registered in addition to the root.
    #[serde(default = "default_dirs")]
    pub dirs: Vec<String>,

    /// Extra glob patterns (relative to the root) whose changes are ignored.
    #[serde(default)]
    pub exclude: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_root() -> String {
    ".".to_string()
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_dirs() -> Vec<String> {
    ["views", "templates", "static", "public", "assets"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            enabled: true,
            root: default_root(),
            debounce_ms: default_debounce_ms(),
            dirs: default_dirs(),
            exclude: Vec::new(),
        }
    }
}

/// `[restart]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RestartSection {
    /// Launch attempts per retry pass.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Bounded capacity of the restart queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Minimum time between two completed restarts.
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_queue_capacity() -> usize {
    10
}

fn default_min_interval_ms() -> u64 {
    2000
}

impl Default for RestartSection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            queue_capacity: default_queue_capacity(),
            min_interval_ms: default_min_interval_ms(),
        }
    }
}

/// `[health]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthSection {
    /// Liveness poll interval of the running child.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    #[serde(default)]
    pub readiness: ReadinessMode,

    /// Regex matched against child stdout when `readiness = "stdout"`.
    #[serde(default)]
    pub ready_pattern: Option<String>,

    /// How long a fresh child has to become ready.
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,
}

fn default_interval_secs() -> u64 {
    30
}

fn default_startup_timeout_secs() -> u64 {
    10
}

impl Default for HealthSection {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            readiness: ReadinessMode::default(),
            ready_pattern: None,
            startup_timeout_secs: default_startup_timeout_secs(),
        }
    }
}

/// `[console]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ConsoleSection {
    #[serde(default)]
    pub interactive: bool,
}
