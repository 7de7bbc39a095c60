#![allow(dead_code)]

use rekindle::config::{ConfigFile, Settings};
use rekindle::types::ReadinessMode;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: ConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: ConfigFile::default(),
        }
    }

    pub fn with_command(mut self, command: &str) -> Self {
        self.config.server.command = command.to_string();
        self
    }

    pub fn with_port(mut self, port: &str) -> Self {
        self.config.server.port = port.to_string();
        self
    }

    pub fn with_framework(mut self, framework: &str) -> Self {
        self.config.server.framework = framework.to_string();
        self
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.config.server.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_preflight(mut self, command: Option<&str>) -> Self {
        self.config.build.preflight = command.map(str::to_string);
        self
    }

    pub fn with_root(mut self, root: &str) -> Self {
        self.config.watch.root = root.to_string();
        self
    }

    pub fn with_exclude(mut self, pattern: &str) -> Self {
        self.config.watch.exclude.push(pattern.to_string());
        self
    }

    pub fn with_debounce_ms(mut self, ms: u64) -> Self {
        self.config.watch.debounce_ms = ms;
        self
    }

    pub fn with_max_attempts(mut self, n: u32) -> Self {
        self.config.restart.max_attempts = n;
        self
    }

    pub fn with_queue_capacity(mut self, n: usize) -> Self {
        self.config.restart.queue_capacity = n;
        self
    }

    pub fn with_readiness(mut self, mode: ReadinessMode, pattern: Option<&str>) -> Self {
        self.config.health.readiness = mode;
        self.config.health.ready_pattern = pattern.map(str::to_string);
        self
    }

    pub fn build(self) -> ConfigFile {
        self.config
    }

    pub fn build_settings(self) -> Settings {
        Settings::try_from(self.config).expect("Failed to build valid settings from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
