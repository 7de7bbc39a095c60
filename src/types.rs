use std::fmt;
use std::path::PathBuf;

use serde::Deserialize;

/// What a file change asks the supervisor to do.
///
/// - `Reload`: the running code or config is stale, restart the child.
/// - `Refresh`: only static assets changed, signal the browser to refresh.
/// - `Ignored`: noise (temp files, build output, unwatched extensions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeClass {
    Reload,
    Refresh,
    Ignored,
}

impl fmt::Display for ChangeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeClass::Reload => f.write_str("reload"),
            ChangeClass::Refresh => f.write_str("refresh"),
            ChangeClass::Ignored => f.write_str("ignored"),
        }
    }
}

/// Kind of filesystem change that survived event-kind filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Write,
    Create,
}

/// A single qualifying filesystem change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub kind: WatchEventKind,
}

impl WatchEvent {
    pub fn new(path: impl Into<PathBuf>, kind: WatchEventKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// How the supervisor decides that a freshly launched child is serving.
///
/// - `Http`: the refresh endpoint answers a `test` signal with 200 (default).
/// - `Tcp`: the port accepts a TCP connection.
/// - `Stdout`: a stdout line of the child matches `ready_pattern`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReadinessMode {
    #[default]
    Http,
    Tcp,
    Stdout,
}

/// Signal type carried in the JSON body sent to the refresh endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    HotRefresh,
    Test,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::HotRefresh => "hot-refresh",
            SignalKind::Test => "test",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
