// src/errors.rs

//! Crate-wide error type and result alias.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Watch error: {0}")]
    WatchError(#[from] notify::Error),

    #[error("No directory under {0:?} could be watched")]
    NothingToWatch(PathBuf),

    #[error("Invalid port: {0}")]
    InvalidPort(String),

    #[error("Preflight check failed: {0}")]
    PreflightFailed(String),

    #[error("Launch failed: {0}")]
    LaunchFailed(String),

    #[error("Refresh signal failed: {0}")]
    NotifyError(#[from] reqwest::Error),

    #[error("Refresh endpoint answered with status {0}")]
    RefreshRejected(u16),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, SupervisorError>;
