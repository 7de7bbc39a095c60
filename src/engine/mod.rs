// src/engine/mod.rs

//! Orchestration engine for rekindle.
//!
//! This module ties together:
//! - the bounded, coalescing restart queue
//! - the restart worker that drains it one cycle at a time
//! - the health monitor that re-enqueues a restart when the server dies
//! - the main runtime event loop that reacts to:
//!   - debounced file changes
//!   - console commands
//!   - shutdown signals

pub mod health;
pub mod queue;
pub mod runtime;
pub mod worker;

pub use health::{check_once, spawn_health_monitor, HEALTH_FAILURE_REASON};
pub use queue::{
    coalesce_latest, restart_queue, RestartQueue, RestartReceiver, RestartRequest,
    DEFAULT_QUEUE_CAPACITY,
};
pub use runtime::{Runtime, RuntimeEvent};
pub use worker::{spawn_restart_worker, teardown};
