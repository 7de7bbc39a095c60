// src/refresh/mod.rs

//! Browser refresh signalling.
//!
//! Static asset changes do not restart the server; instead the server's
//! refresh endpoint is told to push a reload to connected browsers. The same
//! endpoint doubles as the default readiness probe (`type = "test"`).

pub mod notifier;

pub use notifier::{send_hot_refresh, HttpNotifier, Notifier, REFRESH_PATH};
