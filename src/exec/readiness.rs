// src/exec/readiness.rs

//! Readiness probes used while waiting for a fresh instance.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;

use crate::exec::backend::{BoxFuture, ReadinessProbe, ServerProcess};
use crate::refresh::Notifier;
use crate::types::SignalKind;

/// Ready once the refresh endpoint answers a `test` signal with 200.
pub struct HttpReadiness {
    notifier: Arc<dyn Notifier>,
}

impl HttpReadiness {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }
}

impl ReadinessProbe for HttpReadiness {
    fn is_ready(&self, port: u16, _process: &dyn ServerProcess) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            match self.notifier.signal(port, SignalKind::Test).await {
                Ok(()) => true,
                Err(err) => {
                    trace!(port, error = %err, "readiness probe not answered yet");
                    false
                }
            }
        })
    }
}

/// Ready once the port accepts a TCP connection.
#[derive(Debug, Clone)]
pub struct TcpReadiness {
    connect_timeout: Duration,
}

impl TcpReadiness {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TcpReadiness {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

impl ReadinessProbe for TcpReadiness {
    fn is_ready(&self, port: u16, _process: &dyn ServerProcess) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            matches!(
                timeout(
                    self.connect_timeout,
                    TcpStream::connect((Ipv4Addr::LOCALHOST, port))
                )
                .await,
                Ok(Ok(_))
            )
        })
    }
}

/// Ready once a stdout line of the child matched the ready pattern.
#[derive(Debug, Clone, Default)]
pub struct StdoutReadiness;

impl ReadinessProbe for StdoutReadiness {
    fn is_ready(&self, _port: u16, process: &dyn ServerProcess) -> BoxFuture<'_, bool> {
        let ready = process.saw_ready_line();
        Box::pin(async move { ready })
    }
}
