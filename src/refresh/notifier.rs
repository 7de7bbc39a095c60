// src/refresh/notifier.rs

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::errors::{Result, SupervisorError};
use crate::exec::backend::BoxFuture;
use crate::types::SignalKind;

/// Path of the refresh endpoint exposed by the supervised server.
pub const REFRESH_PATH: &str = "/api/hot-refresh";

/// Sends refresh signals to the supervised server.
pub trait Notifier: Send + Sync {
    /// Deliver `kind` to the server listening on `port`.
    ///
    /// `Ok(())` means the endpoint answered 200.
    fn signal(&self, port: u16, kind: SignalKind) -> BoxFuture<'_, Result<()>>;
}

#[derive(Debug, Serialize)]
struct SignalBody {
    #[serde(rename = "type")]
    kind: &'static str,
}

/// POSTs `{"type": "..."}` to `http://127.0.0.1:<port>/api/hot-refresh`.
#[derive(Debug, Clone)]
pub struct HttpNotifier {
    client: reqwest::Client,
    host: String,
}

impl HttpNotifier {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(request_timeout)
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            client,
            host: "127.0.0.1".to_string(),
        })
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn endpoint(&self, port: u16) -> String {
        format!("http://{}:{port}{REFRESH_PATH}", self.host)
    }
}

impl Notifier for HttpNotifier {
    fn signal(&self, port: u16, kind: SignalKind) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let url = self.endpoint(port);
            let body = SignalBody {
                kind: kind.as_str(),
            };

            let response = self.client.post(&url).json(&body).send().await?;
            let status = response.status();
            if status == reqwest::StatusCode::OK {
                debug!(%url, signal = %kind, "refresh signal delivered");
                Ok(())
            } else {
                Err(SupervisorError::RefreshRejected(status.as_u16()))
            }
        })
    }
}

/// Send a hot-refresh signal and log the result; failures are never
/// propagated.
pub async fn send_hot_refresh(notifier: &dyn Notifier, port: u16) -> bool {
    match notifier.signal(port, SignalKind::HotRefresh).await {
        Ok(()) => {
            debug!(port, "browser refresh signalled");
            true
        }
        Err(err) => {
            warn!(port, error = %err, "hot-refresh signal failed");
            false
        }
    }
}
