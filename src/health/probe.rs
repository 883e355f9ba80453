//! Single-shot health probes.
//!
//! [`Probe`] is the seam between the scheduler and the network; [`NetProbe`]
//! is the production implementation (HTTP via `reqwest`, TCP via `tokio::net`).

use async_trait::async_trait;
use tokio::net::TcpStream;

use crate::error::ProbeError;
use crate::model::{HealthCheckConfig, HealthCheckKind};

/// Performs one health probe.
///
/// Timeouts are applied by the caller; implementations only report the outcome.
#[async_trait]
pub trait Probe: Send + Sync + 'static {
    async fn check(&self, config: &HealthCheckConfig) -> Result<(), ProbeError>;
}

/// HTTP/TCP probe.
#[derive(Clone, Debug, Default)]
pub struct NetProbe {
    client: reqwest::Client,
}

impl NetProbe {
    pub fn new() -> Self {
        Self::default()
    }

    async fn http(&self, url: &str) -> Result<(), ProbeError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProbeError::Transport { error: e.to_string() })?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ProbeError::Status { status: status.as_u16() })
        }
    }

    async fn tcp(&self, port: u16) -> Result<(), ProbeError> {
        TcpStream::connect(("localhost", port))
            .await
            .map(drop)
            .map_err(|e| ProbeError::Transport { error: e.to_string() })
    }
}

#[async_trait]
impl Probe for NetProbe {
    async fn check(&self, config: &HealthCheckConfig) -> Result<(), ProbeError> {
        match config.kind {
            HealthCheckKind::ProcessRunning => Ok(()),
            HealthCheckKind::HttpEndpoint => match config.url.as_deref().map(str::trim) {
                None | Some("") => Ok(()),
                Some(url) => self.http(url).await,
            },
            HealthCheckKind::TcpPort => self.tcp(config.port).await,
        }
    }
}
