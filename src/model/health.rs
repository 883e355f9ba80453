//! # Health-check configuration.
//!
//! Only [`HealthCheckKind::HttpEndpoint`] and [`HealthCheckKind::TcpPort`] are
//! actively probed. [`HealthCheckKind::ProcessRunning`] relies on the exit
//! callback alone, so no timer is registered for it.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Kind of liveness probe.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HealthCheckKind {
    /// Liveness implied by the process still running.
    #[default]
    ProcessRunning,
    /// HTTP GET; any success status is healthy.
    HttpEndpoint,
    /// TCP connect to `localhost:<port>`.
    TcpPort,
}

/// Probe settings for one definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HealthCheckConfig {
    #[serde(rename = "type")]
    pub kind: HealthCheckKind,
    /// Target URL for HTTP probes.
    pub url: Option<String>,
    /// Target port for TCP probes.
    pub port: u16,
    pub interval_secs: u64,
    pub timeout_secs: u64,
    /// Consecutive failures before a restart is requested.
    pub unhealthy_threshold: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            kind: HealthCheckKind::ProcessRunning,
            url: None,
            port: 0,
            interval_secs: 30,
            timeout_secs: 5,
            unhealthy_threshold: 3,
        }
    }
}

impl HealthCheckConfig {
    /// HTTP probe against `url`.
    pub fn http(url: impl Into<String>) -> Self {
        Self {
            kind: HealthCheckKind::HttpEndpoint,
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// TCP probe against `localhost:port`.
    pub fn tcp(port: u16) -> Self {
        Self {
            kind: HealthCheckKind::TcpPort,
            port,
            ..Self::default()
        }
    }

    #[inline]
    pub fn with_interval(mut self, secs: u64) -> Self {
        self.interval_secs = secs;
        self
    }

    #[inline]
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    #[inline]
    pub fn with_threshold(mut self, n: u32) -> Self {
        self.unhealthy_threshold = n;
        self
    }

    /// True for kinds that get a probe timer.
    pub fn is_active(&self) -> bool {
        !matches!(self.kind, HealthCheckKind::ProcessRunning)
    }

    /// Tick interval, never below one second.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    /// Per-probe timeout, never below one second.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Escalation threshold, never below one.
    pub fn threshold(&self) -> u32 {
        self.unhealthy_threshold.max(1)
    }
}
