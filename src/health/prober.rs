//! # Health-check scheduler.
//!
//! [`HealthProber`] runs one timer task per registered definition. Every tick
//! performs one bounded probe; consecutive failures accumulate and, on reaching
//! the configured threshold, a `RestartRequested` event is published and the
//! counter starts over.
//!
//! ```text
//! register(id, cfg) ──► spawn check loop ──► tick(interval) ──► timeout(probe) ──┬─ Ok  ─► failures = 0
//!                                                                                └─ Err ─► failures += 1
//!                                                                                          └─ >= threshold ─► publish RestartRequested, failures = 0
//! ```
//!
//! ## Rules
//! - Only `HttpEndpoint` and `TcpPort` configs are scheduled.
//! - `register` replaces any existing check for the same id.
//! - `unregister` is a no-op for unknown ids.
//! - The first probe runs one interval after registration.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::DashMap;
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout};
use tokio_util::sync::CancellationToken;

use crate::error::ProbeError;
use crate::events::{Bus, Event, EventKind};
use crate::health::Probe;
use crate::model::{DefinitionId, HealthCheckConfig};

struct CheckHandle {
    token: CancellationToken,
    failures: Arc<AtomicU32>,
}

/// Periodic health checks for running processes.
pub struct HealthProber {
    checks: DashMap<DefinitionId, CheckHandle>,
    probe: Arc<dyn Probe>,
    bus: Bus,
    token: CancellationToken,
}

impl HealthProber {
    pub fn new(probe: Arc<dyn Probe>, bus: Bus) -> Self {
        Self {
            checks: DashMap::new(),
            probe,
            bus,
            token: CancellationToken::new(),
        }
    }

    /// Starts (or restarts) the check loop for `id`.
    ///
    /// Inactive kinds only clear a previous registration.
    pub fn register(&self, id: DefinitionId, config: &HealthCheckConfig) {
        if !config.is_active() {
            self.unregister(id);
            return;
        }
        let token = self.token.child_token();
        let failures = Arc::new(AtomicU32::new(0));
        let previous = self.checks.insert(
            id,
            CheckHandle {
                token: token.clone(),
                failures: Arc::clone(&failures),
            },
        );
        if let Some(old) = previous {
            old.token.cancel();
        }

        tracing::debug!(process = %id, kind = ?config.kind, interval = ?config.interval(), "health check registered");
        tokio::spawn(check_loop(
            id,
            config.clone(),
            Arc::clone(&self.probe),
            self.bus.clone(),
            failures,
            token,
        ));
    }

    /// Stops the check loop for `id`, if any.
    pub fn unregister(&self, id: DefinitionId) {
        if let Some((_, handle)) = self.checks.remove(&id) {
            handle.token.cancel();
            tracing::debug!(process = %id, "health check unregistered");
        }
    }

    /// Current consecutive-failure count, `None` when not registered.
    pub fn failures(&self, id: DefinitionId) -> Option<u32> {
        self.checks.get(&id).map(|h| h.failures.load(Ordering::Acquire))
    }

    pub fn is_registered(&self, id: DefinitionId) -> bool {
        self.checks.contains_key(&id)
    }

    /// Stops every check loop.
    pub fn shutdown(&self) {
        self.token.cancel();
        self.checks.clear();
    }
}

impl Drop for HealthProber {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn check_loop(
    id: DefinitionId,
    config: HealthCheckConfig,
    probe: Arc<dyn Probe>,
    bus: Bus,
    failures: Arc<AtomicU32>,
    token: CancellationToken,
) {
    let period = config.interval();
    let limit = config.timeout();
    let threshold = config.threshold();
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let outcome = tokio::select! {
            _ = token.cancelled() => break,
            res = timeout(limit, probe.check(&config)) => {
                res.unwrap_or(Err(ProbeError::Timeout { timeout: limit }))
            }
        };

        match outcome {
            Ok(()) => failures.store(0, Ordering::Release),
            Err(err) => {
                let streak = failures.fetch_add(1, Ordering::AcqRel) + 1;
                tracing::debug!(process = %id, streak, threshold, error = %err, label = err.as_label(), "health probe failed");
                if streak >= threshold {
                    failures.store(0, Ordering::Release);
                    tracing::warn!(process = %id, streak, "health check threshold reached, requesting restart");
                    bus.publish(
                        Event::new(EventKind::RestartRequested)
                            .with_process(id)
                            .with_reason(format!("health check failed {streak} times: {err}")),
                    );
                }
            }
        }
    }
}
