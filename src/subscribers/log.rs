//! # LogWriter: renders bus events through `tracing`
//!
//! Enabled via the `logging` feature. Useful for headless runs and debugging:
//! every state change, alert and subscriber fault becomes one structured log
//! record. Captured process output is logged at `trace` level only.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO  procvisor: state changed process=6f1c… state=running pid=Some(4242)
//! WARN  procvisor: notification process=6f1c… level=error message="Unhandled exception"
//! ERROR procvisor: subscriber panicked subscriber="ui" info="boom"
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::notify::NotificationLevel;
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        match e.kind {
            EventKind::StateChanged => {
                if let Some(inst) = &e.instance {
                    tracing::info!(
                        process = %inst.definition_id,
                        state = %inst.state,
                        pid = ?inst.pid,
                        exit_code = ?inst.last_exit_code,
                        "state changed"
                    );
                }
            }
            EventKind::LogAppended => {
                if let Some(entry) = &e.entry {
                    tracing::trace!(process = %entry.process, source = ?entry.source, "{}", entry.text);
                }
            }
            EventKind::Notification => {
                if let Some(n) = &e.notification {
                    match n.level {
                        NotificationLevel::Critical | NotificationLevel::Error => {
                            tracing::warn!(process = %n.process, level = ?n.level, message = %n.message, "notification");
                        }
                        NotificationLevel::Warning => {
                            tracing::info!(process = %n.process, level = ?n.level, message = %n.message, "notification");
                        }
                    }
                }
            }
            EventKind::RestartRequested => {
                tracing::warn!(process = ?e.process, reason = ?e.reason, "restart requested");
            }
            EventKind::ShutdownRequested => {
                tracing::info!("shutdown requested");
            }
            EventKind::AllStopped => {
                tracing::info!("all processes stopped");
            }
            EventKind::SubscriberOverflow => {
                tracing::warn!(subscriber = ?e.subscriber, reason = ?e.reason, "subscriber overflow");
            }
            EventKind::SubscriberPanicked => {
                tracing::error!(
                    subscriber = e.subscriber.unwrap_or("unknown"),
                    info = e.reason.as_deref().unwrap_or("unknown"),
                    "subscriber panicked"
                );
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
