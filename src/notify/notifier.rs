//! # Notifier subscriber.
//!
//! Turns captured output and crash transitions into operator alerts and
//! publishes them as `Notification` events.
//!
//! ```text
//! LogAppended ──► source != System ──► mode != Off ──► classify ──► mode filter ──► throttle ──► Notification
//! StateChanged(Crashed) ──► mode != Off ─────────────────────────────────────────────────────► Notification(Critical)
//! ```
//!
//! Crash alerts never go through the throttle.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::time::Instant;
use uuid::Uuid;

use crate::events::{Bus, Event, EventKind};
use crate::model::{DefinitionId, DefinitionTable, LogEntry, LogSource, NotificationMode, ProcessInstance, ProcessState};
use crate::notify::{ProgressiveThrottle, classify};
use crate::subscribers::Subscribe;

/// Default maximum length of an alert message, in characters.
pub const DEFAULT_MESSAGE_MAX_LEN: usize = 150;

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationLevel {
    Warning,
    Error,
    Critical,
}

/// User-facing alert.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub process: DefinitionId,
    pub group_name: String,
    pub process_name: String,
    pub message: String,
    pub level: NotificationLevel,
    pub at: DateTime<Local>,
}

/// Classifies log lines and crash transitions into [`Notification`]s.
pub struct Notifier {
    table: Arc<DefinitionTable>,
    throttle: ProgressiveThrottle,
    bus: Bus,
    max_len: usize,
}

impl Notifier {
    pub fn new(table: Arc<DefinitionTable>, bus: Bus) -> Self {
        Self {
            table,
            throttle: ProgressiveThrottle::new(),
            bus,
            max_len: DEFAULT_MESSAGE_MAX_LEN,
        }
    }

    /// Overrides the maximum message length (min 1).
    pub fn with_message_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len.max(1);
        self
    }

    /// Handles one appended log line observed at `now`.
    ///
    /// Returns the published notification, if any.
    pub fn on_log_at(&self, entry: &LogEntry, now: Instant) -> Option<Notification> {
        if entry.source == LogSource::System {
            return None;
        }
        let mode = self.table.notification_mode(entry.process);
        if mode == NotificationMode::Off {
            return None;
        }
        let level = classify(&entry.text)?;
        if mode == NotificationMode::ErrorOnly && level == NotificationLevel::Warning {
            return None;
        }
        if !self.throttle.should_notify(entry.process, now) {
            tracing::debug!(process = %entry.process, "alert suppressed by throttle");
            return None;
        }
        let message = truncate(&entry.text, self.max_len);
        Some(self.publish(entry.process, message, level))
    }

    /// Handles one state change; only `Crashed` produces an alert.
    pub fn on_state_changed(&self, instance: &ProcessInstance) -> Option<Notification> {
        if instance.state != ProcessState::Crashed {
            return None;
        }
        if self.table.notification_mode(instance.definition_id) == NotificationMode::Off {
            return None;
        }
        let code = instance
            .last_exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "?".to_string());
        let message = format!("Process crashed (exit code: {code})");
        Some(self.publish(instance.definition_id, message, NotificationLevel::Critical))
    }

    fn publish(&self, process: DefinitionId, message: String, level: NotificationLevel) -> Notification {
        let (group_name, process_name) = self.table.display_names(process);
        let notification = Notification {
            id: Uuid::new_v4(),
            process,
            group_name,
            process_name,
            message,
            level,
            at: Local::now(),
        };
        self.bus.publish(Event::notification(notification.clone()));
        notification
    }
}

#[async_trait]
impl Subscribe for Notifier {
    async fn on_event(&self, event: &Event) {
        match event.kind {
            EventKind::LogAppended => {
                if let Some(entry) = &event.entry {
                    self.on_log_at(entry, Instant::now());
                }
            }
            EventKind::StateChanged => {
                if let Some(instance) = &event.instance {
                    self.on_state_changed(instance);
                }
            }
            _ => {}
        }
    }

    fn name(&self) -> &'static str {
        "notifier"
    }

    fn queue_capacity(&self) -> usize {
        4096
    }

    fn accepts(&self, kind: EventKind) -> bool {
        matches!(kind, EventKind::LogAppended | EventKind::StateChanged)
    }
}

fn truncate(text: &str, max_len: usize) -> String {
    match text.char_indices().nth(max_len) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
