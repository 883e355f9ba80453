//! # Runtime events emitted by the supervisor, log store, prober and notifier.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Lifecycle events**: process state changes and captured log lines
//! - **Alert events**: notifications surfaced to the operator
//! - **Control events**: health-driven restart requests, shutdown
//! - **Subscriber events**: fan-out faults (panic, overflow)
//!
//! The [`Event`] struct carries the payload that belongs to its kind (an instance
//! snapshot, a log entry, a notification) plus a timestamp and sequence number.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use procvisor::{DefinitionId, Event, EventKind};
//!
//! let id = DefinitionId::new();
//! let ev = Event::new(EventKind::RestartRequested)
//!     .with_process(id)
//!     .with_reason("health check failed 3 times");
//!
//! assert_eq!(ev.kind, EventKind::RestartRequested);
//! assert_eq!(ev.process, Some(id));
//! assert_eq!(ev.reason.as_deref(), Some("health check failed 3 times"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::model::{DefinitionId, LogEntry, ProcessInstance};
use crate::notify::Notification;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `subscriber`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `subscriber`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Lifecycle events ===
    /// A process instance changed state.
    ///
    /// Sets:
    /// - `process`: definition id
    /// - `instance`: snapshot taken right after the transition
    StateChanged,

    /// A log line was appended to the log store.
    ///
    /// Sets:
    /// - `process`: definition id
    /// - `entry`: the appended entry
    LogAppended,

    // === Alert events ===
    /// The notifier decided to surface an alert.
    ///
    /// Sets:
    /// - `process`: definition id
    /// - `notification`: alert payload
    Notification,

    // === Control events ===
    /// A health check crossed its failure threshold.
    ///
    /// Sets:
    /// - `process`: definition id
    /// - `reason`: human-readable cause
    RestartRequested,

    /// Shutdown requested (OS signal observed or explicit call).
    ShutdownRequested,

    /// Every tracked process has been stopped.
    AllStopped,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Definition the event refers to, if any.
    pub process: Option<DefinitionId>,
    /// Instance snapshot (for `StateChanged`).
    pub instance: Option<Arc<ProcessInstance>>,
    /// Appended log line (for `LogAppended`).
    pub entry: Option<Arc<LogEntry>>,
    /// Alert payload (for `Notification`).
    pub notification: Option<Arc<Notification>>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Subscriber name (for subscriber events).
    pub subscriber: Option<&'static str>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            process: None,
            instance: None,
            entry: None,
            notification: None,
            reason: None,
            subscriber: None,
        }
    }

    /// Attaches a definition id.
    #[inline]
    pub fn with_process(mut self, id: DefinitionId) -> Self {
        self.process = Some(id);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// `StateChanged` event carrying a snapshot of `instance`.
    pub fn state_changed(instance: ProcessInstance) -> Self {
        let id = instance.definition_id;
        let mut ev = Event::new(EventKind::StateChanged).with_process(id);
        ev.instance = Some(Arc::new(instance));
        ev
    }

    /// `LogAppended` event carrying `entry`.
    pub fn log_appended(entry: Arc<LogEntry>) -> Self {
        let mut ev = Event::new(EventKind::LogAppended).with_process(entry.process);
        ev.entry = Some(entry);
        ev
    }

    /// `Notification` event carrying `notification`.
    pub fn notification(notification: Notification) -> Self {
        let mut ev = Event::new(EventKind::Notification).with_process(notification.process);
        ev.notification = Some(Arc::new(notification));
        ev
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        let mut ev = Event::new(EventKind::SubscriberOverflow)
            .with_reason(format!("subscriber={subscriber} reason={reason}"));
        ev.subscriber = Some(subscriber);
        ev
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        let mut ev = Event::new(EventKind::SubscriberPanicked).with_reason(info);
        ev.subscriber = Some(subscriber);
        ev
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }

    #[inline]
    pub fn is_subscriber_panic(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberPanicked)
    }
}
