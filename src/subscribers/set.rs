//! # Per-subscriber lanes.
//!
//! [`SubscriberSet`] gives every subscriber its own lane: a kind filter, a
//! bounded queue and one worker draining it.
//!
//! ```text
//! emit(event) ─┬─ accepts? ─► [queue: notifier ] ─► worker ─► on_event
//!              ├─ accepts? ─► [queue: LogWriter] ─► worker ─► on_event
//!              └─ accepts? ─► [queue: ui       ] ─► worker ─► on_event
//!                    │
//!                    └─ full/closed ─► drop for this lane, count it,
//!                                      publish SubscriberOverflow
//! ```
//!
//! `emit` never waits. Ordering holds per lane only. A panic in `on_event` is
//! caught, published as `SubscriberPanicked`, and the worker moves on to the
//! next event. Overflow and panic reports are never re-reported when they
//! themselves overflow.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::events::{Bus, Event, EventKind};
use crate::subscribers::Subscribe;

struct Lane {
    sub: Arc<dyn Subscribe>,
    tx: mpsc::Sender<Arc<Event>>,
    dropped: AtomicU64,
}

/// Fan-out of bus events to a fixed list of subscribers.
pub struct SubscriberSet {
    lanes: Vec<Lane>,
    workers: JoinSet<()>,
    bus: Bus,
}

impl SubscriberSet {
    /// Opens one lane per subscriber.
    ///
    /// Must be called inside a Tokio runtime.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let mut workers = JoinSet::new();
        let lanes = subs
            .into_iter()
            .map(|sub| {
                let (tx, rx) = mpsc::channel(sub.queue_capacity().max(1));
                workers.spawn(drain(Arc::clone(&sub), rx, bus.clone()));
                Lane {
                    sub,
                    tx,
                    dropped: AtomicU64::new(0),
                }
            })
            .collect();
        Self { lanes, workers, bus }
    }

    /// Queues a copy of `event` on every accepting lane.
    pub fn emit(&self, event: &Event) {
        self.emit_arc(Arc::new(event.clone()));
    }

    pub fn emit_arc(&self, event: Arc<Event>) {
        let meta = matches!(
            event.kind,
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
        );
        for lane in &self.lanes {
            if !lane.sub.accepts(event.kind) {
                continue;
            }
            let reason = match lane.tx.try_send(Arc::clone(&event)) {
                Ok(()) => continue,
                Err(mpsc::error::TrySendError::Full(_)) => "full",
                Err(mpsc::error::TrySendError::Closed(_)) => "closed",
            };
            let total = lane.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if total == 1 {
                tracing::warn!(subscriber = lane.sub.name(), reason, "subscriber started dropping events");
            } else {
                tracing::debug!(subscriber = lane.sub.name(), reason, total, "subscriber dropped event");
            }
            if !meta {
                self.bus.publish(Event::subscriber_overflow(lane.sub.name(), reason));
            }
        }
    }

    /// Events dropped so far for the subscriber called `name`.
    pub fn dropped(&self, name: &str) -> u64 {
        self.lanes
            .iter()
            .filter(|l| l.sub.name() == name)
            .map(|l| l.dropped.load(Ordering::Relaxed))
            .sum()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lanes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    /// Closes every lane and waits until the workers have drained them.
    pub async fn shutdown(self) {
        let Self { lanes, mut workers, .. } = self;
        drop(lanes);
        while workers.join_next().await.is_some() {}
    }
}

async fn drain(sub: Arc<dyn Subscribe>, mut rx: mpsc::Receiver<Arc<Event>>, bus: Bus) {
    while let Some(ev) = rx.recv().await {
        let handled = std::panic::AssertUnwindSafe(sub.on_event(&ev))
            .catch_unwind()
            .await;
        if let Err(payload) = handled {
            let info = panic_message(payload.as_ref());
            tracing::error!(subscriber = sub.name(), panic = %info, "subscriber panicked");
            bus.publish(Event::subscriber_panicked(sub.name(), info));
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
