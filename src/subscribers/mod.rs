//! # Event subscribers.
//!
//! This module provides the [`Subscribe`] trait and the [`SubscriberSet`] that
//! fans bus events out to every subscriber through its own bounded queue.
//!
//! ## Architecture
//! ```text
//! Supervisor / LogStore / HealthProber ── publish(Event) ──► Bus
//!                                                             │
//!                                              subscriber_listener (Supervisor)
//!                                                             │
//!                                                     SubscriberSet::emit
//!                                              ┌──────────────┼──────────────┐
//!                                              ▼              ▼              ▼
//!                                          Notifier       LogWriter      UI bridge
//! ```
//!
//! ## Implementing custom subscribers
//! ```no_run
//! use procvisor::{Event, EventKind, Subscribe};
//! use async_trait::async_trait;
//!
//! struct CrashCounter;
//!
//! #[async_trait]
//! impl Subscribe for CrashCounter {
//!     async fn on_event(&self, event: &Event) {
//!         if event.kind == EventKind::StateChanged {
//!             // inspect event.instance ...
//!         }
//!     }
//!     fn name(&self) -> &'static str { "crash-counter" }
//! }
//! ```

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
