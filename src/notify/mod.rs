//! # Failure alerts.
//!
//! - [`classify`] maps an output line to a [`NotificationLevel`]
//! - [`ProgressiveThrottle`] per-process streak cooldowns
//! - [`Notifier`] subscriber publishing [`Notification`] events

mod classify;
mod notifier;
mod throttle;

pub use classify::classify;
pub use notifier::{DEFAULT_MESSAGE_MAX_LEN, Notification, NotificationLevel, Notifier};
pub use throttle::{ProgressiveThrottle, STREAK_RESET};
