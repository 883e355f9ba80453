//! # Bounded auto-restart policy.
//!
//! [`RestartPolicy`] decides whether a crashed process is relaunched, and
//! [`RestartWindow`] keeps the per-process bookkeeping that caps restart storms.
//!
//! ## Algorithm
//! ```text
//! crash at `now`
//!   ├─► window never started, or now - window_start > window
//!   │       → count = 0, window_start = now
//!   ├─► count >= max_attempts → Exhausted (no restart)
//!   └─► count += 1 → Restart { attempt: count } after `delay`
//! ```
//!
//! A process that keeps crashing is restarted at most `max_attempts` times per
//! window; once it has been stable for longer than the window, it gets a fresh
//! budget.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use procvisor::{RestartDecision, RestartPolicy, RestartWindow};
//! use tokio::time::Instant;
//!
//! let policy = RestartPolicy { enabled: true, max_attempts: 2, delay_secs: 1, window_minutes: 10 };
//! let mut window = RestartWindow::default();
//! let t0 = Instant::now();
//!
//! assert_eq!(window.admit(&policy, t0), RestartDecision::Restart { attempt: 1 });
//! assert_eq!(window.admit(&policy, t0), RestartDecision::Restart { attempt: 2 });
//! assert_eq!(window.admit(&policy, t0), RestartDecision::Exhausted);
//! // Past the window the budget is fresh again.
//! let later = t0 + Duration::from_secs(11 * 60);
//! assert_eq!(window.admit(&policy, later), RestartDecision::Restart { attempt: 1 });
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Crash recovery settings of one definition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RestartPolicy {
    /// Restart automatically after a crash.
    pub enabled: bool,
    /// Restarts allowed inside one window.
    pub max_attempts: u32,
    /// Wait before each restart.
    pub delay_secs: u64,
    /// Length of the sliding window.
    pub window_minutes: u64,
}

impl Default for RestartPolicy {
    /// `enabled`, 3 attempts, 5s delay, 10 minute window.
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            delay_secs: 5,
            window_minutes: 10,
        }
    }
}

impl RestartPolicy {
    /// Policy that never restarts.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    #[inline]
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }

    #[inline]
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_minutes.saturating_mul(60))
    }
}

/// Outcome of [`RestartWindow::admit`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestartDecision {
    /// Restart; `attempt` is 1-based within the current window.
    Restart { attempt: u32 },
    /// Budget for this window is spent.
    Exhausted,
}

/// Restart counter plus the start of its window.
#[derive(Clone, Copy, Debug, Default)]
pub struct RestartWindow {
    count: u32,
    started: Option<Instant>,
}

impl RestartWindow {
    /// Applies one crash at `now` and decides whether to restart.
    pub fn admit(&mut self, policy: &RestartPolicy, now: Instant) -> RestartDecision {
        let expired = match self.started {
            None => true,
            Some(start) => now.saturating_duration_since(start) > policy.window(),
        };
        if expired {
            self.count = 0;
            self.started = Some(now);
        }

        if self.count >= policy.max_attempts {
            return RestartDecision::Exhausted;
        }
        self.count += 1;
        RestartDecision::Restart {
            attempt: self.count,
        }
    }

    /// Restarts counted in the current window.
    #[inline]
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Start of the current window, if one is open.
    #[inline]
    pub fn started(&self) -> Option<Instant> {
        self.started
    }
}
