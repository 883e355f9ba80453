//! # Supervisor configuration.
//!
//! [`SupervisorConfig`] centralizes the timing and sizing knobs of the runtime.
//! It can be built by hand, from [`Default`], or derived from the persisted
//! [`AppSettings`] via [`SupervisorConfig::from_settings`].
//!
//! ## Stop sequence timing
//! ```text
//! stop(id) ──► interrupt ──► wait `grace` ──► kill tree ──► wait `kill_wait` ──► Stopped
//!        (skipped when force)
//! ```

use std::time::Duration;

use crate::logs::DEFAULT_LOG_CAPACITY;
use crate::notify::DEFAULT_MESSAGE_MAX_LEN;
use crate::store::AppSettings;

/// Runtime configuration for the supervisor.
#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    /// How long a graceful interrupt is given before the tree is killed.
    pub grace: Duration,

    /// Bounded wait after a forced kill.
    pub kill_wait: Duration,

    /// Pause between the stop and start halves of `restart`.
    pub restart_settle: Duration,

    /// Lines kept per process in the log store.
    pub log_capacity: usize,

    /// Capacity of the event bus ring buffer (min 1; clamped by Bus).
    ///
    /// Listeners lagging by more than this many events skip the oldest ones.
    pub bus_capacity: usize,

    /// Maximum alert message length, in characters.
    pub message_max_len: usize,

    /// Liveness polling period for adopted processes.
    pub adopt_poll_interval: Duration,
}

impl SupervisorConfig {
    /// Derives a configuration from persisted settings.
    ///
    /// Fields that have no persisted counterpart keep their defaults.
    pub fn from_settings(settings: &AppSettings) -> Self {
        let mut cfg = Self::default();
        if settings.max_log_lines_per_process > 0 {
            cfg.log_capacity = settings.max_log_lines_per_process;
        }
        cfg.grace = Duration::from_secs(settings.stop_grace_secs);
        cfg.kill_wait = Duration::from_secs(settings.kill_wait_secs.max(1));
        cfg
    }

    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for SupervisorConfig {
    /// - `grace = 5s`, `kill_wait = 5s`
    /// - `restart_settle = 500ms`
    /// - `log_capacity = 5000`
    /// - `bus_capacity = 4096`
    /// - `message_max_len = 150`
    /// - `adopt_poll_interval = 1s`
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(5),
            kill_wait: Duration::from_secs(5),
            restart_settle: Duration::from_millis(500),
            log_capacity: DEFAULT_LOG_CAPACITY,
            bus_capacity: 4096,
            message_max_len: DEFAULT_MESSAGE_MAX_LEN,
            adopt_poll_interval: Duration::from_secs(1),
        }
    }
}
