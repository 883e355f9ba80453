//! # Progressive alert throttle.
//!
//! Tracks one error streak per process. The first error of a streak always
//! passes; later ones pass only once a cooldown has elapsed since the last
//! alert that went through. The cooldown grows with the streak length.
//!
//! ```text
//! streak position   1      2      3      4+
//! cooldown          0s     10s    30s    60s
//! ```
//!
//! More than 60s without an error ends the streak; the next error starts a
//! new one.

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::model::DefinitionId;

/// Silence after which a streak is considered over.
pub const STREAK_RESET: Duration = Duration::from_secs(60);

#[derive(Debug, Default, Clone, Copy)]
struct ThrottleState {
    consecutive: u32,
    last_error: Option<Instant>,
    last_notification: Option<Instant>,
}

/// Per-process progressive throttle.
#[derive(Debug, Default)]
pub struct ProgressiveThrottle {
    states: DashMap<DefinitionId, ThrottleState>,
}

impl ProgressiveThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one error at `now` and reports whether it may be surfaced.
    pub fn should_notify(&self, process: DefinitionId, now: Instant) -> bool {
        let mut state = self.states.entry(process).or_default();

        if let Some(last) = state.last_error {
            if now.saturating_duration_since(last) > STREAK_RESET {
                state.consecutive = 0;
                state.last_notification = None;
            }
        }
        state.last_error = Some(now);
        state.consecutive = state.consecutive.saturating_add(1);

        if state.consecutive == 1 {
            state.last_notification = Some(now);
            return true;
        }

        let cooldown = cooldown_for(state.consecutive);
        if let Some(last) = state.last_notification {
            if now.saturating_duration_since(last) < cooldown {
                return false;
            }
        }
        state.last_notification = Some(now);
        true
    }

    /// Current streak length for `process`.
    pub fn streak(&self, process: DefinitionId) -> u32 {
        self.states.get(&process).map(|s| s.consecutive).unwrap_or(0)
    }

    /// Forgets the streak of `process`.
    pub fn reset(&self, process: DefinitionId) {
        self.states.remove(&process);
    }
}

fn cooldown_for(position: u32) -> Duration {
    match position {
        0 | 1 => Duration::ZERO,
        2 => Duration::from_secs(10),
        3 => Duration::from_secs(30),
        _ => Duration::from_secs(60),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn first_error_passes_immediately() {
        let t = ProgressiveThrottle::new();
        let id = DefinitionId::new();
        assert!(t.should_notify(id, Instant::now()));
        assert_eq!(t.streak(id), 1);
    }

    #[test]
    fn cooldown_grows_with_streak() {
        let t = ProgressiveThrottle::new();
        let id = DefinitionId::new();
        let t0 = Instant::now();

        assert!(t.should_notify(id, t0));
        // 2nd error needs 10s since the last alert
        assert!(!t.should_notify(id, t0 + secs(5)));
        // 3rd error: 30s cooldown, only 12s elapsed
        assert!(!t.should_notify(id, t0 + secs(12)));
        // 4th error: 60s cooldown, 40s elapsed
        assert!(!t.should_notify(id, t0 + secs(40)));
        // 5th error at 60s: passes
        assert!(t.should_notify(id, t0 + secs(60)));
        // 6th error right after: suppressed again
        assert!(!t.should_notify(id, t0 + secs(61)));
    }

    #[test]
    fn second_error_after_ten_seconds_passes() {
        let t = ProgressiveThrottle::new();
        let id = DefinitionId::new();
        let t0 = Instant::now();

        assert!(t.should_notify(id, t0));
        assert!(t.should_notify(id, t0 + secs(10)));
        assert!(!t.should_notify(id, t0 + secs(20)));
        assert!(t.should_notify(id, t0 + secs(40)));
    }

    #[test]
    fn silence_starts_fresh_streak() {
        let t = ProgressiveThrottle::new();
        let id = DefinitionId::new();
        let t0 = Instant::now();

        assert!(t.should_notify(id, t0));
        assert!(!t.should_notify(id, t0 + secs(1)));
        assert!(t.should_notify(id, t0 + secs(62)));
        assert_eq!(t.streak(id), 1);
    }

    #[test]
    fn streaks_are_per_process() {
        let t = ProgressiveThrottle::new();
        let a = DefinitionId::new();
        let b = DefinitionId::new();
        let t0 = Instant::now();

        assert!(t.should_notify(a, t0));
        assert!(t.should_notify(b, t0 + secs(1)));
        assert!(!t.should_notify(a, t0 + secs(2)));

        t.reset(a);
        assert!(t.should_notify(a, t0 + secs(3)));
    }
}
