//! Health checking.
//!
//! - [`Probe`] / [`NetProbe`] one bounded HTTP or TCP check
//! - [`HealthProber`] per-definition timers escalating to `RestartRequested`

mod probe;
mod prober;

pub use probe::{NetProbe, Probe};
pub use prober::HealthProber;
