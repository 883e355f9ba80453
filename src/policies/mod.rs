//! Restart policies.
//!
//! This module groups the knobs that control **if/when** a crashed process is
//! relaunched.
//!
//! ## Contents
//! - [`RestartPolicy`] per-definition settings (enabled / max attempts / delay / window)
//! - [`RestartWindow`] sliding-window bookkeeping applied on every crash
//! - [`RestartDecision`] outcome of one admission
//!
//! ## Quick wiring
//! ```text
//! ProcessDefinition { restart: RestartPolicy, .. }
//!      └─► core::supervisor exit callback (non-zero exit):
//!           - window.admit(policy, now) → Restart{attempt} | Exhausted
//!           - Restart → state Restarting → sleep(delay) → start(definition)
//! ```
//!
//! ## Defaults
//! - enabled, 3 attempts, 5s delay, 10 minute window.

mod restart;

pub use restart::{RestartDecision, RestartPolicy, RestartWindow};
