//! Runtime core: process lifecycle and orchestration.
//!
//! The only types most callers need are [`Supervisor`], its
//! [`SupervisorBuilder`] and [`SupervisorConfig`].
//!
//! Internal modules:
//! - [`supervisor`]: state machine, stop sequence, auto-restart, adoption;
//! - [`launch`]: spawns children and pumps their output into the log store;
//! - [`registry`]: one slot per definition with its locks and handle;
//! - [`orphan`]: matches definitions against running OS processes;
//! - [`os`]: process table access, tree kill and group interrupt;
//! - [`shutdown`]: cross-platform termination signal handling.

mod builder;
mod config;
mod launch;
pub mod orphan;
pub mod os;
mod registry;
mod shutdown;
mod supervisor;

pub use builder::SupervisorBuilder;
pub use config::SupervisorConfig;
pub use orphan::{CommandShape, find_orphan, shape_of};
pub use os::{ProcessTable, RunningProcess, SysinfoTable};
pub use shutdown::{ShutdownSignal, wait_for_shutdown_signal};
pub use supervisor::Supervisor;
