//! # Data model.
//!
//! - [`ProcessDefinition`] static description of a process (immutable per run)
//! - [`ProcessInstance`] / [`ProcessState`] runtime record and lifecycle state
//! - [`LogEntry`] / [`LogSource`] one captured output line
//! - [`HealthCheckConfig`] / [`HealthCheckKind`] probe settings
//! - [`ProcessGroup`] definitions started/stopped together
//! - [`DefinitionTable`] shared lookup of known definitions

mod definition;
mod group;
mod health;
mod instance;
mod log;
mod table;

pub use definition::{DefinitionId, GroupId, NotificationMode, ProcessDefinition};
pub use group::ProcessGroup;
pub use health::{HealthCheckConfig, HealthCheckKind};
pub use instance::{ProcessInstance, ProcessState};
pub use log::{LogEntry, LogSource};
pub use table::DefinitionTable;
