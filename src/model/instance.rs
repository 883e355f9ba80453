//! # Runtime process records.
//!
//! One [`ProcessInstance`] exists per definition once it has been started or
//! adopted. It is mutated exclusively by the supervisor and never persisted.
//!
//! ## State machine
//! ```text
//! Stopped ──► Starting ──► Running ──► Stopping ──► Stopped
//!                │            │
//!                └────────────┴──► Crashed ──► Restarting ──► Starting
//!                                     │
//!                                     └──► Stopped (operator action / attempts exhausted)
//! ```
//!
//! ## Invariant
//! `pid` is `Some` iff `state` is one of `Starting`, `Running`, `Stopping`.

use std::fmt;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::model::definition::DefinitionId;

/// Lifecycle state of a supervised process.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProcessState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
    Crashed,
    Restarting,
}

impl ProcessState {
    /// `Starting` or `Running`: a new start is a no-op.
    #[inline]
    pub fn is_active(self) -> bool {
        matches!(self, ProcessState::Starting | ProcessState::Running)
    }

    /// States that carry an OS process id.
    #[inline]
    pub fn holds_pid(self) -> bool {
        matches!(
            self,
            ProcessState::Starting | ProcessState::Running | ProcessState::Stopping
        )
    }

    /// Short stable label.
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessState::Stopped => "stopped",
            ProcessState::Starting => "starting",
            ProcessState::Running => "running",
            ProcessState::Stopping => "stopping",
            ProcessState::Crashed => "crashed",
            ProcessState::Restarting => "restarting",
        }
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live supervision record of one definition.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInstance {
    pub definition_id: DefinitionId,
    pub state: ProcessState,
    /// OS process id while the process is owned.
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Local>>,
    pub stopped_at: Option<DateTime<Local>>,
    /// Auto-restarts counted in the current restart window.
    pub restart_count: u32,
    pub restart_window_start: Option<DateTime<Local>>,
    pub last_exit_code: Option<i32>,
    pub last_error: Option<String>,
    /// True when the process was discovered rather than launched.
    pub adopted: bool,
}

impl ProcessInstance {
    /// Fresh `Stopped` record.
    pub fn new(definition_id: DefinitionId) -> Self {
        Self {
            definition_id,
            state: ProcessState::Stopped,
            pid: None,
            started_at: None,
            stopped_at: None,
            restart_count: 0,
            restart_window_start: None,
            last_exit_code: None,
            last_error: None,
            adopted: false,
        }
    }

    /// Checks the pid/state invariant.
    pub fn is_consistent(&self) -> bool {
        self.pid.is_some() == self.state.holds_pid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_instance_is_consistent() {
        let inst = ProcessInstance::new(DefinitionId::new());
        assert_eq!(inst.state, ProcessState::Stopped);
        assert!(inst.is_consistent());
    }

    #[test]
    fn running_without_pid_is_inconsistent() {
        let mut inst = ProcessInstance::new(DefinitionId::new());
        inst.state = ProcessState::Running;
        assert!(!inst.is_consistent());
        inst.pid = Some(42);
        assert!(inst.is_consistent());
        inst.state = ProcessState::Crashed;
        assert!(!inst.is_consistent());
    }
}
