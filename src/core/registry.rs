//! # Process registry: the arena of supervised processes.
//!
//! One [`Slot`] per definition id, created on first start or adoption and never
//! removed. A slot owns the authoritative [`ProcessInstance`] and, while a
//! process is alive, its [`ProcessHandle`].
//!
//! ## Locking
//! ```text
//! Slot
//!  ├─ op    (tokio Mutex)      held across a whole start/stop/adopt sequence
//!  └─ state (parking_lot Mutex) short critical sections, never across .await
//! ```
//!
//! ## Rules
//! - Two operations on the same id never interleave (`op`).
//! - The exit watcher only takes `state`, so it can run while `op` is held.
//! - Each launch/adoption bumps `generation`; exit reports carrying an older
//!   generation are ignored.
//! - The handle is released exactly once, on the transition to Stopped/Crashed.
//!   A stop never takes it out of the slot before that point, so an abandoned
//!   stop leaves everything the next stop needs in place.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Local};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::process::ChildStdin;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::model::{DefinitionId, ProcessInstance};
use crate::policies::RestartWindow;

/// Live OS resources of one owned process.
pub(crate) struct ProcessHandle {
    pub pid: u32,
    /// Redirected input; `None` for adopted processes.
    pub stdin: Option<ChildStdin>,
    /// Flips to `true` once the exit watcher has observed termination.
    pub exited: watch::Receiver<bool>,
    /// Asks the exit watcher to kill the process.
    pub kill: CancellationToken,
}

impl ProcessHandle {
    /// Borrows what a stop needs while the handle itself stays in the slot.
    ///
    /// Stdin moves out: the interrupt byte is written at most once.
    pub fn stop_target(&mut self) -> StopTarget {
        StopTarget {
            pid: self.pid,
            stdin: self.stdin.take(),
            exited: self.exited.clone(),
            kill: self.kill.clone(),
        }
    }
}

/// Working copy of a [`ProcessHandle`] used by one stop attempt.
pub(crate) struct StopTarget {
    pub pid: u32,
    pub stdin: Option<ChildStdin>,
    pub exited: watch::Receiver<bool>,
    pub kill: CancellationToken,
}

/// Mutable part of a slot.
pub(crate) struct SlotState {
    pub instance: ProcessInstance,
    pub handle: Option<ProcessHandle>,
    /// Set before any intentional termination; suppresses crash handling.
    pub manual_stop: bool,
    pub generation: u64,
    pub window: RestartWindow,
    pub window_started_at: Option<DateTime<Local>>,
    /// Cancels a scheduled auto-restart.
    pub pending_restart: Option<CancellationToken>,
}

pub(crate) struct Slot {
    pub id: DefinitionId,
    pub op: tokio::sync::Mutex<()>,
    pub state: Mutex<SlotState>,
}

impl Slot {
    fn new(id: DefinitionId) -> Self {
        Self {
            id,
            op: tokio::sync::Mutex::new(()),
            state: Mutex::new(SlotState {
                instance: ProcessInstance::new(id),
                handle: None,
                manual_stop: false,
                generation: 0,
                window: RestartWindow::default(),
                window_started_at: None,
                pending_restart: None,
            }),
        }
    }

    /// Snapshot of the instance record.
    pub fn instance(&self) -> ProcessInstance {
        self.state.lock().instance.clone()
    }
}

/// Concurrent map of slots.
#[derive(Default)]
pub(crate) struct Registry {
    slots: DashMap<DefinitionId, Arc<Slot>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the slot for `id`, creating it if needed.
    pub fn slot(&self, id: DefinitionId) -> Arc<Slot> {
        let entry = self.slots.entry(id).or_insert_with(|| Arc::new(Slot::new(id)));
        Arc::clone(entry.value())
    }

    pub fn get(&self, id: DefinitionId) -> Option<Arc<Slot>> {
        self.slots.get(&id).map(|s| Arc::clone(s.value()))
    }

    /// Every slot, unordered.
    pub fn slots(&self) -> Vec<Arc<Slot>> {
        self.slots.iter().map(|s| Arc::clone(s.value())).collect()
    }

    pub fn snapshot(&self) -> HashMap<DefinitionId, ProcessInstance> {
        self.slots
            .iter()
            .map(|s| (*s.key(), s.value().instance()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProcessState;

    #[test]
    fn slot_is_created_once() {
        let reg = Registry::new();
        let id = DefinitionId::new();
        let a = reg.slot(id);
        let b = reg.slot(id);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(reg.len(), 1);
        assert!(reg.get(DefinitionId::new()).is_none());
    }

    #[test]
    fn snapshot_reflects_current_state() {
        let reg = Registry::new();
        let id = DefinitionId::new();
        reg.slot(id).state.lock().instance.state = ProcessState::Crashed;

        let snap = reg.snapshot();
        assert_eq!(snap[&id].state, ProcessState::Crashed);
        assert_eq!(reg.slots().len(), 1);
    }

    #[test]
    fn stop_target_leaves_handle_in_place() {
        let (tx, rx) = watch::channel(false);
        let mut handle = ProcessHandle {
            pid: 42,
            stdin: None,
            exited: rx,
            kill: CancellationToken::new(),
        };

        let target = handle.stop_target();
        target.kill.cancel();
        tx.send(true).unwrap();

        assert_eq!(target.pid, 42);
        assert!(handle.kill.is_cancelled());
        assert!(*handle.exited.borrow());
    }
}
