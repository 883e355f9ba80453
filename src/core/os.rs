//! # OS process table access.
//!
//! [`ProcessTable`] is the seam between the supervisor and the operating
//! system for everything that is not a direct child handle: orphan discovery,
//! liveness of adopted processes and tree termination.
//! [`SysinfoTable`] implements it on top of `sysinfo`.
//!
//! Reads are best-effort: a process that disappears while being inspected is
//! simply reported as absent.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Local, TimeZone};
use parking_lot::Mutex;
use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System, UpdateKind};

/// One entry of the OS process table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunningProcess {
    pub pid: u32,
    /// Full command line, arguments joined with spaces.
    pub command_line: String,
    pub start_time: Option<DateTime<Local>>,
}

impl RunningProcess {
    pub fn new(pid: u32, command_line: impl Into<String>) -> Self {
        Self {
            pid,
            command_line: command_line.into(),
            start_time: None,
        }
    }
}

/// Access to the OS process table.
///
/// Calls may block; the supervisor runs them on the blocking pool.
pub trait ProcessTable: Send + Sync + 'static {
    /// Every visible process with its command line.
    fn snapshot(&self) -> Vec<RunningProcess>;

    /// True while `pid` exists and is not a zombie.
    fn is_alive(&self, pid: u32) -> bool;

    /// Kills `pid` and all of its descendants, deepest first.
    ///
    /// Returns the number of processes signalled.
    fn kill_tree(&self, pid: u32) -> usize;
}

/// [`ProcessTable`] backed by `sysinfo`.
pub struct SysinfoTable {
    sys: Mutex<System>,
}

impl SysinfoTable {
    pub fn new() -> Self {
        Self {
            sys: Mutex::new(System::new()),
        }
    }
}

impl Default for SysinfoTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for SysinfoTable {
    fn snapshot(&self) -> Vec<RunningProcess> {
        let mut sys = self.sys.lock();
        sys.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_cmd(UpdateKind::OnlyIfNotSet),
        );

        sys.processes()
            .iter()
            .map(|(pid, process)| {
                let command_line = process
                    .cmd()
                    .iter()
                    .map(|s| s.to_string_lossy())
                    .collect::<Vec<_>>()
                    .join(" ");
                let start_time = i64::try_from(process.start_time())
                    .ok()
                    .and_then(|secs| Local.timestamp_opt(secs, 0).single());
                RunningProcess {
                    pid: pid.as_u32(),
                    command_line,
                    start_time,
                }
            })
            .collect()
    }

    fn is_alive(&self, pid: u32) -> bool {
        let mut sys = self.sys.lock();
        let target = Pid::from_u32(pid);
        sys.refresh_processes_specifics(ProcessesToUpdate::Some(&[target]), true, ProcessRefreshKind::nothing());
        sys.process(target)
            .is_some_and(|p| p.status() != ProcessStatus::Zombie)
    }

    fn kill_tree(&self, pid: u32) -> usize {
        let mut sys = self.sys.lock();
        sys.refresh_processes_specifics(ProcessesToUpdate::All, true, ProcessRefreshKind::nothing());

        let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
        for (child, process) in sys.processes() {
            if let Some(parent) = process.parent() {
                children.entry(parent.as_u32()).or_default().push(child.as_u32());
            }
        }

        let order = descendants_first(pid, &children);
        order
            .into_iter()
            .filter(|p| sys.process(Pid::from_u32(*p)).is_some_and(|proc| proc.kill()))
            .count()
    }
}

/// Post-order walk of the tree rooted at `root`: leaves first, `root` last.
fn descendants_first(root: u32, children: &HashMap<u32, Vec<u32>>) -> Vec<u32> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    let mut stack = vec![(root, false)];
    while let Some((pid, expanded)) = stack.pop() {
        if expanded {
            out.push(pid);
            continue;
        }
        if !seen.insert(pid) {
            continue;
        }
        stack.push((pid, true));
        if let Some(kids) = children.get(&pid) {
            stack.extend(kids.iter().map(|k| (*k, false)));
        }
    }
    out
}

/// Sends SIGINT to the process group led by `pid`.
///
/// Children are launched as group leaders, so the group id equals the pid.
#[cfg(unix)]
pub fn interrupt_group(pid: u32) -> bool {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid as NixPid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    killpg(NixPid::from_raw(raw), Signal::SIGINT).is_ok()
}

#[cfg(not(unix))]
pub fn interrupt_group(_pid: u32) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_is_walked_leaves_first() {
        let mut children = HashMap::new();
        children.insert(1, vec![2, 3]);
        children.insert(2, vec![4]);
        let order = descendants_first(1, &children);

        assert_eq!(order.len(), 4);
        assert_eq!(*order.last().unwrap(), 1);
        let pos = |p| order.iter().position(|x| *x == p).unwrap();
        assert!(pos(4) < pos(2));
    }

    #[test]
    fn cycles_do_not_loop() {
        let mut children = HashMap::new();
        children.insert(1, vec![2]);
        children.insert(2, vec![1]);
        assert_eq!(descendants_first(1, &children), vec![2, 1]);
    }

    #[test]
    fn own_process_is_visible() {
        let table = SysinfoTable::new();
        assert!(table.is_alive(std::process::id()));
        let me = std::process::id();
        assert!(table.snapshot().iter().any(|p| p.pid == me));
    }
}
