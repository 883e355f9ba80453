//! # Supervisor: owns the process state machine.
//!
//! The [`Supervisor`] launches, stops, restarts and adopts OS processes, keeps
//! one authoritative [`ProcessInstance`] per definition and publishes every
//! transition on the [`Bus`].
//!
//! ## State machine
//! ```text
//!             start                 spawn ok
//!  Stopped ──────────► Starting ─────────────► Running ──── stop ────► Stopping ──► Stopped
//!     ▲                   │ spawn error           │ exit 0                              ▲
//!     │                   ▼                       ├─────────► Stopped                   │
//!     │                Crashed ◄──────────────────┘ exit != 0 / unknown                 │
//!     │                   │  restart enabled and budget left                           │
//!     │                   ▼                                                             │
//!     │               Restarting ── delay ──► start                                     │
//!     └──── stop (Crashed / Restarting) ────────────────────────────────────────────────┘
//! ```
//!
//! ## Event wiring
//! ```text
//! Supervisor / LogStore / HealthProber ── publish ──► Bus
//!                                                      ├──► subscriber_listener ──► SubscriberSet (Notifier, user subscribers)
//!                                                      └──► control_listener
//!                                                              ├─ RestartRequested     ──► restart(id)
//!                                                              └─ StateChanged Running ──► prober.register
//!                                                                 StateChanged Stopped/Crashed ──► prober.unregister
//! ```
//!
//! ## Rules
//! - Start/stop/adopt on one definition are serialized; different definitions never wait on each other.
//! - `pid` is `Some` exactly in Starting/Running/Stopping.
//! - The manual-stop flag is raised before any termination attempt and checked
//!   by the exit watcher under the same lock.
//! - Group stops and `stop_all` run one process at a time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use futures::future::join_all;
use tokio::io::AsyncWriteExt;
use tokio::process::Child;
use tokio::sync::{broadcast, watch};
use tokio::time::{Instant, MissedTickBehavior, sleep, timeout};
use tokio_util::sync::CancellationToken;

use crate::core::config::SupervisorConfig;
use crate::core::launch::{self, Launched};
use crate::core::orphan;
use crate::core::os::{self, ProcessTable, RunningProcess};
use crate::core::registry::{ProcessHandle, Registry, Slot, StopTarget};
use crate::core::shutdown;
use crate::error::SupervisorError;
use crate::events::{Bus, Event, EventKind};
use crate::health::HealthProber;
use crate::logs::LogStore;
use crate::model::{
    DefinitionId, DefinitionTable, LogEntry, LogSource, ProcessDefinition, ProcessGroup, ProcessInstance,
    ProcessState,
};
use crate::policies::RestartDecision;
use crate::subscribers::SubscriberSet;

/// Byte written to a child's stdin as a graceful interrupt (Ctrl-C).
const INTERRUPT_BYTE: u8 = 0x03;

/// Supervises a set of OS processes.
///
/// Call [`Supervisor::shutdown`] (or [`Supervisor::run_until_signal`]) before
/// exiting: exit watchers keep the supervisor alive, so dropping the last
/// handle does not stop anything. Owned children are still killed when the
/// runtime drops their watchers; adopted processes are left running.
pub struct Supervisor {
    cfg: SupervisorConfig,
    bus: Bus,
    registry: Registry,
    table: Arc<DefinitionTable>,
    logs: Arc<LogStore>,
    prober: HealthProber,
    processes: Arc<dyn ProcessTable>,
    /// Parent of every listener, watcher and restart timer.
    token: CancellationToken,
}

/// What a stop request has to do, decided under the slot lock.
enum StopPlan {
    Noop,
    /// No live process; the record was moved to Stopped directly.
    Settled { snapshot: ProcessInstance, cancelled_restart: bool },
    /// `snapshot` is `None` when resuming a stop that already published Stopping.
    Terminate {
        target: StopTarget,
        snapshot: Option<ProcessInstance>,
        force: bool,
    },
    /// No handle to act on; complete immediately.
    Detached { snapshot: Option<ProcessInstance> },
}

impl Supervisor {
    pub(crate) fn new_internal(
        cfg: SupervisorConfig,
        bus: Bus,
        table: Arc<DefinitionTable>,
        logs: Arc<LogStore>,
        prober: HealthProber,
        processes: Arc<dyn ProcessTable>,
    ) -> Self {
        Self {
            cfg,
            bus,
            registry: Registry::new(),
            table,
            logs,
            prober,
            processes,
            token: CancellationToken::new(),
        }
    }

    // ---------------------------------------------------------------------
    // Accessors and queries
    // ---------------------------------------------------------------------

    pub fn config(&self) -> &SupervisorConfig {
        &self.cfg
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// New receiver on the event bus.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    pub fn definitions(&self) -> &Arc<DefinitionTable> {
        &self.table
    }

    pub fn prober(&self) -> &HealthProber {
        &self.prober
    }

    /// Records a definition without starting it.
    pub fn register(&self, def: &ProcessDefinition) -> Arc<ProcessDefinition> {
        self.table.insert(def.clone())
    }

    /// Records a group name and all of its definitions.
    pub fn register_group(&self, group: &ProcessGroup) {
        self.table.insert_group(group);
    }

    /// Snapshot of every tracked instance.
    pub fn instances(&self) -> HashMap<DefinitionId, ProcessInstance> {
        self.registry.snapshot()
    }

    pub fn instance(&self, id: DefinitionId) -> Option<ProcessInstance> {
        self.registry.get(id).map(|s| s.instance())
    }

    /// Captured output of `id`, oldest first.
    pub fn logs(&self, id: DefinitionId) -> Vec<LogEntry> {
        self.logs.logs(id)
    }

    pub fn clear_logs(&self, id: DefinitionId) {
        self.logs.clear(id);
    }

    /// OS pid of `id` while its process is still alive.
    pub fn os_pid(&self, id: DefinitionId) -> Option<u32> {
        let slot = self.registry.get(id)?;
        let st = slot.state.lock();
        st.handle
            .as_ref()
            .filter(|h| !*h.exited.borrow())
            .map(|h| h.pid)
    }

    // ---------------------------------------------------------------------
    // Start
    // ---------------------------------------------------------------------

    /// Starts `def`. No-op while it is already Starting or Running.
    ///
    /// A launch failure leaves the instance Crashed with the error recorded and
    /// is also returned.
    pub async fn start(self: &Arc<Self>, def: &ProcessDefinition) -> Result<(), SupervisorError> {
        let def = self.table.insert(def.clone());
        self.start_arc(def).await
    }

    /// Starts a previously registered definition.
    pub async fn start_id(self: &Arc<Self>, id: DefinitionId) -> Result<(), SupervisorError> {
        let def = self.table.get(id).ok_or(SupervisorError::UnknownDefinition { id })?;
        self.start_arc(def).await
    }

    async fn start_arc(self: &Arc<Self>, def: Arc<ProcessDefinition>) -> Result<(), SupervisorError> {
        let slot = self.registry.slot(def.id);
        let _op = slot.op.lock().await;
        self.start_locked(&slot, &def)
    }

    /// Caller holds `slot.op`.
    fn start_locked(self: &Arc<Self>, slot: &Arc<Slot>, def: &Arc<ProcessDefinition>) -> Result<(), SupervisorError> {
        {
            let mut st = slot.state.lock();
            if matches!(st.instance.state, ProcessState::Starting | ProcessState::Running) {
                return Ok(());
            }
            if let Some(pending) = st.pending_restart.take() {
                pending.cancel();
            }
        }

        let id = def.id;
        self.log_system(id, format!("Starting: {}", def.command_line()));
        tracing::info!(process = %id, name = %def.name, command = %def.command_line(), "starting process");

        let Launched { pid, child, stdin } = match launch::spawn(def, &self.logs) {
            Ok(launched) => launched,
            Err(err) => {
                let snapshot = {
                    let mut st = slot.state.lock();
                    st.handle = None;
                    let inst = &mut st.instance;
                    inst.state = ProcessState::Crashed;
                    inst.pid = None;
                    inst.stopped_at = Some(Local::now());
                    inst.last_exit_code = None;
                    inst.last_error = Some(err.to_string());
                    inst.adopted = false;
                    inst.clone()
                };
                self.log_system(id, format!("Failed to start: {err}"));
                tracing::error!(process = %id, error = %err, label = err.as_label(), "launch failed");
                self.publish_state(snapshot);
                return Err(err);
            }
        };

        let (exited_tx, exited_rx) = watch::channel(false);
        let kill = self.token.child_token();
        let (generation, starting, running) = {
            let mut st = slot.state.lock();
            st.generation += 1;
            let generation = st.generation;
            st.manual_stop = false;
            st.handle = Some(ProcessHandle {
                pid,
                stdin,
                exited: exited_rx,
                kill: kill.clone(),
            });

            let inst = &mut st.instance;
            inst.state = ProcessState::Starting;
            inst.pid = Some(pid);
            inst.started_at = Some(Local::now());
            inst.stopped_at = None;
            inst.last_exit_code = None;
            inst.last_error = None;
            inst.adopted = false;
            let starting = inst.clone();
            inst.state = ProcessState::Running;
            (generation, starting, inst.clone())
        };

        self.publish_state(starting);
        self.publish_state(running);
        self.log_system(id, format!("Process started (PID: {pid})"));
        tracing::info!(process = %id, pid, "process started");

        let sup = Arc::clone(self);
        let slot = Arc::clone(slot);
        tokio::spawn(async move {
            let code = wait_child(child, kill).await;
            sup.on_exit(&slot, generation, code);
            let _ = exited_tx.send(true);
        });
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Exit handling and auto-restart
    // ---------------------------------------------------------------------

    /// Exit report from a watcher. `code` is `None` when unknown.
    fn on_exit(self: &Arc<Self>, slot: &Arc<Slot>, generation: u64, code: Option<i32>) {
        let teardown = self.token.is_cancelled();
        let snapshot = {
            let mut st = slot.state.lock();
            if st.generation != generation || st.manual_stop || !st.instance.state.holds_pid() {
                return;
            }
            st.handle = None;
            let inst = &mut st.instance;
            inst.pid = None;
            inst.stopped_at = Some(Local::now());
            inst.last_exit_code = code;
            inst.state = if code == Some(0) || teardown {
                ProcessState::Stopped
            } else {
                ProcessState::Crashed
            };
            inst.clone()
        };

        let id = slot.id;
        let shown = code.map(|c| c.to_string()).unwrap_or_else(|| "?".to_string());
        let crashed = snapshot.state == ProcessState::Crashed;
        if crashed {
            self.log_system(id, format!("Process exited (exit code: {shown})"));
            tracing::warn!(process = %id, exit_code = ?code, "process crashed");
        } else {
            self.log_system(id, format!("Process exited normally (code: {shown})"));
            tracing::info!(process = %id, exit_code = ?code, "process exited");
        }
        self.publish_state(snapshot);

        if crashed {
            if let Some(def) = self.table.get(id).filter(|d| d.restart.enabled) {
                self.schedule_restart(slot, def);
            }
        }
    }

    fn schedule_restart(self: &Arc<Self>, slot: &Arc<Slot>, def: Arc<ProcessDefinition>) {
        let policy = def.restart;
        let (decision, snapshot, token) = {
            let mut st = slot.state.lock();
            if st.instance.state != ProcessState::Crashed {
                return;
            }
            let before = st.window.started();
            let decision = st.window.admit(&policy, Instant::now());
            if st.window.started() != before {
                st.window_started_at = Some(Local::now());
            }
            let count = st.window.count();
            let window_start = st.window_started_at;
            st.instance.restart_count = count;
            st.instance.restart_window_start = window_start;

            match decision {
                RestartDecision::Exhausted => (decision, None, None),
                RestartDecision::Restart { .. } => {
                    let token = self.token.child_token();
                    if let Some(old) = st.pending_restart.replace(token.clone()) {
                        old.cancel();
                    }
                    st.instance.state = ProcessState::Restarting;
                    (decision, Some(st.instance.clone()), Some(token))
                }
            }
        };

        let id = slot.id;
        let (RestartDecision::Restart { attempt }, Some(snapshot), Some(token)) = (decision, snapshot, token) else {
            self.log_system(
                id,
                format!("Max restart attempts ({}) reached. Not restarting.", policy.max_attempts),
            );
            tracing::warn!(process = %id, max = policy.max_attempts, "restart budget exhausted");
            return;
        };

        self.publish_state(snapshot);
        self.log_system(
            id,
            format!(
                "Auto-restarting in {}s (attempt {attempt}/{})",
                policy.delay_secs, policy.max_attempts
            ),
        );
        tracing::info!(process = %id, attempt, max = policy.max_attempts, delay = ?policy.delay(), "auto-restart scheduled");

        let sup = Arc::clone(self);
        let slot = Arc::clone(slot);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = sleep(policy.delay()) => {}
            }
            let _op = slot.op.lock().await;
            if token.is_cancelled() || slot.state.lock().instance.state != ProcessState::Restarting {
                return;
            }
            if let Err(err) = sup.start_locked(&slot, &def) {
                tracing::debug!(process = %def.id, error = %err, "auto-restart launch failed");
            }
        });
    }

    // ---------------------------------------------------------------------
    // Stop / restart
    // ---------------------------------------------------------------------

    /// Stops `id`. No-op when unknown or Stopped.
    ///
    /// Unless `force` is set, the process is first interrupted and given
    /// [`SupervisorConfig::grace`] to exit; then its whole tree is killed and
    /// awaited for at most [`SupervisorConfig::kill_wait`].
    ///
    /// Safe to cancel: a dropped stop leaves the instance in Stopping with its
    /// handle still in place, and the next `stop` (or [`Supervisor::shutdown`])
    /// finishes it with a kill.
    pub async fn stop(&self, id: DefinitionId, force: bool) {
        let Some(slot) = self.registry.get(id) else {
            return;
        };
        let _op = slot.op.lock().await;
        self.stop_locked(&slot, force).await;
    }

    /// Caller holds `slot.op`.
    async fn stop_locked(&self, slot: &Slot, force: bool) {
        let id = slot.id;
        let plan = {
            let mut st = slot.state.lock();
            match st.instance.state {
                ProcessState::Stopped => StopPlan::Noop,
                // Seen under the op lock only when an earlier stop was dropped.
                ProcessState::Stopping => {
                    st.manual_stop = true;
                    match st.handle.as_mut() {
                        Some(handle) => StopPlan::Terminate {
                            target: handle.stop_target(),
                            snapshot: None,
                            force: true,
                        },
                        None => StopPlan::Detached { snapshot: None },
                    }
                }
                ProcessState::Crashed | ProcessState::Restarting => {
                    let cancelled_restart = match st.pending_restart.take() {
                        Some(pending) => {
                            pending.cancel();
                            true
                        }
                        None => false,
                    };
                    st.instance.state = ProcessState::Stopped;
                    st.instance.stopped_at = Some(Local::now());
                    StopPlan::Settled {
                        snapshot: st.instance.clone(),
                        cancelled_restart,
                    }
                }
                ProcessState::Starting | ProcessState::Running => {
                    st.manual_stop = true;
                    st.instance.state = ProcessState::Stopping;
                    let snapshot = Some(st.instance.clone());
                    match st.handle.as_mut() {
                        Some(handle) => StopPlan::Terminate {
                            target: handle.stop_target(),
                            snapshot,
                            force,
                        },
                        None => StopPlan::Detached { snapshot },
                    }
                }
            }
        };

        match plan {
            StopPlan::Noop => {}
            StopPlan::Settled {
                snapshot,
                cancelled_restart,
            } => {
                if cancelled_restart {
                    self.log_system(id, "Pending restart cancelled");
                }
                self.log_system(id, "Process stopped");
                tracing::info!(process = %id, "process stopped");
                self.publish_state(snapshot);
            }
            StopPlan::Detached { snapshot } => {
                if let Some(snapshot) = snapshot {
                    self.publish_state(snapshot);
                }
                self.complete_stop(slot);
            }
            StopPlan::Terminate {
                target,
                snapshot,
                force,
            } => {
                match snapshot {
                    Some(snapshot) => {
                        self.publish_state(snapshot);
                        self.log_system(id, "Stopping process...");
                        tracing::info!(process = %id, pid = target.pid, force, "stopping process");
                    }
                    None => tracing::info!(process = %id, pid = target.pid, "resuming interrupted stop"),
                }
                self.terminate(id, target, force).await;
                self.complete_stop(slot);
            }
        }
    }

    async fn terminate(&self, id: DefinitionId, mut target: StopTarget, force: bool) {
        if *target.exited.borrow() {
            return;
        }

        if !force {
            let mut interrupted = false;
            // Adopted processes have no stdin and are not our group leaders.
            if let Some(mut stdin) = target.stdin.take() {
                interrupted |= stdin.write_all(&[INTERRUPT_BYTE]).await.is_ok() && stdin.flush().await.is_ok();
                interrupted |= os::interrupt_group(target.pid);
            }
            if interrupted && wait_exited(&mut target.exited, self.cfg.grace).await {
                return;
            }
            tracing::debug!(process = %id, grace = ?self.cfg.grace, "graceful stop did not finish, killing");
        }

        let processes = Arc::clone(&self.processes);
        let pid = target.pid;
        let killed = tokio::task::spawn_blocking(move || processes.kill_tree(pid))
            .await
            .unwrap_or(0);
        target.kill.cancel();
        tracing::debug!(process = %id, pid, killed, "process tree killed");

        if !wait_exited(&mut target.exited, self.cfg.kill_wait).await {
            self.log_system(id, format!("Process {pid} did not exit after kill"));
            tracing::warn!(process = %id, pid, kill_wait = ?self.cfg.kill_wait, "process did not exit after kill");
        }
    }

    fn complete_stop(&self, slot: &Slot) {
        let snapshot = {
            let mut st = slot.state.lock();
            st.handle = None;
            st.manual_stop = false;
            st.generation += 1;
            let inst = &mut st.instance;
            inst.state = ProcessState::Stopped;
            inst.pid = None;
            inst.stopped_at = Some(Local::now());
            inst.clone()
        };
        self.log_system(slot.id, "Process stopped");
        tracing::info!(process = %slot.id, "process stopped");
        self.publish_state(snapshot);
    }

    /// Graceful stop, settle pause, start. No restart-budget bookkeeping.
    pub async fn restart(self: &Arc<Self>, id: DefinitionId) -> Result<(), SupervisorError> {
        let def = self.table.get(id).ok_or(SupervisorError::UnknownDefinition { id })?;
        self.stop(id, false).await;
        sleep(self.cfg.restart_settle).await;
        self.start_arc(def).await
    }

    // ---------------------------------------------------------------------
    // Groups
    // ---------------------------------------------------------------------

    /// Starts every auto-start definition of `group` concurrently, each after
    /// its own startup delay. Returns how many started successfully.
    pub async fn start_group(self: &Arc<Self>, group: &ProcessGroup) -> usize {
        self.register_group(group);
        let launches = group
            .auto_start()
            .into_iter()
            .filter_map(|def| self.table.get(def.id))
            .map(|def| async move {
                let delay = def.startup_delay();
                if !delay.is_zero() {
                    sleep(delay).await;
                }
                self.start_arc(def).await
            });
        let results = join_all(launches).await;
        results.iter().filter(|r| r.is_ok()).count()
    }

    /// Stops every definition of `group`, one at a time.
    pub async fn stop_group(&self, group: &ProcessGroup) {
        let mut defs: Vec<&ProcessDefinition> = group.processes.iter().collect();
        defs.sort_by_key(|d| d.sort_order);
        for def in defs {
            self.stop(def.id, false).await;
        }
    }

    /// Stops every tracked process, one at a time, then publishes `AllStopped`.
    ///
    /// Returns the number of instances visited.
    pub async fn stop_all(&self) -> usize {
        let mut slots = self.registry.slots();
        slots.sort_by_key(|s| {
            self.table
                .get(s.id)
                .map(|d| d.sort_order)
                .unwrap_or(i32::MAX)
        });
        let visited = slots.len();
        for slot in slots {
            let _op = slot.op.lock().await;
            self.stop_locked(&slot, false).await;
        }
        self.bus.publish(Event::new(EventKind::AllStopped));
        visited
    }

    // ---------------------------------------------------------------------
    // Orphan adoption
    // ---------------------------------------------------------------------

    /// Adopts still-running processes that match `defs` and returns how many
    /// were adopted.
    ///
    /// Definitions already Starting/Running are skipped. Matching failures
    /// are silent.
    pub async fn adopt_orphans(self: &Arc<Self>, defs: &[ProcessDefinition]) -> usize {
        let table = Arc::clone(&self.processes);
        let candidates = match tokio::task::spawn_blocking(move || table.snapshot()).await {
            Ok(candidates) => candidates,
            Err(err) => {
                tracing::warn!(error = %err, "process table query failed");
                return 0;
            }
        };
        let own_pid = std::process::id();

        let mut adopted = 0;
        for def in defs {
            let def = self.table.insert(def.clone());
            let slot = self.registry.slot(def.id);
            let _op = slot.op.lock().await;
            if slot.state.lock().instance.state.holds_pid() {
                continue;
            }
            let Some(found) = orphan::find_orphan(&def, &candidates, own_pid) else {
                tracing::debug!(process = %def.id, name = %def.name, "no running process matched");
                continue;
            };
            if !self.pid_alive(found.pid).await {
                continue;
            }
            self.attach(&slot, found);
            adopted += 1;
        }
        tracing::info!(adopted, candidates = candidates.len(), "orphan adoption finished");
        adopted
    }

    /// Caller holds `slot.op`.
    fn attach(self: &Arc<Self>, slot: &Arc<Slot>, found: &RunningProcess) {
        let pid = found.pid;
        let (exited_tx, exited_rx) = watch::channel(false);
        let kill = self.token.child_token();
        let (generation, snapshot) = {
            let mut st = slot.state.lock();
            if let Some(pending) = st.pending_restart.take() {
                pending.cancel();
            }
            st.generation += 1;
            let generation = st.generation;
            st.manual_stop = false;
            st.handle = Some(ProcessHandle {
                pid,
                stdin: None,
                exited: exited_rx,
                kill: kill.clone(),
            });
            let inst = &mut st.instance;
            inst.state = ProcessState::Running;
            inst.pid = Some(pid);
            inst.started_at = Some(found.start_time.unwrap_or_else(Local::now));
            inst.stopped_at = None;
            inst.last_exit_code = None;
            inst.last_error = None;
            inst.adopted = true;
            (generation, inst.clone())
        };

        let id = slot.id;
        self.publish_state(snapshot);
        self.log_system(id, format!("Adopted process left running by a previous session (PID: {pid})"));
        self.log_system(
            id,
            "Live output is not available for this session; restart the process to capture logs",
        );
        tracing::info!(process = %id, pid, "adopted running process");

        let sup = Arc::clone(self);
        let slot = Arc::clone(slot);
        let poll = self.cfg.adopt_poll_interval;
        tokio::spawn(async move {
            watch_adopted(Arc::clone(&sup.processes), pid, kill, poll).await;
            sup.on_exit(&slot, generation, None);
            let _ = exited_tx.send(true);
        });
    }

    async fn pid_alive(&self, pid: u32) -> bool {
        let table = Arc::clone(&self.processes);
        tokio::task::spawn_blocking(move || table.is_alive(pid))
            .await
            .unwrap_or(false)
    }

    // ---------------------------------------------------------------------
    // Teardown
    // ---------------------------------------------------------------------

    /// Force-stops every tracked process, stops health checks and ends all
    /// background listeners.
    pub async fn shutdown(&self) {
        self.bus.publish(Event::new(EventKind::ShutdownRequested));
        self.prober.shutdown();
        for slot in self.registry.slots() {
            let _op = slot.op.lock().await;
            self.stop_locked(&slot, true).await;
        }
        self.token.cancel();
    }

    /// Waits for a termination signal, stops everything sequentially, then
    /// tears down.
    ///
    /// Returns [`SupervisorError::GraceExceeded`] if the sequential stop did not
    /// finish within its budget (`(grace + kill_wait)` per tracked process).
    pub async fn run_until_signal(self: &Arc<Self>) -> Result<(), SupervisorError> {
        match shutdown::wait_for_shutdown_signal().await {
            Ok(signal) => tracing::info!(%signal, "shutdown signal received"),
            Err(err) => tracing::warn!(error = %err, "signal listener failed, shutting down"),
        }
        self.bus.publish(Event::new(EventKind::ShutdownRequested));

        let tracked = u32::try_from(self.registry.len()).unwrap_or(u32::MAX).max(1);
        let budget = (self.cfg.grace + self.cfg.kill_wait).saturating_mul(tracked);
        let outcome = timeout(budget, self.stop_all()).await;

        let stuck: Vec<String> = self
            .instances()
            .into_iter()
            .filter(|(_, inst)| inst.state != ProcessState::Stopped && inst.state != ProcessState::Crashed)
            .map(|(id, _)| self.table.display_names(id).1)
            .collect();
        self.shutdown().await;

        match outcome {
            Ok(_) => Ok(()),
            Err(_) => Err(SupervisorError::GraceExceeded { grace: budget, stuck }),
        }
    }

    // ---------------------------------------------------------------------
    // Background listeners
    // ---------------------------------------------------------------------

    /// Forwards bus events to the subscriber set until teardown.
    pub(crate) fn spawn_subscriber_listener(&self, set: SubscriberSet) {
        let mut rx = self.bus.subscribe();
        let token = self.token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        while let Ok(ev) = rx.try_recv() {
                            set.emit_arc(Arc::new(ev));
                        }
                        break;
                    }
                    msg = rx.recv() => match msg {
                        Ok(ev) => set.emit_arc(Arc::new(ev)),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "subscriber listener lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
            set.shutdown().await;
        });
    }

    /// Reacts to health escalations and keeps health checks in step with
    /// process state.
    pub(crate) fn spawn_control_listener(self: &Arc<Self>) {
        let mut rx = self.bus.subscribe();
        let token = self.token.clone();
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                let ev = tokio::select! {
                    _ = token.cancelled() => break,
                    msg = rx.recv() => match msg {
                        Ok(ev) => ev,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "control listener lagged");
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                };
                let Some(sup) = weak.upgrade() else {
                    break;
                };
                sup.handle_control(&ev);
            }
        });
    }

    fn handle_control(self: &Arc<Self>, ev: &Event) {
        match ev.kind {
            EventKind::RestartRequested => {
                let Some(id) = ev.process else {
                    return;
                };
                if self.instance(id).map(|i| i.state) != Some(ProcessState::Running) {
                    return;
                }
                let reason = ev.reason.as_deref().unwrap_or("health check failed");
                self.log_system(id, format!("Restart requested: {reason}"));
                let sup = Arc::clone(self);
                tokio::spawn(async move {
                    if let Err(err) = sup.restart(id).await {
                        tracing::warn!(process = %id, error = %err, "health restart failed");
                    }
                });
            }
            EventKind::StateChanged => {
                let Some(inst) = &ev.instance else {
                    return;
                };
                let id = inst.definition_id;
                match inst.state {
                    ProcessState::Running => {
                        if let Some(check) = self.table.get(id).and_then(|d| d.health_check.clone()) {
                            self.prober.register(id, &check);
                        }
                    }
                    ProcessState::Stopped | ProcessState::Crashed => self.prober.unregister(id),
                    _ => {}
                }
            }
            _ => {}
        }
    }

    // ---------------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------------

    fn publish_state(&self, snapshot: ProcessInstance) {
        debug_assert!(snapshot.is_consistent(), "pid/state mismatch: {snapshot:?}");
        self.bus.publish(Event::state_changed(snapshot));
    }

    fn log_system(&self, id: DefinitionId, text: impl Into<String>) {
        self.logs.append(id, text, LogSource::System);
    }
}

/// Waits for a launched child, killing it when `kill` fires.
async fn wait_child(mut child: Child, kill: CancellationToken) -> Option<i32> {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = kill.cancelled() => {
            if let Err(err) = child.start_kill() {
                tracing::debug!(error = %err, "start_kill failed");
            }
            child.wait().await
        }
    };
    match status {
        Ok(status) => status.code(),
        Err(err) => {
            tracing::warn!(error = %err, "waiting on child failed");
            None
        }
    }
}

/// Polls an adopted pid until it disappears; kills its tree when `kill` fires.
async fn watch_adopted(processes: Arc<dyn ProcessTable>, pid: u32, kill: CancellationToken, poll: Duration) {
    let mut ticker = tokio::time::interval(poll);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut killed = false;
    loop {
        tokio::select! {
            _ = kill.cancelled(), if !killed => {
                killed = true;
                let table = Arc::clone(&processes);
                let _ = tokio::task::spawn_blocking(move || table.kill_tree(pid)).await;
            }
            _ = ticker.tick() => {
                let table = Arc::clone(&processes);
                let alive = tokio::task::spawn_blocking(move || table.is_alive(pid))
                    .await
                    .unwrap_or(false);
                if !alive {
                    break;
                }
            }
        }
    }
}

/// True if the watcher reported exit within `limit`.
async fn wait_exited(exited: &mut watch::Receiver<bool>, limit: Duration) -> bool {
    // A closed channel means the watcher is gone, which only happens after exit.
    timeout(limit, exited.wait_for(|done| *done)).await.is_ok()
}
