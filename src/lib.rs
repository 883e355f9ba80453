//! # procvisor
//!
//! **Procvisor** supervises local OS processes: the dev servers, APIs and
//! workers a developer keeps running side by side.
//!
//! It launches processes from declarative definitions, captures their output
//! into bounded per-process buffers, restarts them after crashes within a
//! bounded budget, probes their health, adopts processes left running by a
//! previous session and raises throttled alerts from their output.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!  ProcessDefinition   ProcessDefinition   ProcessGroup (ConfigStore / scanner)
//!          │                   │                 │
//!          ▼                   ▼                 ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Supervisor                                                       │
//! │  - Registry (one slot per definition: state, handle, locks)       │
//! │  - DefinitionTable (known definitions + group names)              │
//! │  - LogStore (ring buffer per process)                             │
//! │  - HealthProber (one check loop per Running process)              │
//! │  - ProcessTable (OS snapshot, tree kill, adoption)                │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        │ launch           │ exit watcher     │ probe escalation
//!        ▼                  ▼                  ▼
//!    child stdout/err   StateChanged      RestartRequested
//!    ─► LogAppended     (+ auto-restart)
//!        │                  │                  │
//!        ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                   Bus (broadcast channel)                         │
//! │             (capacity: SupervisorConfig::bus_capacity)            │
//! └──────────────┬───────────────────────────────────┬────────────────┘
//!                ▼                                   ▼
//!      subscriber_listener                   control_listener
//!                │                          (restart on escalation,
//!                ▼                           probe register/unregister)
//!          SubscriberSet
//!       ┌────────┼─────────┐
//!       ▼        ▼         ▼
//!   Notifier  LogWriter  user subscribers
//!   (classify ─► throttle ─► Notification event)
//! ```
//!
//! ### Lifecycle
//! ```text
//! start(def) ──► spawn ──► Starting{pid} ──► Running{pid}
//!
//! exit watcher:
//!   ├─ manual stop in progress ─► ignored (stop path owns the transition)
//!   ├─ exit code 0             ─► Stopped
//!   └─ other / unknown         ─► Crashed
//!                                  └─ restart enabled?
//!                                       ├─ budget left ─► Restarting ─ delay ─► start
//!                                       └─ exhausted   ─► stays Crashed
//!
//! stop(id) ──► Stopping ──► interrupt ─ grace ─► kill tree ─ kill_wait ─► Stopped
//! ```
//!
//! ## Features
//! | Area              | Description                                              | Key types / traits                          |
//! |-------------------|----------------------------------------------------------|---------------------------------------------|
//! | **Supervision**   | Start/stop/restart, groups, orphan adoption, teardown.   | [`Supervisor`], [`SupervisorBuilder`]       |
//! | **Policies**      | Bounded auto-restart inside a sliding window.            | [`RestartPolicy`]                           |
//! | **Logs**          | Per-process bounded output capture.                      | [`LogStore`], [`LogEntry`]                  |
//! | **Health**        | HTTP/TCP probes with failure thresholds.                 | [`HealthProber`], [`Probe`]                 |
//! | **Alerts**        | Output classification and progressive throttling.        | [`Notifier`], [`Notification`]              |
//! | **Subscriber API**| Hook into lifecycle, log and alert events.               | [`Subscribe`]                               |
//! | **Persistence**   | JSON configuration document.                             | [`ConfigStore`], [`JsonFileStore`]          |
//! | **Discovery**     | Propose definitions from a source tree.                  | [`scan_directory`]                          |
//! | **Errors**        | Typed errors with stable labels.                         | [`SupervisorError`], [`ProbeError`]         |
//!
//! ## Optional features
//! - `logging`: exports a built-in [`LogWriter`] subscriber that renders events through `tracing`.
//!
//! ## Example
//! ```no_run
//! use procvisor::{ProcessDefinition, Supervisor, SupervisorConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sup = Supervisor::builder(SupervisorConfig::default()).build();
//!
//!     let web = ProcessDefinition::new("web", "npm", "run dev").with_working_directory("./web");
//!     sup.start(&web).await?;
//!
//!     for line in sup.logs(web.id) {
//!         println!("{}", line.text);
//!     }
//!
//!     sup.run_until_signal().await?;
//!     Ok(())
//! }
//! ```

mod core;
mod error;
mod events;
mod health;
mod logs;
mod model;
mod notify;
mod policies;
mod scanner;
mod store;
mod subscribers;

// ---- Public re-exports ----

pub use core::{
    CommandShape, ProcessTable, RunningProcess, ShutdownSignal, Supervisor, SupervisorBuilder, SupervisorConfig,
    SysinfoTable, find_orphan, shape_of, wait_for_shutdown_signal,
};
pub use error::{ProbeError, StoreError, SupervisorError};
pub use events::{Bus, Event, EventKind};
pub use health::{HealthProber, NetProbe, Probe};
pub use logs::{DEFAULT_LOG_CAPACITY, LogStore, RingBuffer};
pub use model::{
    DefinitionId, DefinitionTable, GroupId, HealthCheckConfig, HealthCheckKind, LogEntry, LogSource,
    NotificationMode, ProcessDefinition, ProcessGroup, ProcessInstance, ProcessState,
};
pub use notify::{
    DEFAULT_MESSAGE_MAX_LEN, Notification, NotificationLevel, Notifier, ProgressiveThrottle, STREAK_RESET, classify,
};
pub use policies::{RestartDecision, RestartPolicy, RestartWindow};
pub use scanner::scan_directory;
pub use store::{AppSettings, ConfigDocument, ConfigStore, DOCUMENT_VERSION, JsonFileStore};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose a simple built-in logger subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
