//! # Example: supervise
//!
//! Runs the supervisor headless against a configuration document.
//!
//! Shows how to:
//! - Load the persisted [`ConfigDocument`] through a [`JsonFileStore`].
//! - Derive [`SupervisorConfig`] from the stored settings.
//! - Adopt processes left running by a previous session.
//! - Start every group flagged to auto-start.
//! - Print alerts through a custom [`Subscribe`] implementation.
//! - Stop everything sequentially on Ctrl-C / SIGTERM.
//!
//! ## Flow
//! ```text
//! JsonFileStore::load ──► SupervisorConfig::from_settings
//!     └─► Supervisor::builder(cfg).with_subscribers([LogWriter, AlertPrinter]).build()
//!           ├─► adopt_orphans(all definitions)
//!           ├─► start_group(g) for each auto-start group
//!           └─► run_until_signal() ──► stop_all ──► shutdown
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=info cargo run --example supervise                 # default config location
//! RUST_LOG=debug cargo run --example supervise -- ./dev.json  # explicit document
//! cargo run --example supervise -- ./dev.json --scan ~/src/shop  # add a scanned group first
//! ```

use std::sync::Arc;

use anyhow::Context;
use procvisor::{
    ConfigStore, Event, EventKind, JsonFileStore, LogWriter, ProcessDefinition, ProcessGroup, Subscribe, Supervisor,
    SupervisorConfig, scan_directory,
};
use tracing_subscriber::EnvFilter;

/// Prints every alert the notifier raises.
struct AlertPrinter;

#[async_trait::async_trait]
impl Subscribe for AlertPrinter {
    async fn on_event(&self, ev: &Event) {
        if ev.kind != EventKind::Notification {
            return;
        }
        if let Some(n) = &ev.notification {
            println!(
                "[{}] {} / {}: {}",
                n.at.format("%H:%M:%S"),
                n.group_name,
                n.process_name,
                n.message
            );
        }
    }

    fn name(&self) -> &'static str {
        "alert-printer"
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let mut config_path = None;
    let mut scan_root = None;
    while let Some(arg) = args.next() {
        if arg == "--scan" {
            scan_root = Some(args.next().context("--scan needs a directory")?);
        } else {
            config_path = Some(arg);
        }
    }

    let store = match config_path {
        Some(path) => JsonFileStore::new(path),
        None => JsonFileStore::at_default_location()?,
    };
    if let Some(root) = scan_root {
        let found = scan_directory(&root);
        println!("scan of {root} proposed {} process(es)", found.len());
        if !found.is_empty() {
            let group = found
                .into_iter()
                .fold(ProcessGroup::new(root.clone()), ProcessGroup::with_process);
            store.save_group(group).await?;
        }
    }

    let doc = store
        .load()
        .await
        .with_context(|| format!("loading {}", store.path().display()))?;
    tracing::info!(path = %store.path().display(), groups = doc.groups.len(), "configuration loaded");

    let sup = Supervisor::builder(SupervisorConfig::from_settings(&doc.settings))
        .with_subscribers(vec![Arc::new(LogWriter::new()), Arc::new(AlertPrinter)])
        .build();
    for group in &doc.groups {
        sup.register_group(group);
    }

    let all: Vec<ProcessDefinition> = doc.groups.iter().flat_map(|g| g.processes.iter().cloned()).collect();
    let adopted = sup.adopt_orphans(&all).await;
    println!("adopted {adopted} running process(es)");

    for group in doc.auto_start_groups() {
        let started = sup.start_group(group).await;
        println!("group {}: started {started} process(es)", group.name);
    }

    println!("supervising; press Ctrl-C to stop everything");
    sup.run_until_signal().await?;
    println!("all processes stopped");
    Ok(())
}
