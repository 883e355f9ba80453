use std::sync::Arc;

use crate::{
    core::{
        SupervisorConfig,
        os::{ProcessTable, SysinfoTable},
    },
    events::Bus,
    health::{HealthProber, NetProbe, Probe},
    logs::LogStore,
    model::DefinitionTable,
    notify::Notifier,
    subscribers::{Subscribe, SubscriberSet},
};

use super::supervisor::Supervisor;

/// Builder for constructing a [`Supervisor`].
///
/// The notifier is always installed; user subscribers are appended after it.
pub struct SupervisorBuilder {
    cfg: SupervisorConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
    probe: Option<Arc<dyn Probe>>,
    processes: Option<Arc<dyn ProcessTable>>,
}

impl SupervisorBuilder {
    pub fn new(cfg: SupervisorConfig) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            probe: None,
            processes: None,
        }
    }

    /// Sets event subscribers.
    ///
    /// Each subscriber gets its own worker and bounded queue.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Replaces the network probe used by health checks.
    pub fn with_probe(mut self, probe: Arc<dyn Probe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Replaces the OS process table used for adoption and tree kills.
    pub fn with_process_table(mut self, processes: Arc<dyn ProcessTable>) -> Self {
        self.processes = Some(processes);
        self
    }

    /// Builds the supervisor and spawns its background listeners.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn build(self) -> Arc<Supervisor> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let table = Arc::new(DefinitionTable::new());
        let logs = Arc::new(LogStore::new(self.cfg.log_capacity, bus.clone()));

        let probe = self.probe.unwrap_or_else(|| Arc::new(NetProbe::default()));
        let prober = HealthProber::new(probe, bus.clone());
        let processes = self
            .processes
            .unwrap_or_else(|| Arc::new(SysinfoTable::new()));

        let notifier =
            Notifier::new(Arc::clone(&table), bus.clone()).with_message_max_len(self.cfg.message_max_len);
        let mut subscribers: Vec<Arc<dyn Subscribe>> = Vec::with_capacity(self.subscribers.len() + 1);
        subscribers.push(Arc::new(notifier));
        subscribers.extend(self.subscribers);
        let set = SubscriberSet::new(subscribers, bus.clone());

        let sup = Arc::new(Supervisor::new_internal(
            self.cfg, bus, table, logs, prober, processes,
        ));
        sup.spawn_subscriber_listener(set);
        sup.spawn_control_listener();
        sup
    }
}

impl Supervisor {
    /// Returns a builder for `cfg`.
    pub fn builder(cfg: SupervisorConfig) -> SupervisorBuilder {
        SupervisorBuilder::new(cfg)
    }
}
