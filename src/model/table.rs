//! # Definition table shared by the supervisor and the notifier.
//!
//! Records the last known version of every definition the supervisor has been
//! handed, plus group display names. Reads never block writers for long
//! (sharded map), so the notifier can resolve modes on every log line.

use std::sync::Arc;

use dashmap::DashMap;

use crate::model::definition::{DefinitionId, GroupId, NotificationMode, ProcessDefinition};
use crate::model::group::ProcessGroup;

const UNKNOWN: &str = "Unknown";

/// Concurrent map of known definitions and group names.
#[derive(Default)]
pub struct DefinitionTable {
    defs: DashMap<DefinitionId, Arc<ProcessDefinition>>,
    groups: DashMap<GroupId, String>,
}

impl DefinitionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records (or replaces) a definition and returns the shared copy.
    pub fn insert(&self, def: ProcessDefinition) -> Arc<ProcessDefinition> {
        let def = Arc::new(def);
        self.defs.insert(def.id, Arc::clone(&def));
        def
    }

    /// Records a group name and every definition in it.
    pub fn insert_group(&self, group: &ProcessGroup) {
        self.groups.insert(group.id, group.name.clone());
        for def in &group.processes {
            let mut def = def.clone();
            def.group_id = Some(group.id);
            self.insert(def);
        }
    }

    pub fn get(&self, id: DefinitionId) -> Option<Arc<ProcessDefinition>> {
        self.defs.get(&id).map(|d| Arc::clone(d.value()))
    }

    /// Notification mode for `id`; unknown definitions default to `ErrorOnly`.
    pub fn notification_mode(&self, id: DefinitionId) -> NotificationMode {
        self.defs
            .get(&id)
            .map(|d| d.notification_mode)
            .unwrap_or(NotificationMode::ErrorOnly)
    }

    /// `(group name, process name)` with `"Unknown"` fallbacks.
    pub fn display_names(&self, id: DefinitionId) -> (String, String) {
        let Some(def) = self.get(id) else {
            return (UNKNOWN.to_string(), UNKNOWN.to_string());
        };
        let group = def
            .group_id
            .and_then(|g| self.groups.get(&g).map(|n| n.value().clone()))
            .unwrap_or_else(|| UNKNOWN.to_string());
        let name = if def.name.is_empty() {
            UNKNOWN.to_string()
        } else {
            def.name.clone()
        };
        (group, name)
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}
