//! Persisted configuration document.
//!
//! ```json
//! {
//!   "version": 1,
//!   "settings": { "maxLogLinesPerProcess": 5000, "stopGraceSecs": 5, ... },
//!   "groups": [ { "name": "Shop", "processes": [ ... ] } ]
//! }
//! ```
//!
//! Keys are camelCase. Settings the runtime does not interpret (UI theme,
//! language, tray behavior) are kept verbatim in [`AppSettings::extra`].

use serde::{Deserialize, Serialize};

use crate::logs::DEFAULT_LOG_CAPACITY;
use crate::model::ProcessGroup;

/// Current document schema version.
pub const DOCUMENT_VERSION: u32 = 1;

/// Application-wide settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    /// Lines kept per process in the log store.
    pub max_log_lines_per_process: usize,
    /// Seconds a graceful interrupt is given before the tree is killed.
    pub stop_grace_secs: u64,
    /// Seconds to wait after a forced kill.
    pub kill_wait_secs: u64,
    /// Ask before stopping everything (front-end hint).
    pub confirm_before_stop_all: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            max_log_lines_per_process: DEFAULT_LOG_CAPACITY,
            stop_grace_secs: 5,
            kill_wait_secs: 5,
            confirm_before_stop_all: true,
            extra: serde_json::Map::new(),
        }
    }
}

/// Root of the configuration file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigDocument {
    pub version: u32,
    pub settings: AppSettings,
    pub groups: Vec<ProcessGroup>,
}

impl Default for ConfigDocument {
    fn default() -> Self {
        Self {
            version: DOCUMENT_VERSION,
            settings: AppSettings::default(),
            groups: Vec::new(),
        }
    }
}

impl ConfigDocument {
    /// Groups flagged to start with the supervisor, in sort order.
    pub fn auto_start_groups(&self) -> Vec<&ProcessGroup> {
        let mut groups: Vec<&ProcessGroup> = self.groups.iter().filter(|g| g.auto_start_on_launch).collect();
        groups.sort_by_key(|g| g.sort_order);
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HealthCheckConfig, ProcessDefinition};

    #[test]
    fn empty_object_yields_defaults() {
        let doc: ConfigDocument = serde_json::from_str("{}").unwrap();
        assert_eq!(doc, ConfigDocument::default());
        assert_eq!(doc.settings.max_log_lines_per_process, 5000);
    }

    #[test]
    fn keys_are_camel_case_and_unknown_settings_survive() {
        let raw = r#"{
            "version": 1,
            "settings": { "maxLogLinesPerProcess": 200, "theme": "Dark", "language": "tr" },
            "groups": []
        }"#;
        let doc: ConfigDocument = serde_json::from_str(raw).unwrap();
        assert_eq!(doc.settings.max_log_lines_per_process, 200);
        assert_eq!(doc.settings.stop_grace_secs, 5);
        assert_eq!(doc.settings.extra["theme"], "Dark");

        let out = serde_json::to_value(&doc).unwrap();
        assert_eq!(out["settings"]["language"], "tr");
        assert_eq!(out["settings"]["maxLogLinesPerProcess"], 200);
        assert!(out["settings"].get("max_log_lines_per_process").is_none());
    }

    #[test]
    fn groups_round_trip_with_nested_definitions() {
        let def = ProcessDefinition::new("web", "npm", "run dev")
            .with_health_check(HealthCheckConfig::http("http://localhost:3000"));
        let mut doc = ConfigDocument::default();
        doc.groups.push(ProcessGroup::new("Shop").with_process(def));

        let json = serde_json::to_string_pretty(&doc).unwrap();
        assert!(json.contains("\"autoStartOnLaunch\""));
        assert!(json.contains("\"healthCheck\""));
        let back: ConfigDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn auto_start_groups_are_sorted() {
        let mut doc = ConfigDocument::default();
        let mut late = ProcessGroup::new("late");
        late.sort_order = 5;
        late.auto_start_on_launch = true;
        let mut early = ProcessGroup::new("early");
        early.sort_order = 1;
        early.auto_start_on_launch = true;
        doc.groups = vec![late, ProcessGroup::new("manual"), early];

        let names: Vec<&str> = doc.auto_start_groups().iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["early", "late"]);
    }
}
