//! # Process definitions.
//!
//! A [`ProcessDefinition`] is the static description of one supervised process:
//! what to launch, where, with which environment, and which policies apply to it.
//! Definitions are owned by the configuration store and are never mutated by the
//! supervisor during a run; editing happens between runs.
//!
//! ## Example
//! ```rust
//! use procvisor::{NotificationMode, ProcessDefinition, RestartPolicy};
//!
//! let def = ProcessDefinition::new("api", "dotnet", r#"run --project "src/Api/Api.csproj""#)
//!     .with_working_directory("/work/app")
//!     .with_env("ASPNETCORE_ENVIRONMENT", "Development")
//!     .with_restart(RestartPolicy { max_attempts: 5, ..RestartPolicy::default() })
//!     .with_notification_mode(NotificationMode::ErrorAndWarning);
//!
//! assert_eq!(def.argv(), vec!["run", "--project", "src/Api/Api.csproj"]);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::health::HealthCheckConfig;
use crate::policies::RestartPolicy;

/// Stable identifier of a process definition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DefinitionId(pub Uuid);

impl DefinitionId {
    /// Generates a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DefinitionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DefinitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Stable identifier of a process group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub Uuid);

impl GroupId {
    /// Generates a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GroupId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// How chatty the notifier is for one process.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationMode {
    /// No notifications at all, crashes included.
    Off,
    /// Error-level log lines and crashes.
    #[default]
    ErrorOnly,
    /// Warnings as well.
    ErrorAndWarning,
}

/// Static description of a supervised process.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessDefinition {
    /// Stable identity.
    pub id: DefinitionId,
    /// Owning group, if any.
    pub group_id: Option<GroupId>,
    /// Display name.
    pub name: String,
    /// Executable to launch (resolved through `PATH`).
    pub command: String,
    /// Argument string, split with shell quoting rules at launch time.
    pub arguments: String,
    /// Working directory; empty means "inherit".
    pub working_directory: String,
    /// Environment overrides applied on top of the inherited environment.
    pub environment: BTreeMap<String, String>,
    /// Position inside the group.
    pub sort_order: i32,
    /// Crash recovery policy.
    pub restart: RestartPolicy,
    /// Optional liveness probe.
    pub health_check: Option<HealthCheckConfig>,
    /// Delay applied by group start before launching this process.
    pub startup_delay_secs: u64,
    /// Whether group start launches this process.
    pub auto_start_with_group: bool,
    /// Notification verbosity.
    pub notification_mode: NotificationMode,
}

impl Default for ProcessDefinition {
    fn default() -> Self {
        Self {
            id: DefinitionId::new(),
            group_id: None,
            name: String::new(),
            command: String::new(),
            arguments: String::new(),
            working_directory: String::new(),
            environment: BTreeMap::new(),
            sort_order: 0,
            restart: RestartPolicy::default(),
            health_check: None,
            startup_delay_secs: 0,
            auto_start_with_group: true,
            notification_mode: NotificationMode::default(),
        }
    }
}

impl ProcessDefinition {
    /// Creates a definition with default policies.
    pub fn new(
        name: impl Into<String>,
        command: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            arguments: arguments.into(),
            ..Self::default()
        }
    }

    #[inline]
    pub fn with_working_directory(mut self, dir: impl Into<String>) -> Self {
        self.working_directory = dir.into();
        self
    }

    #[inline]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    #[inline]
    pub fn with_restart(mut self, restart: RestartPolicy) -> Self {
        self.restart = restart;
        self
    }

    #[inline]
    pub fn with_health_check(mut self, check: HealthCheckConfig) -> Self {
        self.health_check = Some(check);
        self
    }

    #[inline]
    pub fn with_startup_delay(mut self, secs: u64) -> Self {
        self.startup_delay_secs = secs;
        self
    }

    #[inline]
    pub fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start_with_group = auto_start;
        self
    }

    #[inline]
    pub fn with_notification_mode(mut self, mode: NotificationMode) -> Self {
        self.notification_mode = mode;
        self
    }

    #[inline]
    pub fn with_group(mut self, group: GroupId) -> Self {
        self.group_id = Some(group);
        self
    }

    /// Delay applied by group start.
    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }

    /// Splits the argument string into argv entries.
    ///
    /// Uses shell quoting rules; an unbalanced quote falls back to whitespace splitting.
    pub fn argv(&self) -> Vec<String> {
        shlex::split(&self.arguments).unwrap_or_else(|| {
            self.arguments
                .split_whitespace()
                .map(String::from)
                .collect()
        })
    }

    /// Human-readable command line (for system log lines).
    pub fn command_line(&self) -> String {
        if self.arguments.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.arguments)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argv_respects_quotes() {
        let def = ProcessDefinition::new("x", "dotnet", r#"run --project "C:\src\My Api\Api.csproj""#);
        assert_eq!(
            def.argv(),
            vec!["run", "--project", r"C:\src\My Api\Api.csproj"]
        );
    }

    #[test]
    fn argv_falls_back_on_unbalanced_quote() {
        let def = ProcessDefinition::new("x", "echo", r#"hello "world"#);
        assert_eq!(def.argv(), vec!["hello", "\"world"]);
    }

    #[test]
    fn deserializes_with_defaults() {
        let def: ProcessDefinition =
            serde_json::from_str(r#"{"name":"web","command":"npm","arguments":"run dev"}"#).unwrap();
        assert!(def.auto_start_with_group);
        assert_eq!(def.notification_mode, NotificationMode::ErrorOnly);
        assert_eq!(def.restart.max_attempts, 3);
        assert!(def.health_check.is_none());
    }

    #[test]
    fn notification_mode_is_camel_case() {
        let json = serde_json::to_string(&NotificationMode::ErrorAndWarning).unwrap();
        assert_eq!(json, "\"errorAndWarning\"");
    }
}
