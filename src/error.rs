//! Error types used by the procvisor runtime.
//!
//! - [`SupervisorError`] failures of supervisor operations (launch, lookup, shutdown).
//! - [`ProbeError`] a single failed health probe.
//! - [`StoreError`] configuration document load/save failures.
//!
//! Each type provides `as_label` (stable snake_case) for logs.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::model::DefinitionId;

/// # Errors produced by the supervisor.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// The definition has never been registered with the supervisor.
    #[error("unknown process definition {id}")]
    UnknownDefinition {
        /// Requested definition id.
        id: DefinitionId,
    },

    /// The definition has an empty command.
    #[error("process '{name}' has no command")]
    EmptyCommand {
        /// Display name of the definition.
        name: String,
    },

    /// The OS refused to create the child process.
    #[error("failed to launch '{command}': {source}")]
    Launch {
        /// Command line that was attempted.
        command: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Processes were still alive after the shutdown grace period.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Display names of the processes that did not stop in time.
        stuck: Vec<String>,
    },
}

impl SupervisorError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use procvisor::SupervisorError;
    ///
    /// let err = SupervisorError::EmptyCommand { name: "api".into() };
    /// assert_eq!(err.as_label(), "supervisor_empty_command");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            SupervisorError::UnknownDefinition { .. } => "supervisor_unknown_definition",
            SupervisorError::EmptyCommand { .. } => "supervisor_empty_command",
            SupervisorError::Launch { .. } => "supervisor_launch_failed",
            SupervisorError::GraceExceeded { .. } => "supervisor_grace_exceeded",
        }
    }
}

/// # A failed health probe.
///
/// Probe failures are transient: they only count toward the unhealthy threshold.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ProbeError {
    /// The probe did not complete within its timeout.
    #[error("probe timed out after {timeout:?}")]
    Timeout {
        /// Configured probe timeout.
        timeout: Duration,
    },

    /// The HTTP endpoint answered with a non-success status.
    #[error("unhealthy status {status}")]
    Status {
        /// Returned HTTP status code.
        status: u16,
    },

    /// Transport-level failure (connection refused, DNS, TLS, ...).
    #[error("probe failed: {error}")]
    Transport {
        /// Underlying error message.
        error: String,
    },
}

impl ProbeError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ProbeError::Timeout { .. } => "probe_timeout",
            ProbeError::Status { .. } => "probe_bad_status",
            ProbeError::Transport { .. } => "probe_transport",
        }
    }
}

/// # Configuration store failures.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum StoreError {
    /// Reading or writing the document failed.
    #[error("io error on {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document could not be parsed or serialized.
    #[error("invalid configuration document {path}: {source}")]
    Format {
        /// File involved.
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// No platform configuration directory could be determined.
    #[error("no configuration directory available")]
    NoConfigDir,
}

impl StoreError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            StoreError::Io { .. } => "store_io",
            StoreError::Format { .. } => "store_format",
            StoreError::NoConfigDir => "store_no_config_dir",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_stable() {
        let id = DefinitionId::new();
        assert_eq!(SupervisorError::UnknownDefinition { id }.as_label(), "supervisor_unknown_definition");
        assert_eq!(ProbeError::Status { status: 503 }.as_label(), "probe_bad_status");
        assert_eq!(StoreError::NoConfigDir.as_label(), "store_no_config_dir");
    }

    #[test]
    fn launch_error_keeps_source() {
        let err = SupervisorError::Launch {
            command: "nope --x".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        assert!(err.to_string().contains("nope --x"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
