use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::model::definition::DefinitionId;

/// Channel a log line came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LogSource {
    StdOut,
    StdErr,
    /// Lifecycle messages written by the supervisor itself.
    System,
}

/// One immutable output line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub process: DefinitionId,
    pub at: DateTime<Local>,
    pub text: String,
    pub source: LogSource,
}

impl LogEntry {
    /// Creates an entry stamped with the current local time.
    pub fn now(process: DefinitionId, text: impl Into<String>, source: LogSource) -> Self {
        Self {
            process,
            at: Local::now(),
            text: text.into(),
            source,
        }
    }
}
