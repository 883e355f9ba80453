//! # Per-process log store.
//!
//! [`LogStore`] keeps the most recent output lines of every supervised process
//! in a fixed-capacity [`RingBuffer`] and announces each appended line on the
//! [`Bus`] as a `LogAppended` event before `append` returns.
//!
//! ## Rules
//! - Capacity is set once and applies to every process id.
//! - Buffers are allocated lazily on the first append for an id.
//! - `logs()` returns a point-in-time snapshot, oldest first.
//! - `clear()` affects one id only.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::events::{Bus, Event};
use crate::logs::ring::RingBuffer;
use crate::model::{DefinitionId, LogEntry, LogSource};

/// Default lines kept per process.
pub const DEFAULT_LOG_CAPACITY: usize = 5000;

/// Bounded in-memory log of every process.
pub struct LogStore {
    capacity: usize,
    buffers: DashMap<DefinitionId, Arc<Mutex<RingBuffer<Arc<LogEntry>>>>>,
    bus: Bus,
}

impl LogStore {
    /// Creates a store keeping `capacity` lines per process.
    pub fn new(capacity: usize, bus: Bus) -> Self {
        Self {
            capacity: capacity.max(1),
            buffers: DashMap::new(),
            bus,
        }
    }

    /// Appends a timestamped line and publishes it.
    pub fn append(&self, process: DefinitionId, text: impl Into<String>, source: LogSource) {
        let entry = Arc::new(LogEntry::now(process, text, source));
        let buffer = self.buffer(process);
        buffer.lock().push(Arc::clone(&entry));
        self.bus.publish(Event::log_appended(entry));
    }

    /// Snapshot of the lines kept for `process`, oldest first.
    pub fn logs(&self, process: DefinitionId) -> Vec<LogEntry> {
        let Some(buffer) = self.buffers.get(&process).map(|b| Arc::clone(b.value())) else {
            return Vec::new();
        };
        let snapshot = buffer.lock().to_vec();
        snapshot.into_iter().map(|e| (*e).clone()).collect()
    }

    /// Empties the buffer of `process`.
    pub fn clear(&self, process: DefinitionId) {
        if let Some(buffer) = self.buffers.get(&process).map(|b| Arc::clone(b.value())) {
            buffer.lock().clear();
        }
    }

    /// Lines kept per process.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn buffer(&self, process: DefinitionId) -> Arc<Mutex<RingBuffer<Arc<LogEntry>>>> {
        let entry = self
            .buffers
            .entry(process)
            .or_insert_with(|| Arc::new(Mutex::new(RingBuffer::new(self.capacity))));
        Arc::clone(entry.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[test]
    fn keeps_at_most_capacity_lines() {
        let store = LogStore::new(3, Bus::new(16));
        let id = DefinitionId::new();
        for i in 0..10 {
            store.append(id, format!("line {i}"), LogSource::StdOut);
        }
        let texts: Vec<String> = store.logs(id).into_iter().map(|e| e.text).collect();
        assert_eq!(texts, vec!["line 7", "line 8", "line 9"]);
    }

    #[test]
    fn clear_only_affects_one_process() {
        let store = LogStore::new(10, Bus::new(16));
        let a = DefinitionId::new();
        let b = DefinitionId::new();
        store.append(a, "a", LogSource::StdOut);
        store.append(b, "b", LogSource::StdErr);

        store.clear(a);
        assert!(store.logs(a).is_empty());
        assert_eq!(store.logs(b).len(), 1);
        assert_eq!(store.logs(b)[0].source, LogSource::StdErr);
    }

    #[test]
    fn unknown_process_has_no_logs() {
        let store = LogStore::new(10, Bus::new(16));
        assert!(store.logs(DefinitionId::new()).is_empty());
    }

    #[tokio::test]
    async fn append_publishes_before_returning() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let store = LogStore::new(10, bus);
        let id = DefinitionId::new();

        store.append(id, "ready", LogSource::System);

        let ev = rx.try_recv().expect("event already queued");
        assert_eq!(ev.kind, EventKind::LogAppended);
        let entry = ev.entry.unwrap();
        assert_eq!(entry.text, "ready");
        assert_eq!(entry.source, LogSource::System);
    }
}
