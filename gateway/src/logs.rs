//! In-memory log ring buffer.
//!
//! Components append human-readable lines here in addition to `tracing`, so the
//! HTTP API can serve recent gateway and llama-server output.

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::Level;

pub const DEFAULT_CAPACITY: usize = 500;

/// Destination for human-readable log lines.
pub trait LogSink: Send + Sync {
    fn append(&self, level: Level, message: &str);
}

/// Log `message` through `tracing` and append it to `sink`.
pub fn emit(sink: &dyn LogSink, level: Level, message: &str) {
    match level {
        Level::ERROR => tracing::error!("{}", message),
        Level::WARN => tracing::warn!("{}", message),
        Level::INFO => tracing::info!("{}", message),
        _ => tracing::debug!("{}", message),
    }
    sink.append(level, message);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub id: u64,
    pub line: String,
}

struct Ring {
    entries: VecDeque<LogEntry>,
    next_id: u64,
}

/// Bounded, append-only log buffer. The oldest line is dropped once full.
pub struct LogBuffer {
    capacity: usize,
    inner: Mutex<Ring>,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Ring {
                entries: VecDeque::with_capacity(capacity.max(1)),
                next_id: 1,
            }),
        }
    }

    /// The last `limit` lines, oldest first.
    pub fn tail(&self, limit: usize) -> Vec<String> {
        let ring = self.inner.lock();
        let skip = ring.entries.len().saturating_sub(limit);
        ring.entries.iter().skip(skip).map(|e| e.line.clone()).collect()
    }

    /// Entries with an id greater than `id`, oldest first.
    pub fn since(&self, id: u64) -> Vec<LogEntry> {
        let ring = self.inner.lock();
        ring.entries.iter().filter(|e| e.id > id).cloned().collect()
    }

    /// Id of the newest entry, 0 when nothing was logged yet.
    pub fn last_id(&self) -> u64 {
        self.inner.lock().next_id - 1
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl LogSink for LogBuffer {
    fn append(&self, level: Level, message: &str) {
        let line = format!(
            "{} {:<5} {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            level,
            message
        );

        let mut ring = self.inner.lock();
        let id = ring.next_id;
        ring.next_id += 1;
        if ring.entries.len() == self.capacity {
            ring.entries.pop_front();
        }
        ring.entries.push_back(LogEntry { id, line });
    }
}
