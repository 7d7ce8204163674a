//! Bounded in-memory log ring served by the admin API.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use jiff::{Zoned, tz::TimeZone};
use logforth::append::Append;
use serde::Serialize;

/// One captured log record.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    /// UTC timestamp of the record.
    pub timestamp: String,
    /// Log level name.
    pub level: String,
    /// Module path of the record's origin, when known.
    pub target: String,
    /// The formatted message.
    pub message: String,
}

/// A fixed-capacity ring of recent log records.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    inner: Arc<Mutex<VecDeque<LogEntry>>>,
    capacity: usize,
}

impl LogBuffer {
    /// Creates a buffer holding up to `capacity` records.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(4096)))),
            capacity: capacity.max(1),
        }
    }

    fn push(&self, entry: LogEntry) {
        let Ok(mut entries) = self.inner.lock() else {
            return;
        };

        if entries.len() == self.capacity {
            entries.pop_front();
        }

        entries.push_back(entry);
    }

    /// The most recent `limit` records, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<LogEntry> {
        let Ok(entries) = self.inner.lock() else {
            return Vec::new();
        };

        let skip = entries.len().saturating_sub(limit);
        entries.iter().skip(skip).cloned().collect()
    }
}

/// A logforth appender feeding the ring. Never blocks and never fails the
/// logging pipeline.
#[derive(Debug)]
pub struct RingAppender {
    buffer: LogBuffer,
}

impl RingAppender {
    /// Creates an appender writing into `buffer`.
    pub fn new(buffer: LogBuffer) -> Self {
        Self { buffer }
    }
}

impl Append for RingAppender {
    fn append(
        &self,
        record: &log::Record<'_>,
        _diagnostics: &[Box<dyn logforth::diagnostic::Diagnostic>],
    ) -> anyhow::Result<()> {
        let timestamp = Zoned::now()
            .with_time_zone(TimeZone::UTC)
            .strftime("%Y-%m-%dT%H:%M:%S%.6fZ")
            .to_string();

        self.buffer.push(LogEntry {
            timestamp,
            level: record.level().to_string(),
            target: record.target().to_string(),
            message: record.args().to_string(),
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(message: &str) -> LogEntry {
        LogEntry {
            timestamp: "2026-01-01T00:00:00.000000Z".to_string(),
            level: "INFO".to_string(),
            target: "test".to_string(),
            message: message.to_string(),
        }
    }

    #[test]
    fn ring_evicts_oldest() {
        let buffer = LogBuffer::new(3);

        for i in 0..5 {
            buffer.push(entry(&format!("line {i}")));
        }

        let recent = buffer.recent(10);
        let messages: Vec<&str> = recent.iter().map(|e| e.message.as_str()).collect();

        assert_eq!(messages, ["line 2", "line 3", "line 4"]);
    }

    #[test]
    fn recent_returns_the_tail() {
        let buffer = LogBuffer::new(10);

        for i in 0..6 {
            buffer.push(entry(&format!("line {i}")));
        }

        let recent = buffer.recent(2);
        let messages: Vec<&str> = recent.iter().map(|e| e.message.as_str()).collect();

        assert_eq!(messages, ["line 4", "line 5"]);
    }
}
