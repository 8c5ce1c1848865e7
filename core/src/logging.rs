//! Logging utilities: bounded ring buffer with drop counters and snapshot/iterator APIs

use schema::{LogEntry, LogSnapshot, LogStream};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Default number of lines retained per script
pub const DEFAULT_LOG_CAPACITY: usize = 1000;

/// A log ring shared between a script's reader task and its queriers
pub type SharedLogRing = Arc<Mutex<LogRing>>;

/// A bounded-capacity ring buffer to store recent log entries.
///
/// - When capacity is exceeded, oldest entries are dropped and `total_dropped` is incremented.
/// - Sequence numbers increase monotonically and are attached to each entry when pushed.
#[derive(Debug)]
pub struct LogRing {
    capacity: usize,
    total_dropped: u64,
    next_seq: u64,
    entries: VecDeque<LogEntry>,
}

impl LogRing {
    /// Create a new `LogRing` with the given capacity (must be > 0)
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "LogRing capacity must be > 0");
        Self {
            capacity,
            total_dropped: 0,
            next_seq: 0,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Create a ring already wrapped for sharing across tasks
    pub fn shared(capacity: usize) -> SharedLogRing {
        Arc::new(Mutex::new(Self::new(capacity)))
    }

    /// Push a new entry into the ring, assigning the next sequence number.
    /// If the ring is full, evicts the oldest entry and increments the drop counter.
    pub fn push(&mut self, mut entry: LogEntry) {
        entry.seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);

        if self.entries.len() == self.capacity {
            self.entries.pop_front();
            self.total_dropped = self.total_dropped.saturating_add(1);
        }
        self.entries.push_back(entry);
    }

    /// Stamp and push a line arriving now on `stream`
    pub fn push_line(&mut self, stream: LogStream, message: impl Into<String>) {
        self.push(LogEntry::now(stream, message));
    }

    /// Snapshot the current entries
    pub fn snapshot(&self) -> LogSnapshot {
        LogSnapshot {
            next_seq: self.next_seq,
            total_dropped: self.total_dropped,
            entries: self.entries.iter().cloned().collect(),
        }
    }

    /// Returns all entries with seq strictly greater than `after_seq`.
    /// This is useful for tailing starting from a previously observed sequence.
    pub fn iter_after(&self, after_seq: u64) -> Vec<LogEntry> {
        self.entries
            .iter()
            .filter(|e| e.seq > after_seq)
            .cloned()
            .collect()
    }

    /// Snapshot restricted to entries after `after_seq`, or everything when `None`
    pub fn snapshot_after(&self, after_seq: Option<u64>) -> LogSnapshot {
        match after_seq {
            None => self.snapshot(),
            Some(seq) => LogSnapshot {
                next_seq: self.next_seq,
                total_dropped: self.total_dropped,
                entries: self.iter_after(seq),
            },
        }
    }
}
