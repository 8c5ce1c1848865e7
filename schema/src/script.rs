//! Script lifecycle and log types
//!
//! These types describe a supervised sploit script as seen from outside the
//! supervisor: its captured output, its lifecycle state and the reports the
//! control plane hands back to operators.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Output stream a log line was captured from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    /// Standard output
    Stdout,
    /// Standard error
    Stderr,
}

impl LogStream {
    /// Lowercase stream name as used on the wire
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

impl std::fmt::Display for LogStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single line of script output
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Sequence number assigned by the owning log buffer
    pub seq: u64,
    /// Arrival time in RFC3339 format
    pub timestamp: String,
    /// Stream the line arrived on
    pub stream_kind: LogStream,
    /// Line content without the trailing newline
    pub message: String,
}

impl LogEntry {
    /// Create an entry stamped with the current time. The sequence number is
    /// assigned when the entry is pushed into a buffer.
    #[must_use]
    pub fn now(stream_kind: LogStream, message: impl Into<String>) -> Self {
        Self {
            seq: 0,
            timestamp: crate::current_timestamp(),
            stream_kind,
            message: message.into(),
        }
    }
}

/// Lifecycle state of a registered script process
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScriptState {
    /// Process is alive
    Running,
    /// Process exited on its own
    Finished,
    /// Process was terminated by an operator
    Stopped,
}

impl ScriptState {
    /// Whether no further transitions are possible
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Stopped)
    }
}

/// Answer to a status query for a single script
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScriptStatusReport {
    /// No registry entry exists for the name
    NotRunning,
    /// The process is alive
    #[serde(rename_all = "camelCase")]
    Running {
        pid: u32,
        start_time: String,
        command: Vec<String>,
    },
    /// The process has exited; reported exactly once before the entry is reclaimed
    #[serde(rename_all = "camelCase")]
    Finished {
        pid: u32,
        start_time: String,
        command: Vec<String>,
        /// Exit code, absent when the process died from a signal
        #[serde(skip_serializing_if = "Option::is_none")]
        return_code: Option<i32>,
    },
}

/// One row of the running-scripts listing
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RunningScript {
    pub name: String,
    pub pid: u32,
    pub start_time: String,
    pub status: ScriptState,
    pub command: Vec<String>,
    pub task: String,
}

/// Result of a successful start
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StartedScript {
    pub pid: u32,
    pub command: Vec<String>,
    pub task: String,
}

/// Point-in-time copy of a script's log buffer
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LogSnapshot {
    /// Next sequence number the buffer will assign
    pub next_seq: u64,
    /// Entries evicted since the buffer was created
    pub total_dropped: u64,
    pub entries: Vec<LogEntry>,
}
