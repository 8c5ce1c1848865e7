//! Schema definitions for the sploit supervisor
//!
//! This crate contains the data structures shared by the supervisor core,
//! the daemon and the operator CLI. All types here implement JSON Schema
//! generation for external consumption.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

pub mod script;

#[cfg(test)]
mod json_roundtrip_tests;

pub use script::*;

/// Current wall-clock time in RFC3339 format with millisecond precision
#[must_use]
pub fn current_timestamp() -> String {
    humantime::format_rfc3339_millis(SystemTime::now()).to_string()
}

/// Requests accepted by the daemon control plane
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Message {
    /// Request daemon status
    Status,
    /// Launch a script
    #[serde(rename_all = "camelCase")]
    StartScript {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        server_url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task: Option<String>,
    },
    /// Stop a running script
    StopScript { name: String },
    /// Query one script's status
    ScriptStatus { name: String },
    /// List all live scripts
    ListRunning,
    /// Stop (if needed) and remove a script together with its logs
    DeleteScript { name: String },
    /// Fetch captured output
    #[serde(rename_all = "camelCase")]
    ScriptLogs {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        after_seq: Option<u64>,
    },
    /// Store a script file under the given name
    UploadScript { name: String, content: String },
    /// List stored script files
    ListScripts,
}

/// Response types from the daemon
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Response {
    /// Successful operation with message
    Ok { message: String },
    /// Error response with details
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
    /// Daemon status information
    #[serde(rename_all = "camelCase")]
    Status {
        running: bool,
        uptime_seconds: u64,
        pid: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        version: Option<String>,
    },
    /// A script was launched
    Started(StartedScript),
    /// Status of a single script
    ScriptStatus(ScriptStatusReport),
    /// Live scripts
    Running { scripts: Vec<RunningScript> },
    /// Captured output
    Logs(LogSnapshot),
    /// Stored script files
    Scripts { names: Vec<String> },
}

/// Configuration structure for the daemon
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct DaemonConfig {
    /// Host to bind the control plane to
    pub host: String,
    /// Port to bind the control plane to
    pub port: u16,
    /// Log level for the daemon
    pub log_level: String,
    /// Maximum number of concurrent connections
    pub max_connections: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 49384,
            log_level: "info".to_string(),
            max_connections: 100,
        }
    }
}
