//! Configuration loading and validation
//!
//! A single TOML file configures both the daemon's control plane (`[daemon]`)
//! and the script supervisor (`[supervisor]`). Every field has a default, so
//! an empty file is a valid configuration. Validation reports field paths.

use crate::logging::DEFAULT_LOG_CAPACITY;
use crate::{CoreError, Result};
use schema::DaemonConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct FarmConfig {
    /// Control plane settings
    pub daemon: DaemonConfig,
    /// Script supervisor settings
    pub supervisor: SupervisorConfig,
}

/// Settings consumed by [`crate::supervisor::Supervisor`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct SupervisorConfig {
    /// Farm server host handed to scripts when the caller gives no URL
    pub server_host: String,
    /// Farm server port handed to scripts when the caller gives no URL
    pub server_port: u16,
    /// Token passed to scripts as `--token`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    /// Directory holding uploaded scripts
    pub scripts_dir: PathBuf,
    /// Program (and leading arguments) every script is launched through.
    /// Empty means the script is executed directly.
    pub runner: Vec<String>,
    /// How long `stop` waits after SIGTERM before sending SIGKILL
    pub graceful_timeout_secs: u64,
    /// Lines retained per script
    pub log_capacity: usize,
    /// Reader polling interval
    pub poll_interval_ms: u64,
    /// Upper bound on waiting for already-buffered output once a process is gone
    pub drain_timeout_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            server_host: "127.0.0.1".to_string(),
            server_port: 5000,
            api_token: None,
            scripts_dir: PathBuf::from("scripts"),
            runner: vec!["python3".to_string(), "start_sploit.py".to_string()],
            graceful_timeout_secs: 5,
            log_capacity: DEFAULT_LOG_CAPACITY,
            poll_interval_ms: 100,
            drain_timeout_ms: 50,
        }
    }
}

impl SupervisorConfig {
    /// URL of the farm server built from host and port
    pub fn default_server_url(&self) -> String {
        format!("http://{}:{}", self.server_host, self.server_port)
    }

    pub fn graceful_timeout(&self) -> Duration {
        Duration::from_secs(self.graceful_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// Validate the supervisor section
    pub fn validate(&self) -> Result<()> {
        if self.server_host.trim().is_empty() {
            return Err(CoreError::ValidationError(
                "supervisor.serverHost: cannot be empty".to_string(),
            ));
        }
        if self.server_port == 0 {
            return Err(CoreError::ValidationError(
                "supervisor.serverPort: must be 1..=65535".to_string(),
            ));
        }
        if self.scripts_dir.as_os_str().is_empty() {
            return Err(CoreError::ValidationError(
                "supervisor.scriptsDir: cannot be empty".to_string(),
            ));
        }
        if let Some(i) = self.runner.iter().position(|arg| arg.trim().is_empty()) {
            return Err(CoreError::ValidationError(format!(
                "supervisor.runner[{}]: cannot be blank",
                i
            )));
        }
        if self.graceful_timeout_secs == 0 {
            return Err(CoreError::ValidationError(
                "supervisor.gracefulTimeoutSecs: must be > 0".to_string(),
            ));
        }
        if self.log_capacity == 0 {
            return Err(CoreError::ValidationError(
                "supervisor.logCapacity: must be > 0".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(CoreError::ValidationError(
                "supervisor.pollIntervalMs: must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl FarmConfig {
    /// Validate both sections
    pub fn validate(&self) -> Result<()> {
        if self.daemon.host.trim().is_empty() {
            return Err(CoreError::ValidationError(
                "daemon.host: cannot be empty".to_string(),
            ));
        }
        if self.daemon.port == 0 {
            return Err(CoreError::ValidationError(
                "daemon.port: must be 1..=65535".to_string(),
            ));
        }
        if self.daemon.max_connections == 0 {
            return Err(CoreError::ValidationError(
                "daemon.maxConnections: must be > 0".to_string(),
            ));
        }
        self.supervisor.validate()
    }

    /// Load configuration from a TOML file path
    pub fn load_from_toml_path(path: impl AsRef<Path>) -> Result<Self> {
        let data = fs::read_to_string(&path).map_err(|e| {
            CoreError::ConfigurationError(format!(
                "Failed to read config {:?}: {}",
                path.as_ref(),
                e
            ))
        })?;
        Self::load_from_toml_str(&data)
    }

    /// Load configuration from a TOML string
    pub fn load_from_toml_str(input: &str) -> Result<Self> {
        let cfg: FarmConfig = toml::from_str(input)
            .map_err(|e| CoreError::ConfigurationError(format!("TOML parse error: {}", e)))?;
        cfg.validate()?;
        Ok(cfg)
    }
}
