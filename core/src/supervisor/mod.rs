//! Script supervisor
//!
//! [`Supervisor`] is the lifecycle controller for sploit scripts and the only
//! component the control plane talks to. Per script name the lifecycle is
//!
//! ```text
//! NotStarted → Running → Finished | Stopped
//! ```
//!
//! Terminal states are reclaimed lazily: the first `status` or
//! `list_running` that sees a process gone removes its registry entry, after
//! which the name can be started again.
//!
//! Every operation validates its input before touching any state. Typed
//! outcomes (`InvalidName`, `NotFound`, `AlreadyRunning`, `NotRunning`,
//! `ExecutionFailure`) are returned as-is; any other failure is logged and
//! reported as `InternalError`.
//!
//! ## Limitations
//!
//! Registry and logs live in memory only. If the daemon dies without running
//! [`Supervisor::shutdown`], its children keep running unsupervised.

use crate::config::SupervisorConfig;
use crate::log_reader::{LogReader, OutputStream, ReaderConfig};
use crate::logging::SharedLogRing;
use crate::names::validate_script_name;
use crate::process;
use crate::registry::{ProcessInfo, ProcessRegistry, ScriptProcess};
use crate::store::{DirScriptStore, ScriptStore};
use crate::{CoreError, Result};
use schema::{
    LogSnapshot, LogStream, RunningScript, ScriptState, ScriptStatusReport, StartedScript,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

pub mod command;

pub use command::build_command;

/// Upper bound on waiting for a stopped script's last output
const READER_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle controller for sploit scripts
pub struct Supervisor {
    config: SupervisorConfig,
    store: Arc<dyn ScriptStore>,
    registry: ProcessRegistry,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    /// Create a supervisor storing scripts in `config.scripts_dir`
    pub fn new(config: SupervisorConfig) -> Result<Self> {
        let store = DirScriptStore::open(&config.scripts_dir)?;
        Ok(Self::with_store(config, Arc::new(store)))
    }

    /// Create a supervisor over an explicit script store
    pub fn with_store(config: SupervisorConfig, store: Arc<dyn ScriptStore>) -> Self {
        let registry = ProcessRegistry::new(config.log_capacity);
        Self {
            config,
            store,
            registry,
        }
    }

    /// Launch `name` through the configured runner.
    ///
    /// The script must exist and have no live process. Its log ring gets a
    /// `Started process <pid>: <command>` line ahead of the script's output.
    pub async fn start(
        &self,
        name: &str,
        server_url: Option<&str>,
        task: Option<&str>,
    ) -> Result<StartedScript> {
        at_boundary("start", name, self.start_inner(name, server_url, task).await)
    }

    /// SIGTERM the script's process group, SIGKILL it after the graceful
    /// timeout, then drop its registry entry. Logs are kept.
    ///
    /// The entry stays registered until the process is reaped, so the name
    /// cannot be started again while its old process is still going.
    pub async fn stop(&self, name: &str) -> Result<()> {
        at_boundary("stop", name, self.stop_inner(name).await)
    }

    /// Report on `name`. A finished process is reported once and reclaimed.
    pub async fn status(&self, name: &str) -> Result<ScriptStatusReport> {
        at_boundary("status", name, self.status_inner(name).await)
    }

    /// All scripts still alive; exited ones found on the way are reclaimed
    pub async fn list_running(&self) -> Result<Vec<RunningScript>> {
        let live = self.registry.sweep().await;
        Ok(live.iter().map(ProcessInfo::to_running_script).collect())
    }

    /// Stop `name` if it runs, then remove its file and its logs. The name
    /// cannot be started until the delete has finished.
    pub async fn delete(&self, name: &str) -> Result<()> {
        at_boundary("delete", name, self.delete_inner(name).await)
    }

    /// Snapshot of the captured output of `name`
    pub async fn logs(&self, name: &str, after_seq: Option<u64>) -> Result<LogSnapshot> {
        at_boundary("logs", name, self.logs_inner(name, after_seq).await)
    }

    /// Store a script under `name`, replacing any previous content
    pub async fn upload(&self, name: &str, content: &[u8]) -> Result<()> {
        let result = validate_script_name(name).and_then(|name| self.store.save(name, content));
        if result.is_ok() {
            info!("Stored script '{}' ({} bytes)", name, content.len());
        }
        at_boundary("upload", name, result)
    }

    /// Names of all stored scripts
    pub fn list_scripts(&self) -> Result<Vec<String>> {
        at_boundary("list_scripts", "*", self.store.list())
    }

    /// Terminate every live script. Log rings are left untouched.
    pub async fn shutdown(&self) {
        let processes = self.registry.drain_all().await;
        if processes.is_empty() {
            return;
        }
        info!("Stopping {} script(s) for shutdown", processes.len());

        let graceful = self.config.graceful_timeout();
        let mut tasks = JoinSet::new();
        for mut process in processes {
            tasks.spawn(async move {
                let name = process.info().name.clone();
                if let Err(e) = process.terminate(graceful).await {
                    warn!("Failed to stop '{}' during shutdown: {}", name, e);
                }
                process.join_reader(READER_JOIN_TIMEOUT).await;
            });
        }
        while tasks.join_next().await.is_some() {}
        info!("All scripts stopped");
    }

    async fn start_inner(
        &self,
        name: &str,
        server_url: Option<&str>,
        task: Option<&str>,
    ) -> Result<StartedScript> {
        let name = validate_script_name(name)?;
        if !self.store.exists(name) {
            return Err(CoreError::NotFound(name.to_string()));
        }
        self.store.ensure_executable(name)?;

        let task = task.unwrap_or_default().to_string();
        let command = build_command(&self.config, &self.store.script_path(name), server_url, &task);
        let reader_config = ReaderConfig {
            poll_interval: self.config.poll_interval(),
            drain_timeout: self.config.drain_timeout(),
        };

        let info = self
            .registry
            .register_with(name, |ring| launch(name, command, task, ring, reader_config))
            .await?;

        info!("Started '{}' with pid {}: {:?}", name, info.pid, info.command);
        Ok(StartedScript {
            pid: info.pid,
            command: info.command,
            task: info.task,
        })
    }

    async fn stop_inner(&self, name: &str) -> Result<()> {
        let name = validate_script_name(name)?;
        let mut ticket = self
            .registry
            .begin_stop(name)
            .await
            .ok_or_else(|| CoreError::NotRunning(name.to_string()))?;
        let pid = ticket.pid();

        info!("Stopping '{}' (pid {})", name, pid);
        self.append(name, format!("Stopping process {}", pid)).await;

        let status = match ticket.terminate(self.config.graceful_timeout()).await {
            Ok(status) => status,
            Err(e) => {
                self.registry.abort_stop(ticket).await;
                return Err(e);
            }
        };

        self.registry.mark_stopped(name, status).await;
        ticket.join_reader(READER_JOIN_TIMEOUT).await;
        self.append(name, format!("Process {} stopped ({})", pid, status)).await;
        self.registry.remove(name).await;
        info!("Stopped '{}' (pid {}): {}", name, pid, status);
        Ok(())
    }

    async fn status_inner(&self, name: &str) -> Result<ScriptStatusReport> {
        let name = validate_script_name(name)?;
        Ok(match self.registry.observe(name).await? {
            None => ScriptStatusReport::NotRunning,
            Some(info) => info.to_status_report(),
        })
    }

    async fn delete_inner(&self, name: &str) -> Result<()> {
        let name = validate_script_name(name)?;
        let registered = self.registry.begin_delete(name).await?;
        let result = self.delete_reserved(name, registered).await;
        self.registry.end_delete(name, result.is_ok()).await;
        result?;
        info!("Deleted script '{}'", name);
        Ok(())
    }

    /// Body of `delete` while the name is reserved against new starts
    async fn delete_reserved(&self, name: &str, registered: bool) -> Result<()> {
        if !registered && !self.store.exists(name) {
            return Err(CoreError::NotFound(name.to_string()));
        }

        // Another stop may hold the entry: wait for it, or take over if it fails
        if registered {
            loop {
                match self.stop_inner(name).await {
                    Ok(()) => break,
                    Err(CoreError::NotRunning(_)) if self.registry.get(name).await.is_some() => {
                        tokio::time::sleep(self.config.poll_interval()).await;
                    }
                    Err(CoreError::NotRunning(_)) => break,
                    Err(e) => return Err(e),
                }
            }
        }

        if self.store.exists(name) {
            self.store.remove(name)?;
        }
        Ok(())
    }

    async fn logs_inner(&self, name: &str, after_seq: Option<u64>) -> Result<LogSnapshot> {
        let name = validate_script_name(name)?;
        let ring = self
            .registry
            .log_buffer(name)
            .await
            .ok_or_else(|| CoreError::NotFound(format!("no logs for '{}'", name)))?;
        let snapshot = ring.lock().await.snapshot_after(after_seq);
        Ok(snapshot)
    }

    async fn append(&self, name: &str, message: String) {
        if let Some(ring) = self.registry.log_buffer(name).await {
            ring.lock().await.push_line(LogStream::Stdout, message);
        }
    }
}

/// Spawn the child and its log reader and bundle them as a registry entry
fn launch(
    name: &str,
    command: Vec<String>,
    task: String,
    ring: SharedLogRing,
    reader_config: ReaderConfig,
) -> Result<ScriptProcess> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| CoreError::ExecutionFailure("empty command line".to_string()))?;
    let mut child = process::spawn(program, args)?;
    let pid = child.pid();

    let stdout = child.take_stdout().map(|s| Box::pin(s) as OutputStream);
    let stderr = child.take_stderr().map(|s| Box::pin(s) as OutputStream);
    let (exit_tx, exit_rx) = watch::channel(false);
    let reader = LogReader::new(name, ring, reader_config)
        .with_banner(format!("Started process {}: {}", pid, command.join(" ")))
        .spawn(stdout, stderr, exit_rx);

    let info = ProcessInfo {
        name: name.to_string(),
        pid,
        command,
        start_time: schema::current_timestamp(),
        task,
        state: ScriptState::Running,
        return_code: None,
    };
    Ok(ScriptProcess::new(info, child, exit_tx, reader))
}

fn at_boundary<T>(operation: &str, name: &str, result: Result<T>) -> Result<T> {
    result.map_err(|e| {
        if e.is_operation_error() {
            e
        } else {
            error!("{} '{}' failed unexpectedly: {}", operation, name, e);
            CoreError::InternalError(format!("{} '{}' failed: {}", operation, name, e))
        }
    })
}
