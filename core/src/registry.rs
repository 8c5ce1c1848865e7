//! Process registry
//!
//! The single owner of every live script process and of every script's log
//! ring. Both tables sit behind one async mutex, so each operation below is
//! atomic with respect to the others. Callers never see the maps themselves:
//! reads hand out [`ProcessInfo`] copies, and process handles only leave the
//! registry when an entry is removed.
//!
//! Exited processes are reclaimed lazily: an entry stays registered until a
//! query ([`ProcessRegistry::observe`], [`ProcessRegistry::sweep`]) or a new
//! registration under the same name notices the exit. An entry being stopped
//! is never reclaimed this way; its stopper removes it once the process is
//! reaped and its last output recorded.

use crate::logging::{LogRing, SharedLogRing};
use crate::process::{terminate_with_timeout, ChildProcess};
use crate::{CoreError, Result};
use schema::{RunningScript, ScriptState, ScriptStatusReport};
use std::collections::{HashMap, HashSet};
use std::process::ExitStatus;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Registry entry as seen by callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub name: String,
    pub pid: u32,
    /// Exact argument vector the process was launched with
    pub command: Vec<String>,
    pub start_time: String,
    pub task: String,
    pub state: ScriptState,
    /// Set once the state leaves `Running`; `None` after death by signal
    pub return_code: Option<i32>,
}

impl ProcessInfo {
    pub fn to_running_script(&self) -> RunningScript {
        RunningScript {
            name: self.name.clone(),
            pid: self.pid,
            start_time: self.start_time.clone(),
            status: self.state,
            command: self.command.clone(),
            task: self.task.clone(),
        }
    }

    pub fn to_status_report(&self) -> ScriptStatusReport {
        match self.state {
            ScriptState::Running => ScriptStatusReport::Running {
                pid: self.pid,
                start_time: self.start_time.clone(),
                command: self.command.clone(),
            },
            ScriptState::Finished | ScriptState::Stopped => ScriptStatusReport::Finished {
                pid: self.pid,
                start_time: self.start_time.clone(),
                command: self.command.clone(),
                return_code: self.return_code,
            },
        }
    }
}

/// A launched script: its process handle, and the link to its log reader
#[derive(Debug)]
pub struct ScriptProcess {
    info: ProcessInfo,
    /// `None` while a [`StopTicket`] holds it
    child: Option<ChildProcess>,
    /// Flipped once the exit has been observed; dropping it has the same effect
    exit_tx: watch::Sender<bool>,
    reader: Option<JoinHandle<()>>,
}

impl ScriptProcess {
    pub fn new(
        info: ProcessInfo,
        child: ChildProcess,
        exit_tx: watch::Sender<bool>,
        reader: JoinHandle<()>,
    ) -> Self {
        Self {
            info,
            child: Some(child),
            exit_tx,
            reader: Some(reader),
        }
    }

    pub fn info(&self) -> &ProcessInfo {
        &self.info
    }

    fn is_stopping(&self) -> bool {
        self.child.is_none()
    }

    fn mark_exited(&mut self, state: ScriptState, status: ExitStatus) {
        self.info.state = state;
        self.info.return_code = status.code();
        // The reader may already be gone; nothing to do then
        let _ = self.exit_tx.send(true);
    }

    /// Non-blocking liveness check. Records the exit and returns `true` once
    /// the process is gone. An entry being stopped counts as alive.
    fn poll_exit(&mut self) -> Result<bool> {
        if self.info.state.is_terminal() {
            return Ok(true);
        }
        let Some(child) = self.child.as_mut() else {
            return Ok(false);
        };
        match child.try_wait()? {
            Some(status) => {
                debug!("Process {} for '{}' exited with {}", self.info.pid, self.info.name, status);
                self.mark_exited(ScriptState::Finished, status);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// SIGTERM the process group, escalating to SIGKILL after `graceful`
    pub async fn terminate(&mut self, graceful: Duration) -> Result<ExitStatus> {
        let Some(child) = self.child.as_mut() else {
            return Err(CoreError::NotRunning(self.info.name.clone()));
        };
        let status = terminate_with_timeout(child, graceful).await?;
        self.mark_exited(ScriptState::Stopped, status);
        Ok(status)
    }

    /// Wait up to `bound` for the log reader to flush its last lines
    pub async fn join_reader(self, bound: Duration) {
        let Self { info, exit_tx, reader, .. } = self;
        drop(exit_tx);
        if let Some(reader) = reader {
            wait_for_reader(&info.name, reader, bound).await;
        }
    }
}

/// The handles of an entry that is being stopped.
///
/// While a ticket is out the entry stays registered: the name cannot be
/// started again and a second stop finds nothing to do. Hand the ticket back
/// with [`ProcessRegistry::abort_stop`] if the stop fails.
#[derive(Debug)]
pub struct StopTicket {
    name: String,
    pid: u32,
    child: ChildProcess,
    reader: JoinHandle<()>,
}

impl StopTicket {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// SIGTERM the process group, escalating to SIGKILL after `graceful`
    pub async fn terminate(&mut self, graceful: Duration) -> Result<ExitStatus> {
        terminate_with_timeout(&mut self.child, graceful).await
    }

    /// Wait up to `bound` for the log reader to flush its last lines.
    /// Call after [`ProcessRegistry::mark_stopped`], which releases the reader.
    pub async fn join_reader(self, bound: Duration) {
        wait_for_reader(&self.name, self.reader, bound).await;
    }
}

async fn wait_for_reader(name: &str, reader: JoinHandle<()>, bound: Duration) {
    if tokio::time::timeout(bound, reader).await.is_err() {
        warn!("Log reader for '{}' still busy after {:?}", name, bound);
    }
}

#[derive(Debug, Default)]
struct Tables {
    processes: HashMap<String, ScriptProcess>,
    logs: HashMap<String, SharedLogRing>,
    /// Names reserved by an in-flight delete
    deleting: HashSet<String>,
}

/// Authoritative name → process and name → log ring mapping
#[derive(Debug)]
pub struct ProcessRegistry {
    tables: Mutex<Tables>,
    log_capacity: usize,
}

impl ProcessRegistry {
    /// Create an empty registry whose log rings hold `log_capacity` lines
    pub fn new(log_capacity: usize) -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            log_capacity,
        }
    }

    /// Check that `name` has no live process, then launch and register one.
    ///
    /// `launch` receives the name's log ring (created if this is the first
    /// start). The ring is only kept if `launch` succeeds, and the whole
    /// sequence runs under the registry lock, so concurrent starts of the
    /// same name cannot both succeed. A name whose process is being stopped
    /// counts as running; a name being deleted counts as missing.
    pub async fn register_with<F>(&self, name: &str, launch: F) -> Result<ProcessInfo>
    where
        F: FnOnce(SharedLogRing) -> Result<ScriptProcess>,
    {
        let mut tables = self.tables.lock().await;

        if tables.deleting.contains(name) {
            return Err(CoreError::NotFound(name.to_string()));
        }
        if let Some(existing) = tables.processes.get_mut(name) {
            if !existing.poll_exit()? {
                return Err(CoreError::AlreadyRunning(name.to_string()));
            }
            if existing.is_stopping() {
                // Signalled and reaped, but its stop has not finished yet
                return Err(CoreError::AlreadyRunning(name.to_string()));
            }
            debug!("Reclaiming exited entry for '{}' before restart", name);
            tables.processes.remove(name);
        }

        let ring = tables
            .logs
            .get(name)
            .cloned()
            .unwrap_or_else(|| LogRing::shared(self.log_capacity));

        let process = launch(ring.clone())?;
        let info = process.info().clone();

        tables.logs.entry(name.to_string()).or_insert(ring);
        tables.processes.insert(name.to_string(), process);
        info!("Registered '{}' with pid {}", name, info.pid);
        Ok(info)
    }

    /// Current entry for `name`, without checking liveness
    pub async fn get(&self, name: &str) -> Option<ProcessInfo> {
        let tables = self.tables.lock().await;
        tables.processes.get(name).map(|p| p.info().clone())
    }

    /// Delete the entry for `name`; idempotent
    pub async fn remove(&self, name: &str) -> Option<ProcessInfo> {
        let mut tables = self.tables.lock().await;
        tables.processes.remove(name).map(|p| p.info)
    }

    /// Take the handles of `name` to stop it, leaving the entry registered.
    ///
    /// Returns `None` if there is no entry or another stop already holds it.
    pub async fn begin_stop(&self, name: &str) -> Option<StopTicket> {
        let mut tables = self.tables.lock().await;
        let process = tables.processes.get_mut(name)?;
        let (child, reader) = (process.child.take()?, process.reader.take());
        let Some(reader) = reader else {
            process.child = Some(child);
            return None;
        };
        Some(StopTicket {
            name: name.to_string(),
            pid: process.info.pid,
            child,
            reader,
        })
    }

    /// Give back the handles of a stop that failed; the entry is live again
    pub async fn abort_stop(&self, ticket: StopTicket) {
        let mut tables = self.tables.lock().await;
        match tables.processes.get_mut(&ticket.name) {
            Some(process) => {
                process.child = Some(ticket.child);
                process.reader = Some(ticket.reader);
            }
            None => warn!("Entry for '{}' vanished during a failed stop", ticket.name),
        }
    }

    /// Record how a stopped process ended and let its reader drain
    pub async fn mark_stopped(&self, name: &str, status: ExitStatus) {
        let mut tables = self.tables.lock().await;
        if let Some(process) = tables.processes.get_mut(name) {
            process.mark_exited(ScriptState::Stopped, status);
        }
    }

    /// Point-in-time copy of all entries, sorted by name
    pub async fn snapshot_all(&self) -> Vec<ProcessInfo> {
        let tables = self.tables.lock().await;
        let mut infos: Vec<_> = tables.processes.values().map(|p| p.info().clone()).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Liveness-checked lookup. An exited process is reported once, with its
    /// terminal state, and its entry is removed in the same step. Entries
    /// being stopped are reported but left to their stopper.
    pub async fn observe(&self, name: &str) -> Result<Option<ProcessInfo>> {
        let mut tables = self.tables.lock().await;
        let Some(process) = tables.processes.get_mut(name) else {
            return Ok(None);
        };
        let exited = process.poll_exit()?;
        let info = process.info().clone();
        if exited && !process.is_stopping() {
            tables.processes.remove(name);
            info!("Reclaimed '{}' (pid {}) after exit", name, info.pid);
        }
        Ok(Some(info))
    }

    /// Liveness-check every entry, reclaim the exited ones and return the rest
    pub async fn sweep(&self) -> Vec<ProcessInfo> {
        let mut tables = self.tables.lock().await;
        let mut live = Vec::new();
        let mut exited = Vec::new();

        for (name, process) in tables.processes.iter_mut() {
            match process.poll_exit() {
                Ok(false) => live.push(process.info().clone()),
                Ok(true) if process.is_stopping() => {}
                Ok(true) => exited.push(name.clone()),
                Err(e) => {
                    warn!("Could not poll '{}': {}", name, e);
                    live.push(process.info().clone());
                }
            }
        }

        for name in exited {
            tables.processes.remove(&name);
            info!("Reclaimed '{}' after exit", name);
        }

        live.sort_by(|a, b| a.name.cmp(&b.name));
        live
    }

    /// Log ring for `name`, if the name has ever been started
    pub async fn log_buffer(&self, name: &str) -> Option<SharedLogRing> {
        let tables = self.tables.lock().await;
        tables.logs.get(name).cloned()
    }

    /// Reserve `name` for deletion. Until [`end_delete`](Self::end_delete)
    /// the name cannot be started. Returns whether a process is registered.
    pub async fn begin_delete(&self, name: &str) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        if !tables.deleting.insert(name.to_string()) {
            return Err(CoreError::NotFound(name.to_string()));
        }
        Ok(tables.processes.contains_key(name))
    }

    /// Release a delete reservation, dropping the log ring first if asked
    pub async fn end_delete(&self, name: &str, discard_logs: bool) {
        let mut tables = self.tables.lock().await;
        if discard_logs {
            tables.logs.remove(name);
        }
        tables.deleting.remove(name);
    }

    /// Remove every entry not held by a stop, leaving log rings in place
    pub async fn drain_all(&self) -> Vec<ScriptProcess> {
        let mut tables = self.tables.lock().await;
        let names: Vec<String> = tables
            .processes
            .iter()
            .filter(|(_, p)| !p.is_stopping())
            .map(|(name, _)| name.clone())
            .collect();
        names
            .iter()
            .filter_map(|name| tables.processes.remove(name))
            .collect()
    }
}
