//! Unix process management with safe spawn/kill using process groups
//!
//! Every script is placed in its own session via `setsid()`, which makes it
//! the leader of a fresh process group. Signals are then sent to the whole
//! group (`killpg`), so helpers forked by a script are terminated with it.
//!
//! SIGTERM is used for graceful termination, SIGKILL for forceful termination.
//! `ESRCH` and `EPERM` while signalling mean the group is already gone and
//! are treated as success.

// Allow unsafe code for this module since process management requires libc::setsid() calls
#![allow(unsafe_code)]

use crate::{CoreError, Result};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
#[allow(unused_imports)]
use std::os::unix::process::CommandExt;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::{debug, error, warn};

/// How long to wait for the group leader to be reaped after SIGKILL
const KILL_REAP_TIMEOUT: Duration = Duration::from_secs(5);

/// A child process managed with Unix process groups
#[derive(Debug)]
pub struct ChildProcess {
    /// The process ID of the spawned process (also its process group ID)
    pid: Pid,
    /// The underlying Child handle for waiting and status checking
    child: Child,
}

impl ChildProcess {
    /// Get the process ID
    pub fn pid(&self) -> u32 {
        self.pid.as_raw() as u32
    }

    /// Wait for the process to exit and return its exit status
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        self.child.wait().await.map_err(|e| {
            CoreError::ProcessWait(format!("Failed to wait for process {}: {}", self.pid, e))
        })
    }

    /// Try to wait for the process to exit without blocking
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        self.child.try_wait().map_err(|e| {
            CoreError::ProcessWait(format!(
                "Failed to try_wait for process {}: {}",
                self.pid, e
            ))
        })
    }

    /// Take the stdout handle for async reading, if available
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Take the stderr handle for async reading, if available
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }
}

/// Spawn `program` with `args` in its own process group.
///
/// stdin is closed; stdout and stderr are piped independently so they can be
/// captured by a log reader.
///
/// ## Safety
///
/// `setsid()` is called in the child between `fork()` and `exec()`. It is
/// async-signal-safe and does not allocate, which is what `pre_exec` requires.
///
/// ## Example
///
/// ```rust,no_run
/// use sploit_core::process::unix::spawn;
///
/// # async fn demo() -> sploit_core::Result<()> {
/// let child = spawn("echo", &["hello".to_string()])?;
/// println!("Spawned process with PID: {}", child.pid());
/// # Ok(())
/// # }
/// ```
pub fn spawn(program: &str, args: &[String]) -> Result<ChildProcess> {
    debug!("Spawning process: {} {:?}", program, args);

    let mut command = Command::new(program);
    command.args(args);
    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    // Safety: setsid() is async-signal-safe and appropriate for use in pre_exec
    #[deny(unsafe_op_in_unsafe_fn)]
    unsafe {
        command.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let child = command.spawn().map_err(|e| {
        error!("Failed to spawn process '{}': {}", program, e);
        CoreError::ExecutionFailure(format!("Failed to spawn '{}': {}", program, e))
    })?;

    let raw_pid = child.id().ok_or_else(|| {
        CoreError::ExecutionFailure("Spawned child did not have a PID".to_string())
    })?;
    let pid = Pid::from_raw(raw_pid as i32);
    debug!("Successfully spawned process {} in new process group", pid);

    Ok(ChildProcess { pid, child })
}

fn signal_group(child: &ChildProcess, signal: Signal) -> Result<()> {
    debug!("Sending {} to process group {}", signal, child.pid);

    match killpg(child.pid, signal) {
        Ok(()) => Ok(()),
        Err(nix::errno::Errno::ESRCH) => {
            debug!("Process group {} already exited", child.pid);
            Ok(())
        }
        Err(nix::errno::Errno::EPERM) => {
            debug!(
                "Permission denied signaling process group {} (likely already exited)",
                child.pid
            );
            Ok(())
        }
        Err(e) => {
            error!("Failed to send {} to process group {}: {}", signal, child.pid, e);
            Err(CoreError::ProcessSignal(format!(
                "Failed to send {} to process group {}: {}",
                signal, child.pid, e
            )))
        }
    }
}

/// Send SIGTERM to the process group for graceful termination
pub fn signal_term_group(child: &ChildProcess) -> Result<()> {
    signal_group(child, Signal::SIGTERM)
}

/// Send SIGKILL to the process group for forceful termination
pub fn signal_kill_group(child: &ChildProcess) -> Result<()> {
    signal_group(child, Signal::SIGKILL)
}

/// Terminate gracefully, escalating to SIGKILL after `timeout`.
///
/// Returns the exit status of the group leader.
pub async fn terminate_with_timeout(
    child: &mut ChildProcess,
    timeout: Duration,
) -> Result<ExitStatus> {
    if let Some(status) = child.try_wait()? {
        debug!("Process {} had already exited with {}", child.pid, status);
        return Ok(status);
    }

    signal_term_group(child)?;

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => {
            let status = status?;
            debug!("Process {} exited gracefully with status: {}", child.pid, status);
            return Ok(status);
        }
        Err(_) => {
            warn!(
                "Process {} did not exit gracefully within {:?}, using SIGKILL",
                child.pid, timeout
            );
        }
    }

    signal_kill_group(child)?;

    match tokio::time::timeout(KILL_REAP_TIMEOUT, child.wait()).await {
        Ok(status) => {
            let status = status?;
            debug!("Process {} exited after SIGKILL with status: {}", child.pid, status);
            Ok(status)
        }
        Err(_) => Err(CoreError::ProcessWait(format!(
            "Process {} did not exit even after SIGKILL within {:?}",
            child.pid, KILL_REAP_TIMEOUT
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_spawn_simple_command() {
        let child = spawn("echo", &["hello".to_string()]).expect("Failed to spawn echo");
        assert!(child.pid() > 0);
        // Process should be its own group leader
        let pgid = unsafe { libc::getpgid(child.pid() as i32) };
        assert_eq!(pgid, child.pid() as i32);
    }

    #[tokio::test]
    async fn test_spawn_and_wait() {
        let mut child = spawn("true", &[]).expect("Failed to spawn true");
        let status = child.wait().await.expect("Failed to wait for process");
        assert!(status.success());
    }

    #[tokio::test]
    async fn test_spawn_nonexistent_command() {
        match spawn("nonexistent_command_12345", &[]) {
            Err(CoreError::ExecutionFailure(_)) => {}
            other => panic!("Expected ExecutionFailure, got: {:?}", other.map(|c| c.pid())),
        }
    }

    #[tokio::test]
    async fn test_signal_after_exit_is_ok() {
        let mut child = spawn("true", &[]).unwrap();
        child.wait().await.unwrap();

        // Group is gone; ESRCH is treated as success
        assert!(signal_term_group(&child).is_ok());
        assert!(signal_kill_group(&child).is_ok());
    }

    #[tokio::test]
    async fn test_terminate_with_timeout_graceful() {
        let mut child = spawn("sleep", &["10".to_string()]).expect("Failed to spawn sleep");
        let status = terminate_with_timeout(&mut child, Duration::from_secs(2))
            .await
            .expect("Failed to terminate");
        use std::os::unix::process::ExitStatusExt;
        assert_eq!(status.signal(), Some(libc::SIGTERM));
    }

    #[tokio::test]
    async fn test_terminate_with_timeout_needs_kill() {
        // The shell and its sleep both ignore SIGTERM
        let mut child = spawn("/bin/sh", &sh("trap '' TERM; sleep 30")).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let status = terminate_with_timeout(&mut child, Duration::from_millis(200))
            .await
            .expect("Failed to terminate");
        use std::os::unix::process::ExitStatusExt;
        assert_eq!(status.signal(), Some(libc::SIGKILL));
    }

    #[tokio::test]
    async fn test_terminate_already_exited() {
        let mut child = spawn("/bin/sh", &sh("exit 3")).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        let status = terminate_with_timeout(&mut child, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(status.code(), Some(3));
    }
}
