//! Client library for the sploit supervisor daemon
//!
//! [`Client`] speaks the daemon's control protocol: one JSON [`Message`] per
//! line out, one JSON [`Response`] per line back. Each call opens its own
//! connection. The formatting helpers render responses for the terminal.

#![allow(unused_crate_dependencies)]

pub mod error;

pub use error::{CliError, Result};
use schema::{
    LogEntry, LogSnapshot, Message, Response, RunningScript, ScriptStatusReport, StartedScript,
};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

/// Largest response line the client accepts; a default-sized log ring of
/// maximal, fully escaped lines still fits
const MAX_RESPONSE_SIZE: u64 = 32 * 1024 * 1024;

/// Where and how to reach the daemon
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub daemon_host: String,
    pub daemon_port: u16,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            daemon_host: "127.0.0.1".to_string(),
            daemon_port: 49384,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Daemon status as reported by `status`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonStatus {
    pub running: bool,
    pub uptime_seconds: u64,
    pub pid: u32,
    pub version: Option<String>,
}

/// CLI client for communicating with the daemon
#[derive(Debug, Clone)]
pub struct Client {
    config: ClientConfig,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    /// Connect to the daemon, send `message` and read one response line.
    ///
    /// Error responses are returned as `Ok`; see [`Client::request`].
    pub async fn send_message(&self, message: &Message) -> Result<Response> {
        let addr = format!("{}:{}", self.config.daemon_host, self.config.daemon_port);
        tokio::time::timeout(self.config.timeout, self.exchange(&addr, message))
            .await
            .map_err(|_| {
                CliError::ConnectionFailed(format!(
                    "{} did not answer within {:?}",
                    addr, self.config.timeout
                ))
            })?
    }

    async fn exchange(&self, addr: &str, message: &Message) -> Result<Response> {
        debug!("Connecting to daemon at {}", addr);
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| CliError::ConnectionFailed(format!("{}: {}", addr, e)))?;
        let mut stream = BufReader::new(stream);

        let mut request = serde_json::to_vec(message)?;
        request.push(b'\n');
        stream.get_mut().write_all(&request).await?;

        let mut line = Vec::new();
        let n = (&mut stream)
            .take(MAX_RESPONSE_SIZE)
            .read_until(b'\n', &mut line)
            .await?;
        if n == 0 {
            return Err(CliError::ConnectionFailed(format!(
                "{} closed the connection without answering",
                addr
            )));
        }
        if line.last() != Some(&b'\n') {
            return Err(CliError::UnexpectedResponse(
                "response line was truncated".to_string(),
            ));
        }
        Ok(serde_json::from_slice(&line)?)
    }

    /// Like [`Client::send_message`], with error responses turned into
    /// [`CliError::Daemon`]
    pub async fn request(&self, message: &Message) -> Result<Response> {
        match self.send_message(message).await? {
            Response::Error { message, code } => Err(CliError::Daemon { message, code }),
            response => Ok(response),
        }
    }

    /// Get daemon status
    pub async fn status(&self) -> Result<DaemonStatus> {
        match self.request(&Message::Status).await? {
            Response::Status {
                running,
                uptime_seconds,
                pid,
                version,
            } => Ok(DaemonStatus {
                running,
                uptime_seconds,
                pid,
                version,
            }),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn start_script(
        &self,
        name: &str,
        server_url: Option<&str>,
        task: Option<&str>,
    ) -> Result<StartedScript> {
        let message = Message::StartScript {
            name: name.to_string(),
            server_url: server_url.map(str::to_string),
            task: task.map(str::to_string),
        };
        match self.request(&message).await? {
            Response::Started(started) => Ok(started),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn stop_script(&self, name: &str) -> Result<String> {
        let message = Message::StopScript {
            name: name.to_string(),
        };
        expect_ok(self.request(&message).await?)
    }

    pub async fn script_status(&self, name: &str) -> Result<ScriptStatusReport> {
        let message = Message::ScriptStatus {
            name: name.to_string(),
        };
        match self.request(&message).await? {
            Response::ScriptStatus(report) => Ok(report),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn list_running(&self) -> Result<Vec<RunningScript>> {
        match self.request(&Message::ListRunning).await? {
            Response::Running { scripts } => Ok(scripts),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn delete_script(&self, name: &str) -> Result<String> {
        let message = Message::DeleteScript {
            name: name.to_string(),
        };
        expect_ok(self.request(&message).await?)
    }

    /// Fetch log entries of `name` newer than `after_seq`
    pub async fn logs(&self, name: &str, after_seq: Option<u64>) -> Result<LogSnapshot> {
        let message = Message::ScriptLogs {
            name: name.to_string(),
            after_seq,
        };
        match self.request(&message).await? {
            Response::Logs(snapshot) => Ok(snapshot),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn upload_script(&self, name: &str, content: String) -> Result<String> {
        let message = Message::UploadScript {
            name: name.to_string(),
            content,
        };
        expect_ok(self.request(&message).await?)
    }

    pub async fn list_scripts(&self) -> Result<Vec<String>> {
        match self.request(&Message::ListScripts).await? {
            Response::Scripts { names } => Ok(names),
            other => Err(unexpected(&other)),
        }
    }
}

fn expect_ok(response: Response) -> Result<String> {
    match response {
        Response::Ok { message } => Ok(message),
        other => Err(unexpected(&other)),
    }
}

fn unexpected(response: &Response) -> CliError {
    CliError::UnexpectedResponse(format!("{:?}", response))
}

/// One log line as printed by `sploitctl logs`
pub fn format_log_entry(entry: &LogEntry) -> String {
    format!(
        "{} [{}] {}",
        entry.timestamp, entry.stream_kind, entry.message
    )
}

/// Multi-line rendering of a status report
pub fn format_status_report(name: &str, report: &ScriptStatusReport) -> String {
    match report {
        ScriptStatusReport::NotRunning => format!("{}: not running", name),
        ScriptStatusReport::Running {
            pid,
            start_time,
            command,
        } => format!(
            "{}: running\n  PID: {}\n  Started: {}\n  Command: {}",
            name,
            pid,
            start_time,
            command.join(" ")
        ),
        ScriptStatusReport::Finished {
            pid,
            start_time,
            command,
            return_code,
        } => {
            let code = return_code.map_or_else(|| "killed by signal".to_string(), |c| c.to_string());
            format!(
                "{}: finished\n  PID: {}\n  Started: {}\n  Command: {}\n  Return code: {}",
                name,
                pid,
                start_time,
                command.join(" "),
                code
            )
        }
    }
}

/// Tab-separated row for `sploitctl list`
pub fn format_running_script(script: &RunningScript) -> String {
    let task = if script.task.is_empty() { "-" } else { script.task.as_str() };
    format!(
        "{}\tPID:{}\t{}\ttask:{}",
        script.name, script.pid, script.start_time, task
    )
}
