//! Control-plane daemon for the sploit supervisor
//!
//! The daemon owns a single [`Supervisor`] and exposes its operations over
//! newline-delimited JSON on TCP: one [`Message`] per line in, one
//! [`Response`] per line out.

#![allow(unused_crate_dependencies)]

pub mod bootstrap;
pub mod simple_error;


use schema::{DaemonConfig, Message, Response};
pub use simple_error::{DaemonError, Result};
use sploit_core::{CoreError, Supervisor};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, error, info, warn};

/// Maximum allowed frame size for daemon TCP requests (1 MiB)
const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// The main daemon server
#[derive(Debug, Clone)]
pub struct Daemon {
    config: DaemonConfig,
    start_time: Instant,
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    connections: Arc<Semaphore>,
    supervisor: Arc<Supervisor>,
}

impl Daemon {
    /// Create a new daemon instance serving `supervisor`
    #[must_use]
    pub fn new(config: DaemonConfig, supervisor: Arc<Supervisor>) -> Self {
        let connections = Arc::new(Semaphore::new(config.max_connections.max(1)));
        Self {
            config,
            start_time: Instant::now(),
            running: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(Notify::new()),
            connections,
            supervisor,
        }
    }

    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }

    /// Bind the configured control address
    ///
    /// # Errors
    /// Returns `ServerError` if the address cannot be bound.
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        TcpListener::bind(&addr)
            .await
            .map_err(|e| DaemonError::ServerError(format!("Failed to bind to {addr}: {e}")))
    }

    /// Bind and serve until [`Daemon::stop`] is called
    ///
    /// # Errors
    /// Returns an error if the TCP listener cannot be bound.
    pub async fn start(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Accept connections on `listener` until [`Daemon::stop`] is called
    ///
    /// # Errors
    /// Returns an error if the listener's local address cannot be read.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let addr = listener.local_addr()?;
        self.running.store(true, Ordering::SeqCst);
        info!("Daemon started on {}", addr);

        while self.running.load(Ordering::SeqCst) {
            tokio::select! {
                _ = self.shutdown.notified() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let Ok(permit) = Arc::clone(&self.connections).try_acquire_owned() else {
                            warn!(
                                "Rejecting {}: {} connections already open",
                                peer, self.config.max_connections
                            );
                            tokio::spawn(reject_connection(stream));
                            continue;
                        };
                        debug!("New connection from {}", peer);
                        let daemon = self.clone();
                        tokio::spawn(async move {
                            if let Err(e) = daemon.handle_connection(stream).await {
                                warn!("Error handling connection from {}: {}", peer, e);
                            }
                            drop(permit);
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                    }
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("Daemon stopped accepting connections on {}", addr);
        Ok(())
    }

    /// Handle incoming connection
    async fn handle_connection(&self, stream: TcpStream) -> Result<()> {
        let (reader_half, mut writer_half) = stream.into_split();
        let mut reader = BufReader::new(reader_half);
        let mut frame = Vec::with_capacity(1024);

        loop {
            frame.clear();
            let n = (&mut reader)
                .take(MAX_FRAME_SIZE as u64 + 1)
                .read_until(b'\n', &mut frame)
                .await?;
            if n == 0 {
                break;
            }

            if frame.len() > MAX_FRAME_SIZE && frame.last() != Some(&b'\n') {
                let message = format!(
                    "Request exceeds maximum allowed size of {} bytes",
                    MAX_FRAME_SIZE
                );
                let response = Response::Error {
                    message: message.clone(),
                    code: Some("FRAME_TOO_LARGE".to_string()),
                };
                write_response(&mut writer_half, &response).await?;
                return Err(DaemonError::ConnectionError(message));
            }

            if matches!(frame.last(), Some(b'\n')) {
                frame.pop();
                if matches!(frame.last(), Some(b'\r')) {
                    frame.pop();
                }
            }
            if frame.is_empty() {
                continue;
            }

            let response = match serde_json::from_slice::<Message>(&frame) {
                Ok(request) => self.process_message(request).await,
                Err(e) => {
                    debug!("Rejecting malformed request: {}", e);
                    Response::Error {
                        message: format!("Invalid request: {e}"),
                        code: Some("INVALID_REQUEST".to_string()),
                    }
                }
            };
            write_response(&mut writer_half, &response).await?;
        }

        Ok(())
    }

    /// Dispatch one request to the supervisor
    async fn process_message(&self, message: Message) -> Response {
        let supervisor = &self.supervisor;
        let outcome = match message {
            Message::Status => return self.status(),
            Message::StartScript {
                name,
                server_url,
                task,
            } => supervisor
                .start(&name, server_url.as_deref(), task.as_deref())
                .await
                .map(Response::Started),
            Message::StopScript { name } => supervisor.stop(&name).await.map(|()| Response::Ok {
                message: format!("Stopped {name}"),
            }),
            Message::ScriptStatus { name } => {
                supervisor.status(&name).await.map(Response::ScriptStatus)
            }
            Message::ListRunning => supervisor
                .list_running()
                .await
                .map(|scripts| Response::Running { scripts }),
            Message::DeleteScript { name } => {
                supervisor.delete(&name).await.map(|()| Response::Ok {
                    message: format!("Deleted {name}"),
                })
            }
            Message::ScriptLogs { name, after_seq } => {
                supervisor.logs(&name, after_seq).await.map(Response::Logs)
            }
            Message::UploadScript { name, content } => supervisor
                .upload(&name, content.as_bytes())
                .await
                .map(|()| Response::Ok {
                    message: format!("Uploaded {name}"),
                }),
            Message::ListScripts => supervisor
                .list_scripts()
                .map(|names| Response::Scripts { names }),
        };
        outcome.unwrap_or_else(|e| error_response(&e))
    }

    fn status(&self) -> Response {
        Response::Status {
            running: self.running.load(Ordering::SeqCst),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            pid: std::process::id(),
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
        }
    }

    /// Stop accepting connections. Running scripts are left alone; see
    /// [`Supervisor::shutdown`].
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.notify_one();
    }
}

fn error_response(err: &CoreError) -> Response {
    Response::Error {
        message: err.to_string(),
        code: Some(err.code().to_string()),
    }
}

async fn write_response<W: AsyncWrite + Unpin>(writer: &mut W, response: &Response) -> Result<()> {
    let mut response_data = serde_json::to_vec(response)?;
    response_data.push(b'\n');
    writer.write_all(&response_data).await?;
    Ok(())
}

async fn reject_connection(mut stream: TcpStream) {
    let response = Response::Error {
        message: "Too many connections".to_string(),
        code: Some("TOO_MANY_CONNECTIONS".to_string()),
    };
    if let Err(e) = write_response(&mut stream, &response).await {
        debug!("Failed to notify rejected client: {}", e);
    }
}
