//! Per-script output capture
//!
//! A [`LogReader`] is one tokio task per launched script. It multiplexes the
//! script's stdout and stderr into the script's [`LogRing`](crate::logging::LogRing),
//! one entry per line, until both streams close or the process is reported
//! gone. Undecodable bytes are replaced, never rejected, and reader failures
//! are written into the ring as `stderr` lines instead of being propagated.
//! A line longer than [`MAX_LINE_BYTES`] is split into several entries.

use crate::logging::SharedLogRing;
use schema::LogStream;
use std::io;
use std::pin::Pin;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Readable end of a child's output pipe
pub type OutputStream = Pin<Box<dyn AsyncRead + Send + Unpin>>;

/// Hard cap on the post-exit drain of one stream
const MAX_DRAIN: Duration = Duration::from_secs(2);

/// Longest single entry; output without a newline is cut at this size
pub const MAX_LINE_BYTES: usize = 4096;

/// Timing knobs for a [`LogReader`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderConfig {
    /// How often the reader checks whether its process has been reported gone
    pub poll_interval: Duration,
    /// Idle time after which the post-exit drain gives up on a stream
    pub drain_timeout: Duration,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            drain_timeout: Duration::from_millis(50),
        }
    }
}

enum TailEvent {
    Line(String),
    Failed(io::Error),
    Closed,
}

/// Line splitter over one output stream.
///
/// Partially read lines stay in `pending` across cancelled reads, which is
/// what makes `next_line` safe to use as a `select!` branch.
struct StreamTail {
    kind: LogStream,
    reader: Option<BufReader<OutputStream>>,
    pending: Vec<u8>,
}

impl StreamTail {
    fn new(kind: LogStream, stream: Option<OutputStream>) -> Self {
        Self {
            kind,
            reader: stream.map(BufReader::new),
            pending: Vec::new(),
        }
    }

    fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    async fn next_line(&mut self) -> TailEvent {
        let Some(reader) = self.reader.as_mut() else {
            return TailEvent::Closed;
        };
        let room = MAX_LINE_BYTES.saturating_sub(self.pending.len());
        if room == 0 {
            return TailEvent::Line(self.take_line());
        }
        // `take` stops the read at the cap; what was read so far stays in
        // `pending`, so a cancelled read loses nothing
        let mut limited = reader.take(room as u64);
        match limited.read_until(b'\n', &mut self.pending).await {
            Ok(0) => {
                self.reader = None;
                match self.take_pending() {
                    Some(line) => TailEvent::Line(line),
                    None => TailEvent::Closed,
                }
            }
            Ok(_) => TailEvent::Line(self.take_line()),
            Err(e) => {
                self.reader = None;
                TailEvent::Failed(e)
            }
        }
    }

    fn take_line(&mut self) -> String {
        if self.pending.last() == Some(&b'\n') {
            self.pending.pop();
            if self.pending.last() == Some(&b'\r') {
                self.pending.pop();
            }
        }
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        line
    }

    fn take_pending(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.take_line())
        }
    }
}

/// Background capture of one script's output
pub struct LogReader {
    name: String,
    ring: SharedLogRing,
    config: ReaderConfig,
    banner: Option<String>,
}

impl LogReader {
    pub fn new(name: impl Into<String>, ring: SharedLogRing, config: ReaderConfig) -> Self {
        Self {
            name: name.into(),
            ring,
            config,
            banner: None,
        }
    }

    /// Line written to stdout before any captured output
    pub fn with_banner(mut self, banner: impl Into<String>) -> Self {
        self.banner = Some(banner.into());
        self
    }

    /// Run the reader on its own task.
    ///
    /// `exited` flips to `true` (or its sender is dropped) once the
    /// supervisor has observed the process exit; the reader then drains
    /// whatever is already buffered and finishes.
    pub fn spawn(
        self,
        stdout: Option<OutputStream>,
        stderr: Option<OutputStream>,
        exited: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(stdout, stderr, exited))
    }

    pub async fn run(
        self,
        stdout: Option<OutputStream>,
        stderr: Option<OutputStream>,
        exited: watch::Receiver<bool>,
    ) {
        debug!("Log reader started for '{}'", self.name);

        let mut out = StreamTail::new(LogStream::Stdout, stdout);
        let mut err = StreamTail::new(LogStream::Stderr, stderr);

        if let Some(banner) = &self.banner {
            self.append(LogStream::Stdout, banner.clone()).await;
        }

        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while out.is_open() || err.is_open() {
            tokio::select! {
                event = out.next_line(), if out.is_open() => {
                    self.record(LogStream::Stdout, event).await;
                }
                event = err.next_line(), if err.is_open() => {
                    self.record(LogStream::Stderr, event).await;
                }
                _ = ticker.tick() => {
                    if process_gone(&exited) {
                        debug!("Process for '{}' is gone, draining output", self.name);
                        break;
                    }
                }
            }
        }

        self.drain(&mut out).await;
        self.drain(&mut err).await;

        debug!("Log reader finished for '{}'", self.name);
    }

    /// Read what is already buffered on `tail`, giving up once the stream
    /// stays idle for `drain_timeout` or the overall cap is reached.
    async fn drain(&self, tail: &mut StreamTail) {
        let deadline = Instant::now() + MAX_DRAIN;
        while tail.is_open() {
            let idle = self.config.drain_timeout.min(deadline.saturating_duration_since(Instant::now()));
            match timeout(idle, tail.next_line()).await {
                Ok(event) => self.record(tail.kind, event).await,
                Err(_) => {
                    // Still held open by a surviving descendant
                    if let Some(line) = tail.take_pending() {
                        self.append(tail.kind, line).await;
                    }
                    break;
                }
            }
        }
    }

    async fn record(&self, stream: LogStream, event: TailEvent) {
        match event {
            TailEvent::Line(line) => self.append(stream, line).await,
            TailEvent::Failed(e) => {
                warn!("Log reader for '{}' failed on {}: {}", self.name, stream, e);
                self.append(
                    LogStream::Stderr,
                    format!("log reader failed on {}: {}", stream, e),
                )
                .await;
            }
            TailEvent::Closed => debug!("{} closed for '{}'", stream, self.name),
        }
    }

    async fn append(&self, stream: LogStream, message: String) {
        self.ring.lock().await.push_line(stream, message);
    }
}

fn process_gone(exited: &watch::Receiver<bool>) -> bool {
    exited.has_changed().is_err() || *exited.borrow()
}
