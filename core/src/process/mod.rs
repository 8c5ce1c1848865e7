//! Process management for supervised scripts
//!
//! Scripts are spawned into their own process group so that a stop request
//! reaches every process the script forked, not just the direct child.
//!
//! ## Platform Support
//!
//! - **Unix**: process groups via `setsid()`, SIGTERM/SIGKILL escalation
//! - **Windows**: not supported

#[cfg(unix)]
pub mod unix;

#[cfg(unix)]
pub use unix::*;
