//! CLI error types

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The daemon answered with an error response
    #[error("{}", daemon_message(.message, .code))]
    Daemon {
        message: String,
        code: Option<String>,
    },

    #[error("Unexpected response from daemon: {0}")]
    UnexpectedResponse(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

fn daemon_message(message: &str, code: &Option<String>) -> String {
    match code {
        Some(code) => format!("Daemon error [{}]: {}", code, message),
        None => format!("Daemon error: {}", message),
    }
}

impl CliError {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            CliError::InvalidArgument(_) => "CLI002",
            CliError::ConnectionFailed(_) => "CLI004",
            CliError::Daemon { .. } => "CLI005",
            CliError::UnexpectedResponse(_) => "CLI006",
            CliError::Protocol(_) => "CLI007",
            CliError::IoError(_) => "CLI008",
        }
    }

    /// Error code reported by the daemon, if this is a daemon error
    pub fn daemon_code(&self) -> Option<&str> {
        match self {
            CliError::Daemon { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

/// CLI-specific result type
pub type Result<T> = std::result::Result<T, CliError>;
