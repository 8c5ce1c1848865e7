//! Core error types and utilities

use thiserror::Error;

/// Core-specific error types
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid script name: {0}")]
    InvalidName(String),

    #[error("Script not found: {0}")]
    NotFound(String),

    #[error("Script already running: {0}")]
    AlreadyRunning(String),

    #[error("Script not running: {0}")]
    NotRunning(String),

    #[error("Execution failure: {0}")]
    ExecutionFailure(String),

    #[error("Process wait error: {0}")]
    ProcessWait(String),

    #[error("Process signal error: {0}")]
    ProcessSignal(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Initialization error: {0}")]
    InitializationError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl CoreError {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::InvalidName(_) => "INVALID_NAME",
            CoreError::NotFound(_) => "NOT_FOUND",
            CoreError::AlreadyRunning(_) => "ALREADY_RUNNING",
            CoreError::NotRunning(_) => "NOT_RUNNING",
            CoreError::ExecutionFailure(_) => "EXECUTION_FAILURE",
            CoreError::ProcessWait(_) => "PROCESS_WAIT",
            CoreError::ProcessSignal(_) => "PROCESS_SIGNAL",
            CoreError::InternalError(_) => "INTERNAL_ERROR",
            CoreError::ConfigurationError(_) => "CONFIGURATION_ERROR",
            CoreError::ValidationError(_) => "VALIDATION_ERROR",
            CoreError::InitializationError(_) => "INITIALIZATION_ERROR",
            CoreError::IoError(_) => "IO_ERROR",
            CoreError::SerializationError(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Whether this is one of the typed outcomes a lifecycle operation reports
    /// to its caller as-is. Everything else is an unexpected failure.
    pub fn is_operation_error(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidName(_)
                | CoreError::NotFound(_)
                | CoreError::AlreadyRunning(_)
                | CoreError::NotRunning(_)
                | CoreError::ExecutionFailure(_)
        )
    }
}

/// Core-specific result type
pub type Result<T> = std::result::Result<T, CoreError>;
