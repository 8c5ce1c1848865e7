//! Core functionality for the sploit supervisor
//!
//! This crate owns everything between the control plane and the operating
//! system: script storage, process spawning and termination, output capture
//! and the lifecycle controller tying them together. The daemon and the CLI
//! only talk to it through [`Supervisor`] and the shared schema types.

pub mod config;
pub mod error;
pub mod log_reader;
pub mod logging;
pub mod names;
#[cfg(unix)]
pub mod process;
#[cfg(unix)]
pub mod registry;
pub mod store;
#[cfg(unix)]
pub mod supervisor;

#[cfg(test)]
mod error_tests;

// Re-export schema types for convenience
pub use schema::*;

pub use config::{FarmConfig, SupervisorConfig};
pub use error::{CoreError, Result};
pub use logging::{LogRing, SharedLogRing};
pub use names::validate_script_name;
pub use store::{DirScriptStore, ScriptStore};
#[cfg(unix)]
pub use supervisor::Supervisor;

/// Core utilities and helper functions
pub mod utils {
    use tracing::info;

    /// Initialize tracing for the application.
    ///
    /// `RUST_LOG` takes precedence over `level` when set.
    pub fn init_tracing(level: &str) -> crate::Result<()> {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        fmt()
            .with_env_filter(filter)
            .try_init()
            .map_err(|e| crate::CoreError::InitializationError(e.to_string()))?;

        info!("Tracing initialized with level: {}", level);
        Ok(())
    }
}
