//! Daemon bootstrap: load configuration, build the supervisor and serve the
//! control protocol
//!
//! [`bootstrap`] returns once the control address is bound, so callers (the
//! binary, integration tests) can connect right away. [`BootstrapHandle::shutdown`]
//! stops accepting connections and then terminates every running script.

use crate::{Daemon, DaemonError, Result};
use sploit_core::{FarmConfig, Supervisor};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Handle to manage the running components
#[derive(Debug)]
pub struct BootstrapHandle {
    daemon: Daemon,
    local_addr: SocketAddr,
    server_task: Option<JoinHandle<Result<()>>>,
}

impl BootstrapHandle {
    /// Address the control protocol is served on
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn supervisor(&self) -> &Arc<Supervisor> {
        self.daemon.supervisor()
    }

    /// Stop the server, then stop every script
    pub async fn shutdown(mut self) {
        self.daemon.stop();
        if let Some(task) = self.server_task.take() {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Control server ended with error: {}", e),
                Err(e) => warn!("Control server task failed: {}", e),
            }
        }
        self.daemon.supervisor().shutdown().await;
        info!("Bootstrap shutdown complete");
    }
}

/// Read the configuration file, or fall back to defaults when none is given
pub fn load_config(path: Option<&Path>) -> Result<FarmConfig> {
    match path {
        Some(path) => {
            let config = FarmConfig::load_from_toml_path(path)?;
            info!("Loaded configuration from {}", path.display());
            Ok(config)
        }
        None => Ok(FarmConfig::default()),
    }
}

/// Bootstrap the daemon components
pub async fn bootstrap(config: FarmConfig) -> Result<BootstrapHandle> {
    let supervisor = Supervisor::new(config.supervisor.clone())
        .map_err(|e| DaemonError::ServerError(format!("supervisor init failed: {e}")))?;
    info!(
        "Supervising scripts in {} (runner: {:?})",
        config.supervisor.scripts_dir.display(),
        config.supervisor.runner
    );

    let daemon = Daemon::new(config.daemon, Arc::new(supervisor));
    let listener = daemon.bind().await?;
    let local_addr = listener.local_addr()?;

    let server = daemon.clone();
    let server_task = tokio::spawn(async move { server.serve(listener).await });

    Ok(BootstrapHandle {
        daemon,
        local_addr,
        server_task: Some(server_task),
    })
}
