//! sploitd: the sploit supervisor daemon
//!
//! Serves the control protocol until Ctrl+C, then stops every running script.

#![allow(unused_crate_dependencies)]

use clap::Parser;
use daemon::bootstrap;
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "sploitd", version, about = "Supervisor daemon for sploit scripts")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> daemon::Result<()> {
    let args = Args::parse();
    let config = bootstrap::load_config(args.config.as_deref())?;
    sploit_core::utils::init_tracing(&config.daemon.log_level)?;

    info!("Starting sploitd {}", env!("CARGO_PKG_VERSION"));

    let handle = match bootstrap::bootstrap(config).await {
        Ok(handle) => handle,
        Err(e) => {
            error!("Daemon failed: {}", e);
            return Err(e);
        }
    };
    info!("Control protocol listening on {}", handle.local_addr());

    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for Ctrl+C");
    info!("Received Ctrl+C, shutting down...");

    handle.shutdown().await;
    info!("Daemon stopped");
    Ok(())
}
