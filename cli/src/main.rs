//! sploitctl binary
//!
//! Command-line interface for operating scripts through the sploit daemon.

#![allow(unused_crate_dependencies)]

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use cli::{
    format_log_entry, format_running_script, format_status_report, Client, ClientConfig,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sploitctl")]
#[command(about = "Operate sploit scripts through the sploit daemon")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Daemon host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Daemon port
    #[arg(long, default_value_t = 49384)]
    port: u16,

    /// Seconds to wait for each daemon response
    #[arg(long, default_value_t = 30)]
    timeout: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Get daemon status
    Status,
    /// Launch a stored script
    Start {
        name: String,
        /// Farm server URL handed to the script (defaults to the daemon's)
        #[arg(long)]
        server_url: Option<String>,
        /// Task label passed as --task
        #[arg(long)]
        task: Option<String>,
    },
    /// Stop a running script
    Stop { name: String },
    /// Show the status of one script
    ScriptStatus { name: String },
    /// List running scripts
    List,
    /// Stop a script if needed, then remove it and its logs
    Delete { name: String },
    /// Print captured output
    Logs {
        name: String,
        /// Only entries with a sequence number above this one
        #[arg(long)]
        after: Option<u64>,
        /// Keep polling for new entries
        #[arg(short, long)]
        follow: bool,
    },
    /// Upload a script file
    Upload {
        file: PathBuf,
        /// Name to store it under (defaults to the file name)
        #[arg(long)]
        name: Option<String>,
    },
    /// List stored scripts
    Scripts,
}

const FOLLOW_INTERVAL: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = Client::new(ClientConfig {
        daemon_host: cli.host,
        daemon_port: cli.port,
        timeout: Duration::from_secs(cli.timeout),
    });

    match cli.command {
        Commands::Status => {
            let status = client.status().await?;
            println!("Daemon Status:");
            println!("  Running: {}", status.running);
            println!("  PID: {}", status.pid);
            println!("  Uptime: {} seconds", status.uptime_seconds);
            if let Some(version) = status.version {
                println!("  Version: {}", version);
            }
        }
        Commands::Start {
            name,
            server_url,
            task,
        } => {
            let started = client
                .start_script(&name, server_url.as_deref(), task.as_deref())
                .await?;
            println!("✓ Started {} (PID {})", name, started.pid);
            println!("  Command: {}", started.command.join(" "));
        }
        Commands::Stop { name } => {
            println!("✓ {}", client.stop_script(&name).await?);
        }
        Commands::ScriptStatus { name } => {
            let report = client.script_status(&name).await?;
            println!("{}", format_status_report(&name, &report));
        }
        Commands::List => {
            let scripts = client.list_running().await?;
            if scripts.is_empty() {
                println!("No running scripts");
            }
            for script in &scripts {
                println!("{}", format_running_script(script));
            }
        }
        Commands::Delete { name } => {
            println!("✓ {}", client.delete_script(&name).await?);
        }
        Commands::Logs {
            name,
            after,
            follow,
        } => {
            let mut after = after;
            loop {
                let snapshot = client.logs(&name, after).await?;
                for entry in &snapshot.entries {
                    println!("{}", format_log_entry(entry));
                }
                if let Some(last) = snapshot.entries.last() {
                    after = Some(last.seq);
                }
                if !follow {
                    break;
                }
                tokio::time::sleep(FOLLOW_INTERVAL).await;
            }
        }
        Commands::Upload { file, name } => {
            let name = match name {
                Some(name) => name,
                None => file
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_string)
                    .ok_or_else(|| anyhow!("cannot derive a script name from {}", file.display()))?,
            };
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            println!("✓ {}", client.upload_script(&name, content).await?);
        }
        Commands::Scripts => {
            let names = client.list_scripts().await?;
            if names.is_empty() {
                println!("No scripts");
            }
            for name in names {
                println!("{}", name);
            }
        }
    }

    Ok(())
}
