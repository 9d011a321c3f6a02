//! Dev server with a path-routing proxy in front.
//!
//! # Architecture Overview
//!
//! ```text
//!     Browser                ┌──────────────────────────────────────────────┐
//!     ───────────────────────┼─▶ request id ─▶ trace ─▶ proxy middleware ───┼──▶ upstream (http / ws)
//!                            │                              │ miss          │
//!                            │                              ▼               │
//!                            │                 hot-reload ws / static root  │
//!                            └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use dev_proxy::config::{load_config, DevServerConfig};
use dev_proxy::lifecycle::{shutdown_signal, Shutdown};
use dev_proxy::observability::{self, metrics};
use dev_proxy::{DevServer, HyperForwarder};

#[derive(Parser, Debug)]
#[command(name = "dev-proxy", version, about = "Development server with a request-routing proxy")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the bind address (e.g. 127.0.0.1:5173).
    #[arg(short, long)]
    bind: Option<String>,

    /// Override the static root directory.
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// More logging (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Args {
    fn log_level(&self) -> Option<&'static str> {
        if self.quiet {
            return Some("error");
        }
        match self.verbose {
            0 => None,
            1 => Some("debug"),
            _ => Some("trace"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => DevServerConfig::default(),
    };
    if let Some(bind) = &args.bind {
        config.server.bind_address = bind.clone();
    }
    if let Some(root) = &args.root {
        config.server.root = Some(root.clone());
    }

    observability::init_logging(&config.observability, args.log_level())?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?args.config,
        "dev-proxy starting"
    );

    if let Some(addr) = &config.observability.metrics_address {
        match addr.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => {
                tracing::error!(metrics_address = %addr, "Failed to parse metrics address");
            }
        }
    }

    let server = DevServer::new(&config, Arc::new(HyperForwarder::new()))?;

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    shutdown.trigger_on(shutdown_signal());
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
