//! Log Viewer Service
//!
//! Reads system logs and runs fixed diagnostics on behalf of the desktop
//! log viewer, which cannot access them itself.
//!
//! Usage:
//!     logview-service --config /etc/logview/service.toml

use anyhow::Context;
use clap::Parser;
use logview::{serve, Gateway, LogViewerService};
use logview_logging::{init_logging, LogConfig};
use logview_protocol::{paths, BusKind, ServiceConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Notify;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "logview-service", about = "Privileged log access service for the log viewer")]
struct Args {
    /// Service configuration file
    #[arg(long, env = "LOGVIEW_CONFIG", default_value_os_t = paths::default_config_path())]
    config: PathBuf,

    /// Attach to the session bus instead of the system bus (development)
    #[arg(long)]
    session: bool,

    /// Debug output on stderr
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = ServiceConfig::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    if args.session {
        config.bus = BusKind::Session;
    }

    if let Err(err) = init_logging(LogConfig {
        app_name: "logview-service",
        log_dir: &config.log_dir,
        verbose: args.verbose,
    }) {
        warn!("File logging unavailable, using stderr only: {:#}", err);
    }

    info!("Starting log viewer service");
    info!("  Config: {}", args.config.display());
    info!("  Bus: {:?}", config.bus);
    info!("  Trusted client: {}", config.trusted_client);

    let gateway = Arc::new(Gateway::new(&config));
    let shutdown = Arc::new(Notify::new());
    let service = LogViewerService::new(Arc::clone(&gateway), Arc::clone(&shutdown));

    let connection = serve(config.bus, service)
        .await
        .context("Failed to register on the message bus")?;

    let mut terminate = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    tokio::select! {
        _ = shutdown.notified() => info!("Quit requested by client"),
        _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
        _ = terminate.recv() => info!("Received SIGTERM"),
    }

    drop(connection);
    tokio::task::spawn_blocking(move || gateway.cleanup())
        .await
        .context("Cleanup task failed")?;
    info!("Log viewer service stopped");
    Ok(())
}
