//! Failed-request tracker daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!   event source ──NDJSON──▶ net::listener ──▶ capture::listener
//!                                                 │        │
//!                            header events ◀──────┘        └──────▶ terminal events
//!                                 │                                     │
//!                                 ▼                                     ▼
//!                      correlation::cache ──consume──▶ capture::record ──▶ capture::store
//!                         │ (debounced)                                        │
//!                         ▼                                                    ▼
//!                      storage (pendingHeaders)        storage (failedRequests) + badge
//!
//!   tracker-cli ──HTTP──▶ commands::server ──▶ commands::handler ──▶ capture::store
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use request_failure_tracker::badge::LogIndicator;
use request_failure_tracker::commands::{command_router, serve_commands};
use request_failure_tracker::config::{load_config, TrackerConfig};
use request_failure_tracker::lifecycle::{bootstrap, wait_for_signal, Shutdown};
use request_failure_tracker::net::IngestListener;
use request_failure_tracker::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "request-failure-tracker")]
#[command(about = "Records failed HTTP requests with their headers", long_about = None)]
struct Args {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => TrackerConfig::default(),
    };

    logging::init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "request-failure-tracker starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    let tracker = bootstrap(&config, Arc::new(LogIndicator::new()), &shutdown).await?;

    let ingest = IngestListener::bind(&config.ingest).await?;
    let ingest_task = tokio::spawn(ingest.run(tracker.events.clone(), shutdown.subscribe()));

    let command_listener = TcpListener::bind(&config.commands.bind_address).await?;
    let command_task = tokio::spawn(serve_commands(
        command_listener,
        command_router(tracker.app_state()),
        shutdown.subscribe(),
    ));

    wait_for_signal().await;
    shutdown.trigger();

    if let Err(e) = ingest_task.await {
        tracing::warn!(error = %e, "Ingest task ended abnormally");
    }
    match command_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "Command server failed"),
        Err(e) => tracing::warn!(error = %e, "Command task ended abnormally"),
    }
    tracker.teardown().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
