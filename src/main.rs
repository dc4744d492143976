//! Instrumented API gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!   Client ──▶ InstrumentationLayer ──▶ endpoint handler ──▶ proxy ──▶ backend(s)
//!              (sampling gate,          (transaction       (internal  (external
//!               transaction start)       named by path)     segment)   segments)
//! ```
//!
//! Tracing is optional: without a valid `extra_config.gateway_instrumentation`
//! block the pipeline runs undecorated.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use gateway_instrumentation::config::{load_config, GatewayConfig};
use gateway_instrumentation::lifecycle::{signals, startup, Shutdown};
use gateway_instrumentation::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "gateway")]
#[command(about = "API gateway with request pipeline instrumentation", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Service name reported with every transaction.
    #[arg(long, default_value = "gateway")]
    service: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init(&config.observability.log_level);
    tracing::info!("gateway v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        endpoints = config.endpoints.len(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    let instrumentation = startup::init_instrumentation(&config, &cli.service).await;
    let instrumentation = startup::start_sample_buffer(instrumentation, &shutdown);

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = startup::build_server(config, &instrumentation)?;

    signals::forward_signals(&shutdown);
    server.run(listener, shutdown.subscribe()).await?;

    instrumentation.shutdown(Duration::from_secs(5)).await;
    tracing::info!("Shutdown complete");
    Ok(())
}
