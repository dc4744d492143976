//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_sampling_decisions_total` (counter): gate outcomes by `sampled`
//! - `gateway_transactions_total` (counter): finished transactions by status
//! - `gateway_transaction_duration_seconds` (histogram): transaction latency
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed
//! - Labels stay low-cardinality (no paths, no ids)

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_sampling_decision(sampled: bool) {
    counter!(
        "gateway_sampling_decisions_total",
        "sampled" => if sampled { "true" } else { "false" }
    )
    .increment(1);
}

pub fn record_transaction(status: u16, duration: Duration) {
    counter!("gateway_transactions_total", "status" => status.to_string()).increment(1);
    histogram!("gateway_transaction_duration_seconds").record(duration.as_secs_f64());
}
