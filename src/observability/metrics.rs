//! Metrics collection and exposition.
//!
//! # Metrics
//! - `dynhttp_requests_total` (counter): dispatched requests by outcome
//! - `dynhttp_table_rebuilds_total` (counter): installed routing tables
//! - `dynhttp_table_build_seconds` (histogram): compile time per rebuild
//! - `dynhttp_endpoints` (gauge): registered endpoints
//! - `dynhttp_table_generation` (gauge): generation of the current table
//! - `dynhttp_registry_rejections_total` (counter): rejected changes by reason
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

/// Record one dispatched request.
pub fn record_dispatch(outcome: &'static str) {
    metrics::counter!("dynhttp_requests_total", "outcome" => outcome).increment(1);
}

/// Record a successful table rebuild.
pub fn record_rebuild(started: Instant, endpoints: usize, generation: u64) {
    metrics::counter!("dynhttp_table_rebuilds_total").increment(1);
    metrics::histogram!("dynhttp_table_build_seconds").record(started.elapsed().as_secs_f64());
    metrics::gauge!("dynhttp_endpoints").set(endpoints as f64);
    metrics::gauge!("dynhttp_table_generation").set(generation as f64);
}

/// Record a rejected registry change.
pub fn record_rejection(reason: &'static str) {
    metrics::counter!("dynhttp_registry_rejections_total", "reason" => reason).increment(1);
}
