//! Metrics collection and exposition.
//!
//! # Metrics
//! - `mock_write_requests_total` (counter): guard decisions by outcome
//! - `mock_store_mutations_total` (counter): store writes by operation
//! - `mock_rate_windows_active` (gauge): client windows currently tracked
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - Prometheus scrape endpoint runs on its own listener

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its HTTP listener.
/// Must be called from inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record the guard's verdict on a write request.
pub fn record_write_decision(decision: &'static str) {
    counter!("mock_write_requests_total", "decision" => decision).increment(1);
}

/// Record a successful store mutation.
pub fn record_store_mutation(op: &'static str) {
    counter!("mock_store_mutations_total", "op" => op).increment(1);
}

pub fn record_rate_windows(active: usize) {
    gauge!("mock_rate_windows_active").set(active as f64);
}
