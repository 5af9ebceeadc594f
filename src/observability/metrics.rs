//! Metrics collection and exposition.
//!
//! # Metrics
//! - `clipshare_requests_total` (counter): requests by method, status
//! - `clipshare_rejected_total` (counter): refused requests by reason
//! - `clipshare_entries` (gauge): entries after the last sweep
//! - `clipshare_stored_bytes` (gauge): bytes after the last sweep
//! - `clipshare_visitors` (gauge): tracked client addresses
//! - `clipshare_expired_total` (counter): entries removed by the janitor
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16) {
    metrics::counter!(
        "clipshare_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_rejection(reason: &'static str) {
    metrics::counter!("clipshare_rejected_total", "reason" => reason).increment(1);
}

pub fn record_sweep(entries: u64, bytes: u64, visitors: usize, expired: u64) {
    metrics::gauge!("clipshare_entries").set(entries as f64);
    metrics::gauge!("clipshare_stored_bytes").set(bytes as f64);
    metrics::gauge!("clipshare_visitors").set(visitors as f64);
    metrics::counter!("clipshare_expired_total").increment(expired);
}
