//! Metrics collection and exposition.
//!
//! # Metrics
//! - `site_proxy_proxy_requests_total` (counter): upstream requests by method, status
//! - `site_proxy_cgi_executions_total` (counter): CGI outcomes by result
//! - `site_proxy_rate_limited_total` (counter): requests rejected with 429
//! - `site_proxy_reload_broadcasts_total` (counter): reload notifications sent
//!
//! Recording is a no-op until [`install_exporter`] installs a recorder.

use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

#[derive(Debug, thiserror::Error)]
#[error("failed to install metrics exporter on {addr}: {reason}")]
pub struct MetricsError {
    pub addr: SocketAddr,
    pub reason: String,
}

/// Install the Prometheus recorder with its own scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn install_exporter(addr: SocketAddr) -> Result<(), MetricsError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsError {
            addr,
            reason: e.to_string(),
        })?;

    describe_counter!(
        "site_proxy_proxy_requests_total",
        "Requests forwarded to proxy upstreams"
    );
    describe_counter!(
        "site_proxy_cgi_executions_total",
        "CGI script executions by outcome"
    );
    describe_counter!(
        "site_proxy_rate_limited_total",
        "Requests rejected by the rate limiter"
    );
    describe_counter!(
        "site_proxy_reload_broadcasts_total",
        "Hot-reload notifications delivered to subscribers"
    );

    tracing::info!(%addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_proxy(method: &str, status: u16) {
    counter!(
        "site_proxy_proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_cgi(outcome: &'static str) {
    counter!("site_proxy_cgi_executions_total", "outcome" => outcome).increment(1);
}

pub fn record_rate_limited() {
    counter!("site_proxy_rate_limited_total").increment(1);
}

pub fn record_reload_broadcast(port: u16, subscribers: usize) {
    counter!("site_proxy_reload_broadcasts_total", "port" => port.to_string())
        .increment(subscribers as u64);
}
