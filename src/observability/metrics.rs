//! Metrics collection and exposition.
//!
//! # Metrics
//! - `dev_proxy_requests_total` (counter): dispatch outcomes by `kind` (web, socket)
//!   and `outcome` (pass, proxied, error)
//! - `dev_proxy_upstream_duration_seconds` (histogram): time spent in the
//!   forwarding primitive, by `kind`
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; nothing is kept without an exporter
//! - Prometheus exporter only when `metrics_address` is configured

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub const REQUESTS_TOTAL: &str = "dev_proxy_requests_total";
pub const UPSTREAM_DURATION: &str = "dev_proxy_upstream_duration_seconds";

/// Count one dispatch decision.
pub fn record_dispatch(kind: &'static str, outcome: &'static str) {
    metrics::counter!(REQUESTS_TOTAL, "kind" => kind, "outcome" => outcome).increment(1);
}

/// Record how long the forwarding primitive took, successful or not.
pub fn record_upstream(kind: &'static str, start: Instant) {
    metrics::histogram!(UPSTREAM_DURATION, "kind" => kind).record(start.elapsed().as_secs_f64());
}

/// Install the Prometheus recorder and its scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}
