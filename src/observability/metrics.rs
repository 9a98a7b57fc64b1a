//! Metrics collection and exposition.
//!
//! # Metrics
//! - `replica_connections_total` (counter): classified connections by protocol
//! - `replica_sniff_failures_total` (counter): connections dropped before classification
//! - `replica_publish_total` (counter): publishes by outcome
//! - `replica_active_sessions` (gauge): live subscriber sessions
//! - `replica_topics` (gauge): topics with at least one subscriber
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, which keeps tests exporter-free
//! - Prometheus exposition on its own listener

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_connection(protocol: &'static str) {
    ::metrics::counter!("replica_connections_total", "protocol" => protocol).increment(1);
}

pub fn record_sniff_failure() {
    ::metrics::counter!("replica_sniff_failures_total").increment(1);
}

pub fn record_publish(outcome: &'static str) {
    ::metrics::counter!("replica_publish_total", "outcome" => outcome).increment(1);
}

pub fn set_active_sessions(count: u64) {
    ::metrics::gauge!("replica_active_sessions").set(count as f64);
}

pub fn set_topics(count: usize) {
    ::metrics::gauge!("replica_topics").set(count as f64);
}
