// src/core/metrics.rs

//! Prometheus metrics, registered once globally for the process lifetime:
//! a `lazy_static!` block of `register_*!` calls plus a `gather_metrics()`
//! text encoder.

use lazy_static::lazy_static;
use prometheus::{Counter, Gauge, TextEncoder, register_counter, register_gauge};

lazy_static! {
    /// Number of clients currently connected.
    pub static ref CONNECTED_CLIENTS: Gauge =
        register_gauge!("objectdb_connected_clients", "Number of currently connected clients.").unwrap();
    /// Total connections accepted since startup.
    pub static ref CONNECTIONS_RECEIVED_TOTAL: Counter =
        register_counter!("objectdb_connections_received_total", "Total number of connections received.").unwrap();
    /// Total wire requests dispatched to the façade since startup.
    pub static ref REQUESTS_TOTAL: Counter =
        register_counter!("objectdb_requests_total", "Total number of requests processed.").unwrap();
    /// Total requests that returned an error response.
    pub static ref REQUEST_ERRORS_TOTAL: Counter =
        register_counter!("objectdb_request_errors_total", "Total number of requests that returned an error.").unwrap();
    /// Total object/file notifications fanned out by the pub/sub dispatcher.
    pub static ref NOTIFICATIONS_SENT_TOTAL: Counter =
        register_counter!("objectdb_notifications_sent_total", "Total number of pub/sub notifications delivered.").unwrap();
}

/// Gathers all registered metrics and encodes them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families).unwrap()
}
