//! Metrics collection and export for Parley.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "parley_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "parley_connections_active";
    pub const MESSAGES_TOTAL: &str = "parley_messages_total";
    pub const MESSAGES_BYTES: &str = "parley_messages_bytes";
    pub const STORED_MESSAGES_TOTAL: &str = "parley_stored_messages_total";
    pub const ROOMS_ACTIVE: &str = "parley_rooms_active";
    pub const USERS_REGISTERED: &str = "parley_users_registered";
    pub const LATENCY_SECONDS: &str = "parley_latency_seconds";
    pub const ERRORS_TOTAL: &str = "parley_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of active connections"
    );
    metrics::describe_counter!(names::MESSAGES_TOTAL, "Total number of frames processed");
    metrics::describe_counter!(names::MESSAGES_BYTES, "Total bytes of frames processed");
    metrics::describe_counter!(
        names::STORED_MESSAGES_TOTAL,
        "Chat messages appended to history, by scope"
    );
    metrics::describe_gauge!(names::ROOMS_ACTIVE, "Number of known rooms");
    metrics::describe_gauge!(names::USERS_REGISTERED, "Connections with a display name");
    metrics::describe_histogram!(
        names::LATENCY_SECONDS,
        "Event processing latency in seconds"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{port}").parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a frame.
pub fn record_message(bytes: usize, direction: &'static str) {
    counter!(names::MESSAGES_TOTAL, "direction" => direction).increment(1);
    counter!(names::MESSAGES_BYTES, "direction" => direction).increment(bytes as u64);
}

/// Record a message appended to history.
pub fn record_stored(scope: &'static str) {
    counter!(names::STORED_MESSAGES_TOTAL, "scope" => scope).increment(1);
}

/// Record processing latency.
pub fn record_latency(seconds: f64) {
    histogram!(names::LATENCY_SECONDS).record(seconds);
}

/// Update room and roster gauges.
pub fn set_engine_gauges(rooms: usize, registered: usize) {
    gauge!(names::ROOMS_ACTIVE).set(rooms as f64);
    gauge!(names::USERS_REGISTERED).set(registered as f64);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_guard() {
        // No recorder installed; must not panic
        let _guard = ConnectionMetricsGuard::new();
        record_stored("global");
        record_message(10, "inbound");
    }
}
