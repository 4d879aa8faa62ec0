//! Prometheus metrics recorder and metric names.

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use crate::TelemetryError;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Call once at startup, before any metrics are recorded.
pub fn install_metrics_recorder() -> Result<PrometheusHandle, TelemetryError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_metrics();
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// Register help text for every metric with the active recorder.
pub fn describe_metrics() {
    describe_counter!(HUB_BROADCASTS_TOTAL, "Payloads fanned out by the hub");
    describe_counter!(
        HUB_BACKPRESSURE_DROPS_TOTAL,
        "Participants dropped because their outbound queue was full"
    );
    describe_gauge!(HUB_PARTICIPANTS_ACTIVE, "Participants registered with the hub");
    describe_counter!(WS_CONNECTIONS_TOTAL, "WebSocket connections accepted");
    describe_counter!(WS_DISCONNECTIONS_TOTAL, "WebSocket connections torn down");
    describe_counter!(MOVES_APPLIED_TOTAL, "Moves accepted by the rules engine");
    describe_counter!(MOVES_REJECTED_TOTAL, "Moves rejected by the rules engine");
    describe_counter!(STORE_WRITE_ERRORS_TOTAL, "Failed position writes");
    describe_histogram!(
        ENGINE_THINK_SECONDS,
        Unit::Seconds,
        "Time the engine spent choosing a reply"
    );
}

// Metric name constants shared across crates.

/// Hub broadcasts total (counter).
pub const HUB_BROADCASTS_TOTAL: &str = "hub_broadcasts_total";
/// Participants dropped for backpressure (counter).
pub const HUB_BACKPRESSURE_DROPS_TOTAL: &str = "hub_backpressure_drops_total";
/// Registered participants (gauge).
pub const HUB_PARTICIPANTS_ACTIVE: &str = "hub_participants_active";
/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Accepted moves (counter, labels: kind).
pub const MOVES_APPLIED_TOTAL: &str = "moves_applied_total";
/// Rejected moves (counter, labels: kind).
pub const MOVES_REJECTED_TOTAL: &str = "moves_rejected_total";
/// Position writes that failed (counter).
pub const STORE_WRITE_ERRORS_TOTAL: &str = "store_write_errors_total";
/// Engine search duration (histogram).
pub const ENGINE_THINK_SECONDS: &str = "engine_think_seconds";
