//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Fails if another recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// Sessions started (counter).
pub const SESSIONS_TOTAL: &str = "relay_sessions_total";
/// Sessions currently relaying (gauge).
pub const SESSIONS_ACTIVE: &str = "relay_sessions_active";
/// Records forwarded to clients (counter).
pub const RECORDS_FORWARDED_TOTAL: &str = "relay_records_forwarded_total";
/// Records dropped for checksum mismatch (counter).
pub const INTEGRITY_FAILURES_TOTAL: &str = "relay_integrity_failures_total";
/// Upgrades refused because the device could not be reached (counter).
pub const BACKEND_DIAL_FAILURES_TOTAL: &str = "relay_backend_dial_failures_total";
/// Session lifetime (histogram, labels: end).
pub const SESSION_DURATION_SECONDS: &str = "relay_session_duration_seconds";
