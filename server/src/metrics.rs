//! Application metrics for Prometheus monitoring.
//!
//! Installs the global metrics recorder at startup and renders the text
//! exposition for the `/metrics` endpoint. Individual counters and gauges
//! are recorded at their call sites (ingester, WebSocket sessions).

use std::sync::OnceLock;

use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder. Call once at startup,
/// before any metrics are recorded. Returns `false` when a recorder was
/// already installed.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        return false;
    }

    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    if metrics::set_global_recorder(recorder).is_err() {
        tracing::warn!("metrics recorder already installed");
        return false;
    }
    if PROMETHEUS_HANDLE.set(handle).is_err() {
        tracing::warn!("metrics handle already stored");
    }

    describe_metrics();
    true
}

fn describe_metrics() {
    describe_counter!("ingest_ticks_total", "Upstream poll attempts");
    describe_counter!("ingest_states_total", "Raw state rows received from upstream");
    describe_counter!("ingest_rate_limited_total", "Upstream rate-limit responses");
    describe_gauge!("ws_sessions_active", "Connected flights WebSocket sessions");
    describe_counter!("ws_diffs_sent_total", "Diff messages sent across all sessions");
}

/// Current metrics in Prometheus text format, or `None` before
/// initialization.
#[must_use]
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(PrometheusHandle::render)
}
