//! Prometheus metrics helpers for the wikipatrol daemon.
//!
//! Centralized metrics initialization and the metric descriptions used
//! across the pipeline.
//!
//! # Usage
//!
//! ```rust,ignore
//! use wikipatrol_core::metrics::{init_metrics, start_metrics_server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let handle = init_metrics();
//!     start_metrics_server(9090, handle).await.unwrap();
//!
//!     metrics::counter!("feed_events_total").increment(1);
//! }
//! ```
//!
//! # Naming conventions
//!
//! - Prefix: component name (`feed_`, `pipeline_`, `score_`, `store_`)
//! - Suffix: unit or type (`_total`, `_seconds`)
//! - Labels: used sparingly (only `reason` on failure counters)

use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

/// Initialize the Prometheus metrics recorder.
///
/// Must be called once at startup before any metrics are recorded. Returns
/// a handle for use with [`start_metrics_server`].
///
/// # Panics
///
/// Panics if the recorder is already installed.
pub fn init_metrics() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    register_common_metrics();

    handle
}

/// Like [`init_metrics`] but returns `None` if a recorder is already
/// installed, instead of panicking. Useful for tests.
pub fn try_init_metrics() -> Option<PrometheusHandle> {
    PrometheusBuilder::new().install_recorder().ok()
}

/// Start the Prometheus metrics HTTP server.
///
/// Serves `/metrics` on the given port. Spawns a background task and
/// returns immediately.
pub async fn start_metrics_server(
    port: u16,
    handle: PrometheusHandle,
) -> Result<(), std::io::Error> {
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Metrics server listening on http://{}/metrics", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Metrics server error: {}", e);
        }
    });

    Ok(())
}

/// Register descriptions for the metrics used across the daemon.
///
/// Called automatically by [`init_metrics`].
fn register_common_metrics() {
    // =========================================================================
    // Feed metrics
    // =========================================================================

    describe_counter!(
        "feed_events_total",
        "Messages received from the recent-change stream"
    );
    describe_counter!(
        "feed_decode_errors_total",
        "Feed messages dropped because the payload failed to decode"
    );
    describe_counter!(
        "feed_transport_errors_total",
        "Transient stream transport errors (connection is retried)"
    );
    describe_counter!(
        "feed_connections_total",
        "Times the stream connection was (re)opened"
    );

    // =========================================================================
    // Pipeline metrics
    // =========================================================================

    describe_counter!(
        "pipeline_events_accepted_total",
        "Events that passed the edit/allow-list filter"
    );
    describe_counter!(
        "pipeline_events_rejected_total",
        "Events dropped by the filter"
    );
    describe_counter!(
        "pipeline_events_invalid_total",
        "Accepted edits dropped for a missing revision descriptor"
    );
    describe_gauge!(
        "pipeline_in_flight",
        "Events currently being enriched or stored"
    );

    // =========================================================================
    // Scoring metrics
    // =========================================================================

    describe_counter!("score_requests_total", "ORES scoring requests issued");
    describe_counter!(
        "score_failures_total",
        "ORES scoring failures (label: reason = unavailable|malformed)"
    );
    describe_histogram!(
        "score_duration_seconds",
        "Latency of ORES scoring requests"
    );

    // =========================================================================
    // Store metrics
    // =========================================================================

    describe_counter!("store_inserts_total", "Records persisted to the store");
    describe_counter!(
        "store_duplicates_total",
        "Inserts skipped because the identity already existed"
    );
    describe_counter!("store_failures_total", "Store insert failures");
    describe_gauge!(
        "store_records_approximate",
        "Approximate number of records in the store"
    );

    // =========================================================================
    // Process metrics
    // =========================================================================

    describe_gauge!(
        "ingest_running",
        "Whether the ingestion daemon is running (1=yes, 0=no)"
    );
}
