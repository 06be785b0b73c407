//! Prometheus Metrics Module
//!
//! Exposes router metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Ingestion**: Batches received and records processed per stream
//! - **Relay**: Events published onto the shared queue
//! - **Dispatch**: Events dispatched and strategy hook failures
//! - **Connections**: Reconnects and stream errors
//! - **Cache**: Live markets per stream
//!
//! Recording is a no-op until [`init_metrics`] installs the recorder.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if another global recorder is already installed.
#[allow(clippy::expect_used)]
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "stream_router_batches_received_total",
        "Total batches delivered by provider streams"
    );
    describe_counter!(
        "stream_router_updates_processed_total",
        "Total update records processed by listeners"
    );
    describe_counter!(
        "stream_router_events_relayed_total",
        "Total events published onto the shared event queue"
    );
    describe_counter!(
        "stream_router_events_dispatched_total",
        "Total events consumed by the dispatcher"
    );
    describe_counter!(
        "stream_router_strategy_errors_total",
        "Total strategy hook failures"
    );
    describe_counter!(
        "stream_router_reconnects_total",
        "Total stream reconnection attempts"
    );
    describe_counter!(
        "stream_router_stream_errors_total",
        "Total stream failures by type"
    );
    describe_gauge!(
        "stream_router_live_markets",
        "Markets currently live in a stream's cache"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a batch delivered to a listener.
pub fn record_batch_received(stream_id: &str, records: usize) {
    counter!(
        "stream_router_batches_received_total",
        "stream_id" => stream_id.to_string()
    )
    .increment(1);
    counter!(
        "stream_router_updates_processed_total",
        "stream_id" => stream_id.to_string()
    )
    .increment(records as u64);
}

/// Update a stream's live-market count.
#[allow(clippy::cast_precision_loss)]
pub fn set_live_markets(stream_id: &str, count: usize) {
    gauge!(
        "stream_router_live_markets",
        "stream_id" => stream_id.to_string()
    )
    .set(count as f64);
}

/// Record an event relayed onto the shared queue.
pub fn record_event_relayed(stream_id: &str, event_kind: &'static str) {
    counter!(
        "stream_router_events_relayed_total",
        "stream_id" => stream_id.to_string(),
        "event" => event_kind
    )
    .increment(1);
}

/// Record an event consumed by the dispatcher.
pub fn record_event_dispatched(event_kind: &'static str) {
    counter!(
        "stream_router_events_dispatched_total",
        "event" => event_kind
    )
    .increment(1);
}

/// Record a failed strategy hook.
pub fn record_strategy_error(strategy: &str, hook: &'static str) {
    counter!(
        "stream_router_strategy_errors_total",
        "strategy" => strategy.to_string(),
        "hook" => hook
    )
    .increment(1);
}

/// Record a reconnection attempt.
pub fn record_reconnect(stream_id: &str) {
    counter!(
        "stream_router_reconnects_total",
        "stream_id" => stream_id.to_string()
    )
    .increment(1);
}

/// Record a stream failure.
pub fn record_stream_error(stream_id: &str, error_type: &'static str) {
    counter!(
        "stream_router_stream_errors_total",
        "stream_id" => stream_id.to_string(),
        "error_type" => error_type
    )
    .increment(1);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_recorder_is_noop() {
        record_batch_received("1000", 3);
        set_live_markets("1000", 1);
        record_event_relayed("1000", "market_book");
        record_event_dispatched("market_book");
        record_strategy_error("s", "process_market_book");
        record_reconnect("1000");
        record_stream_error("1000", "connection");
        assert!(get_metrics_handle().is_none());
    }
}
