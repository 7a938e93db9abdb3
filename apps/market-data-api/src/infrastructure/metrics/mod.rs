//! Prometheus Metrics Module
//!
//! Exposes application metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Queries**: Counts by endpoint, record kind and outcome; rows returned
//! - **Export**: Rows written to CSV artifacts
//! - **Subscriptions**: Active subscription gauge, pushes, failed iterations
//! - **Latency**: Store query latency
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the HTTP port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::records::DataKind;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Repeated calls return the handle installed by the first call.
///
/// # Errors
///
/// Returns an error if the global recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
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
        "market_api_queries_total",
        "Total store-backed operations by endpoint, kind and outcome"
    );
    describe_counter!(
        "market_api_rows_returned_total",
        "Total shaped records returned to HTTP clients"
    );
    describe_counter!(
        "market_api_export_rows_total",
        "Total rows written to CSV exports"
    );

    describe_gauge!(
        "market_api_active_subscriptions",
        "Number of active live-feed subscriptions"
    );
    describe_counter!(
        "market_api_subscription_pushes_total",
        "Total live-feed pushes delivered to clients"
    );
    describe_counter!(
        "market_api_subscription_failures_total",
        "Total failed live-feed iterations"
    );

    describe_histogram!(
        "market_api_query_duration_seconds",
        "Store query latency by endpoint"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Metric labels for operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Range query.
    Range,
    /// Latest-N query.
    Latest,
    /// CSV export.
    Export,
    /// Live-feed iteration.
    Feed,
}

impl Endpoint {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Range => "range",
            Self::Latest => "latest",
            Self::Export => "export",
            Self::Feed => "feed",
        }
    }
}

/// Metric labels for outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Completed.
    Ok,
    /// Rejected before touching the store.
    Invalid,
    /// Store or I/O failure.
    Failed,
}

impl Outcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Invalid => "invalid",
            Self::Failed => "failed",
        }
    }
}

/// Record one operation.
pub fn record_query(endpoint: Endpoint, kind: Option<DataKind>, outcome: Outcome) {
    counter!(
        "market_api_queries_total",
        "endpoint" => endpoint.as_str(),
        "data_type" => kind.map_or("unknown", |k| k.as_str()),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Record rows returned by a JSON endpoint.
pub fn record_rows_returned(endpoint: Endpoint, count: usize) {
    counter!(
        "market_api_rows_returned_total",
        "endpoint" => endpoint.as_str()
    )
    .increment(count as u64);
}

/// Record rows written to an export.
pub fn record_export_rows(kind: DataKind, count: usize) {
    counter!(
        "market_api_export_rows_total",
        "data_type" => kind.as_str()
    )
    .increment(count as u64);
}

/// Update the active subscription count.
#[allow(clippy::cast_precision_loss)]
pub fn set_active_subscriptions(count: usize) {
    gauge!("market_api_active_subscriptions").set(count as f64);
}

/// Record a delivered live-feed push.
pub fn record_push(kind: DataKind) {
    counter!(
        "market_api_subscription_pushes_total",
        "data_type" => kind.as_str()
    )
    .increment(1);
}

/// Record a failed live-feed iteration.
pub fn record_iteration_failure(kind: DataKind) {
    counter!(
        "market_api_subscription_failures_total",
        "data_type" => kind.as_str()
    )
    .increment(1);
}

/// Record store query latency.
pub fn record_query_duration(endpoint: Endpoint, duration: Duration) {
    histogram!(
        "market_api_query_duration_seconds",
        "endpoint" => endpoint.as_str()
    )
    .record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_as_str() {
        assert_eq!(Endpoint::Range.as_str(), "range");
        assert_eq!(Endpoint::Latest.as_str(), "latest");
        assert_eq!(Endpoint::Export.as_str(), "export");
        assert_eq!(Endpoint::Feed.as_str(), "feed");
    }

    #[test]
    fn outcome_as_str() {
        assert_eq!(Outcome::Ok.as_str(), "ok");
        assert_eq!(Outcome::Invalid.as_str(), "invalid");
        assert_eq!(Outcome::Failed.as_str(), "failed");
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_query(Endpoint::Range, Some(DataKind::Trades), Outcome::Ok);
        record_rows_returned(Endpoint::Latest, 3);
        set_active_subscriptions(2);
    }
}
