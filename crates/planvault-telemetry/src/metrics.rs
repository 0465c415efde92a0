//! Prometheus metrics.
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `planvault_requests_total` | Counter | `operation`, `status` | Total requests |
//! | `planvault_request_duration_seconds` | Histogram | `operation` | Request latency |
//! | `planvault_in_flight_requests` | Gauge | - | In-flight requests |
//! | `planvault_validation_failures_total` | Counter | `operation` | Schema rejections |
//! | `planvault_auth_failures_total` | Counter | `reason` | Rejected credentials |
//! | `planvault_index_intents_total` | Counter | `operation`, `result` | Intent deliveries |
//!
//! Recording functions are safe to call before [`init_metrics`]; without an
//! installed recorder they are no-ops.

use crate::error::TelemetryError;
use crate::TelemetryResult;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

/// Request counter name.
pub const REQUESTS_TOTAL: &str = "planvault_requests_total";
/// Request latency histogram name.
pub const REQUEST_DURATION_SECONDS: &str = "planvault_request_duration_seconds";
/// In-flight gauge name.
pub const IN_FLIGHT_REQUESTS: &str = "planvault_in_flight_requests";
/// Schema rejection counter name.
pub const VALIDATION_FAILURES_TOTAL: &str = "planvault_validation_failures_total";
/// Auth rejection counter name.
pub const AUTH_FAILURES_TOTAL: &str = "planvault_auth_failures_total";
/// Index intent counter name.
pub const INDEX_INTENTS_TOTAL: &str = "planvault_index_intents_total";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsConfig {
    /// Whether metrics are enabled.
    pub enabled: bool,

    /// Service name, attached as a global `service` label.
    pub service_name: String,

    /// Histogram buckets for request duration.
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            service_name: "planvault".to_string(),
            // 1ms .. 10s
            duration_buckets: vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ],
        }
    }
}

/// Outcome label for [`record_index_intent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentResult {
    /// Accepted by the broker.
    Delivered,
    /// Given up after the retry budget.
    Failed,
    /// Discarded because the publisher was shut down.
    Dropped,
}

impl IntentResult {
    /// Label value.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::Failed => "failed",
            Self::Dropped => "dropped",
        }
    }
}

/// Installs the global Prometheus recorder.
///
/// Metrics are exposed by rendering [`render_metrics`] from an HTTP route.
///
/// # Errors
///
/// Returns `TelemetryError::MetricsInit` if the buckets are invalid or a
/// recorder is already installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let handle = PrometheusBuilder::new()
        .add_global_label("service", config.service_name.clone())
        .set_buckets_for_metric(
            Matcher::Full(REQUEST_DURATION_SECONDS.to_string()),
            &config.duration_buckets,
        )
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?
        .install_recorder()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    let _ = METRICS_HANDLE.set(handle);
    register_metric_descriptions();

    Ok(())
}

/// Renders metrics in Prometheus text format.
///
/// Returns `None` if metrics are not initialized.
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

fn register_metric_descriptions() {
    describe_counter!(REQUESTS_TOTAL, "Total number of HTTP requests processed");
    describe_histogram!(REQUEST_DURATION_SECONDS, "HTTP request duration in seconds");
    describe_gauge!(
        IN_FLIGHT_REQUESTS,
        "Number of HTTP requests currently being processed"
    );
    describe_counter!(
        VALIDATION_FAILURES_TOTAL,
        "Plan documents rejected by the schema"
    );
    describe_counter!(AUTH_FAILURES_TOTAL, "Requests rejected by the auth gate");
    describe_counter!(INDEX_INTENTS_TOTAL, "Index intents by delivery result");
}

/// Records a completed request.
pub fn record_request(operation: &str, status_code: u16, duration: Duration) {
    counter!(
        REQUESTS_TOTAL,
        "operation" => operation.to_string(),
        "status" => status_code.to_string()
    )
    .increment(1);

    histogram!(
        REQUEST_DURATION_SECONDS,
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Records a schema rejection.
pub fn record_validation_failure(operation: &str) {
    counter!(VALIDATION_FAILURES_TOTAL, "operation" => operation.to_string()).increment(1);
}

/// Records a rejected credential.
///
/// `reason` is e.g. "missing", "malformed" or "invalid".
pub fn record_auth_failure(reason: &str) {
    counter!(AUTH_FAILURES_TOTAL, "reason" => reason.to_string()).increment(1);
}

/// Records the fate of one index intent.
pub fn record_index_intent(operation: &str, result: IntentResult) {
    counter!(
        INDEX_INTENTS_TOTAL,
        "operation" => operation.to_string(),
        "result" => result.as_str()
    )
    .increment(1);
}

/// Guard that tracks one in-flight request.
///
/// Decrements the gauge on drop, including during unwinding.
#[derive(Debug)]
pub struct InFlightGuard {
    _private: (),
}

impl InFlightGuard {
    /// Creates a new guard and increments the in-flight gauge.
    #[must_use]
    pub fn new() -> Self {
        gauge!(IN_FLIGHT_REQUESTS).increment(1.0);
        Self { _private: () }
    }
}

impl Default for InFlightGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        gauge!(IN_FLIGHT_REQUESTS).decrement(1.0);
    }
}
