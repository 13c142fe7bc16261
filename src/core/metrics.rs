//! Prometheus metrics for monitoring the gateway.
//!
//! This module provides a centralized metrics registry for tracking requests,
//! latency, token usage, upstream failures and streaming behaviour.

use prometheus::{
    register_gauge_vec, register_histogram_vec, register_int_counter,
    register_int_counter_vec, GaugeVec, HistogramVec, IntCounter, IntCounterVec,
};
use std::sync::OnceLock;

/// Container for all application metrics.
pub struct Metrics {
    /// Total number of requests by method, endpoint, model and status
    pub request_count: IntCounterVec,

    /// Request duration histogram in seconds
    pub request_duration: HistogramVec,

    /// Number of currently active requests by endpoint
    pub active_requests: GaugeVec,

    /// Total token usage by model and token type
    pub token_usage: IntCounterVec,

    /// Upstream failures by error kind
    pub upstream_errors: IntCounterVec,

    /// Streams abandoned by the caller before completion
    pub client_disconnects_total: IntCounter,

    /// Time to first streamed chunk in seconds
    pub ttft: HistogramVec,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Initialize the metrics registry.
///
/// This should be called once at application startup. Subsequent calls will
/// return the same instance.
///
/// # Examples
///
/// ```no_run
/// use gemini_gateway::core::metrics::init_metrics;
///
/// let metrics = init_metrics();
/// metrics.request_count.with_label_values(&["GET", "/health", "unknown", "200"]).inc();
/// ```
pub fn init_metrics() -> &'static Metrics {
    METRICS.get_or_init(|| {
        let request_count = register_int_counter_vec!(
            "gemini_gateway_requests_total",
            "Total number of requests",
            &["method", "endpoint", "model", "status_code"]
        )
        .expect("Failed to register request_count metric");

        let request_duration = register_histogram_vec!(
            "gemini_gateway_request_duration_seconds",
            "Request duration in seconds (time to first byte for streams)",
            &["method", "endpoint", "model"],
            vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]
        )
        .expect("Failed to register request_duration metric");

        let active_requests = register_gauge_vec!(
            "gemini_gateway_active_requests",
            "Number of active requests",
            &["endpoint"]
        )
        .expect("Failed to register active_requests metric");

        let token_usage = register_int_counter_vec!(
            "gemini_gateway_tokens_total",
            "Total number of tokens used",
            &["model", "token_type"]
        )
        .expect("Failed to register token_usage metric");

        let upstream_errors = register_int_counter_vec!(
            "gemini_gateway_upstream_errors_total",
            "Upstream failures by error kind",
            &["error_kind"]
        )
        .expect("Failed to register upstream_errors metric");

        let client_disconnects_total = register_int_counter!(
            "gemini_gateway_client_disconnects_total",
            "Streams cancelled because the caller went away"
        )
        .expect("Failed to register client_disconnects metric");

        let ttft = register_histogram_vec!(
            "gemini_gateway_ttft_seconds",
            "Time to first streamed chunk in seconds",
            &["model"],
            vec![0.05, 0.1, 0.2, 0.5, 1.0, 2.0, 5.0, 10.0]
        )
        .expect("Failed to register ttft metric");

        Metrics {
            request_count,
            request_duration,
            active_requests,
            token_usage,
            upstream_errors,
            client_disconnects_total,
            ttft,
        }
    })
}

/// Get the global metrics instance.
///
/// # Panics
///
/// Panics if metrics have not been initialized via [`init_metrics`].
pub fn get_metrics() -> &'static Metrics {
    METRICS.get().expect("Metrics not initialized")
}

/// Get the global metrics instance if it has been initialized.
pub fn try_get_metrics() -> Option<&'static Metrics> {
    METRICS.get()
}

/// Record prompt/completion/total token counts for a model.
pub fn record_token_usage(model: &str, prompt: u64, completion: u64, total: u64) {
    let Some(metrics) = try_get_metrics() else {
        return;
    };

    metrics
        .token_usage
        .with_label_values(&[model, "prompt"])
        .inc_by(prompt);
    metrics
        .token_usage
        .with_label_values(&[model, "completion"])
        .inc_by(completion);
    metrics
        .token_usage
        .with_label_values(&[model, "total"])
        .inc_by(total);

    tracing::debug!(
        model = %model,
        prompt = prompt,
        completion = completion,
        total = total,
        "Token usage"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization() {
        let metrics = init_metrics();

        metrics
            .request_count
            .with_label_values(&["GET", "/test", "model", "200"])
            .inc();

        // Verify the same instance is returned
        let metrics2 = get_metrics();
        assert!(std::ptr::eq(metrics, metrics2));
        assert!(try_get_metrics().is_some());
    }

    #[test]
    fn test_record_token_usage() {
        let metrics = init_metrics();

        let initial = metrics
            .token_usage
            .with_label_values(&["usage-test-model", "total"])
            .get();

        record_token_usage("usage-test-model", 3, 4, 7);

        let after = metrics
            .token_usage
            .with_label_values(&["usage-test-model", "total"])
            .get();
        assert_eq!(after, initial + 7);
    }

    #[test]
    fn test_upstream_error_counter() {
        let metrics = init_metrics();
        let counter = metrics
            .upstream_errors
            .with_label_values(&["UpstreamTransportError"]);
        let before = counter.get();
        counter.inc();
        assert_eq!(counter.get(), before + 1);
    }
}
