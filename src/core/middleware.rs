//! HTTP middleware for request tracking and metrics.
//!
//! This module provides middleware that assigns every request an ID and
//! tracks request metrics including duration, active requests, and status
//! codes.

use crate::core::logging::{generate_request_id, REQUEST_ID};
use crate::core::metrics::get_metrics;
use axum::{
    extract::{MatchedPath, Request},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use std::time::Instant;

/// Header carrying the request ID in both directions.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest inbound request ID that is reused verbatim.
const MAX_INBOUND_REQUEST_ID_LEN: usize = 128;

/// Extension type for storing model name in response
#[derive(Clone, Debug)]
pub struct ModelName(pub String);

/// Pick the request ID for an incoming request.
///
/// A well-formed inbound `x-request-id` is reused, otherwise a fresh UUID is
/// generated.
fn resolve_request_id(request: &Request) -> String {
    request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| {
            !id.is_empty()
                && id.len() <= MAX_INBOUND_REQUEST_ID_LEN
                && id
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        })
        .map(str::to_string)
        .unwrap_or_else(generate_request_id)
}

/// Assign a request ID, run the rest of the stack inside its task-local scope
/// and echo it back in the `x-request-id` response header.
pub async fn request_id_middleware(request: Request, next: Next) -> Response {
    let request_id = resolve_request_id(&request);

    let mut response = REQUEST_ID
        .scope(request_id.clone(), async move { next.run(request).await })
        .await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}

/// Decrements the active-request gauge when dropped, including when the
/// request future is dropped because the caller went away.
struct ActiveRequestGuard {
    gauge: prometheus::Gauge,
}

impl ActiveRequestGuard {
    fn new(gauge: prometheus::Gauge) -> Self {
        gauge.inc();
        Self { gauge }
    }
}

impl Drop for ActiveRequestGuard {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}

/// Middleware for tracking request metrics.
pub struct MetricsMiddleware;

impl MetricsMiddleware {
    /// Track metrics for incoming requests.
    ///
    /// This middleware:
    /// - Tracks active requests for as long as the request future lives
    /// - Measures request duration
    /// - Records request count by status code
    /// - Logs request details
    pub async fn track_metrics(request: Request, next: Next) -> Response {
        // Label by route template so unknown paths do not explode cardinality
        let endpoint = request
            .extensions()
            .get::<MatchedPath>()
            .map(|p| p.as_str().to_string())
            .unwrap_or_else(|| "unmatched".to_string());
        let method = request.method().to_string();

        // Skip metrics endpoint itself to avoid recursion
        if endpoint == "/metrics" {
            return next.run(request).await;
        }

        let metrics = get_metrics();

        let _active = ActiveRequestGuard::new(
            metrics.active_requests.with_label_values(&[&endpoint]),
        );

        let start = Instant::now();

        let response = next.run(request).await;

        let duration = start.elapsed().as_secs_f64();
        let status_code = response.status().as_u16().to_string();

        // Model is set by the generation handlers
        let model = response
            .extensions()
            .get::<ModelName>()
            .map(|m| m.0.as_str())
            .unwrap_or("unknown");

        metrics
            .request_count
            .with_label_values(&[&method, &endpoint, model, &status_code])
            .inc();

        metrics
            .request_duration
            .with_label_values(&[&method, &endpoint, model])
            .observe(duration);

        let is_streaming = response
            .headers()
            .get(axum::http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("text/event-stream"))
            .unwrap_or(false);

        // For streaming responses, duration is actually TTFB (time to first byte)
        // since next.run() returns when headers are ready, not when body is complete
        if is_streaming {
            tracing::info!(
                "{} {} - status={} model={} ttfb={:.3}s",
                method,
                endpoint,
                status_code,
                model,
                duration
            );
        } else {
            tracing::info!(
                "{} {} - status={} model={} duration={:.3}s",
                method,
                endpoint,
                status_code,
                model,
                duration
            );
        }

        response
    }
}
