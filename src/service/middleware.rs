//! Service middleware for correlation IDs, access logs and request metrics.
//!
//! [`correlation_middleware`] resolves one correlation ID per request, runs
//! the request inside a span carrying it, writes an access log line under the
//! `follower_diff::access` target and echoes the ID in `X-Request-Id`.
//! Error bodies built by the route handlers carry the same ID.
//!
//! ## Metrics Logged
//!
//! - `request` - path pattern, method, status and latency of every request
//! - `import` - size of each committed import's diff
//! - `import_failure` - failure bucket of each rejected import
//!
//! Everything goes through `tracing` under the `follower_diff::metrics`
//! target, so log-based metrics can aggregate it.

use axum::{
    extract::Request,
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use regex_lite::Regex;
use std::sync::OnceLock;
use std::time::Instant;
use tracing::{info, info_span, Instrument};

use crate::importer::ImportReport;

/// Header carrying the correlation ID on requests and responses.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Google Cloud load balancer trace header, `TRACE_ID/SPAN_ID;o=1`.
const CLOUD_TRACE_HEADER: &str = "x-cloud-trace-context";

/// Correlation ID of a request.
///
/// The trace part of `X-Cloud-Trace-Context` wins, then `X-Request-Id`;
/// a fresh UUID otherwise.
pub fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(CLOUD_TRACE_HEADER)
        .or_else(|| headers.get(REQUEST_ID_HEADER))
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split('/').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

/// Pin a correlation ID on the request, log it and echo it on the response.
pub async fn correlation_middleware(mut request: Request, next: Next) -> Response {
    let start = Instant::now();
    let id = correlation_id(request.headers());
    let header = HeaderValue::from_str(&id).ok();

    // Handlers read the ID back from the request, so a generated one must stick.
    if let Some(value) = &header {
        request.headers_mut().insert(REQUEST_ID_HEADER, value.clone());
    }

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let span = info_span!(
        "request",
        correlation_id = %id,
        method = %method,
        path = %path,
        status = tracing::field::Empty,
    );

    let mut response = next.run(request).instrument(span.clone()).await;

    let status = response.status().as_u16();
    span.record("status", status);
    info!(
        target: "follower_diff::access",
        correlation_id = %id,
        method = %method,
        path = %path,
        status = status,
        latency_ms = start.elapsed().as_millis() as u64,
        "request completed"
    );

    if let Some(value) = header {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Metrics middleware that records request counts and latency.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = normalize_path(request.uri().path());

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status().as_u16();

    info!(
        target: "follower_diff::metrics",
        metric_type = "request",
        path = %path,
        method = %method,
        status = status,
        latency_ms = latency.as_millis() as u64,
        "request_metric"
    );

    response
}

/// Normalize path for metrics to avoid high cardinality.
///
/// Replaces account and import UUIDs with a placeholder.
fn normalize_path(path: &str) -> String {
    static UUID: OnceLock<Regex> = OnceLock::new();
    let uuid = UUID.get_or_init(|| {
        Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
            .expect("valid uuid pattern")
    });

    uuid.replace_all(path, ":id").to_string()
}

/// Record a committed import.
pub fn record_import_metrics(report: &ImportReport, latency_ms: u64) {
    info!(
        target: "follower_diff::metrics",
        metric_type = "import",
        source_kind = %report.source_kind,
        current = report.current_count,
        entered = report.entered.len(),
        left = report.left.len(),
        degraded = report.degraded,
        latency_ms = latency_ms,
        "import_metric"
    );
}

/// Record a rejected import by its error code.
pub fn record_import_failure(code: &str) {
    info!(
        target: "follower_diff::metrics",
        metric_type = "import_failure",
        code = code,
        "import_failure_metric"
    );
}
