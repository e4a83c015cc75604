//! Prometheus metrics for CloudTunes.
//!
//! Installs a global Prometheus recorder using `metrics-exporter-prometheus`,
//! defines metric name constants, provides an axum middleware for HTTP RED
//! metrics, and exposes the `/metrics` endpoint handler.

use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

// -- Metric name constants ----------------------------------------------------

/// Total HTTP requests (counter). Labels: method, path, status.
pub const HTTP_REQUESTS_TOTAL: &str = "cloudtunes_http_requests_total";

/// HTTP request duration in seconds (histogram). Labels: method, path.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "cloudtunes_http_request_duration_seconds";

/// Cover-art extraction attempts (counter). Labels: outcome.
pub const THUMBNAILS_TOTAL: &str = "cloudtunes_thumbnails_total";

/// Proxied streams by upstream status (counter). Labels: status.
pub const PROXY_STREAMS_TOTAL: &str = "cloudtunes_proxy_streams_total";

/// Outcome of one cover-art extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbnailOutcome {
    /// A picture was found.
    Found,
    /// The file parsed (or failed to) and has no usable picture.
    Absent,
    /// The leading byte range could not be fetched.
    FetchFailed,
}

impl ThumbnailOutcome {
    fn label(self) -> &'static str {
        match self {
            ThumbnailOutcome::Found => "found",
            ThumbnailOutcome::Absent => "absent",
            ThumbnailOutcome::FetchFailed => "fetch_failed",
        }
    }
}

// -- Global recorder installation ---------------------------------------------

/// Singleton handle to the Prometheus recorder.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus metrics recorder. Idempotent.
pub fn init_metrics() -> anyhow::Result<&'static PrometheusHandle> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle);
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {e}"))?;
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle))
}

/// Register metric descriptions with the global recorder.
pub fn describe_metrics() {
    describe_counter!(HTTP_REQUESTS_TOTAL, "Total HTTP requests");
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_counter!(THUMBNAILS_TOTAL, "Cover art extraction attempts by outcome");
    describe_counter!(PROXY_STREAMS_TOTAL, "Proxied audio streams by upstream status");
}

/// Count one cover-art extraction.
pub fn record_thumbnail(outcome: ThumbnailOutcome) {
    counter!(THUMBNAILS_TOTAL, "outcome" => outcome.label()).increment(1);
}

/// Count one proxied stream.
pub fn record_proxy_stream(status: StatusCode) {
    counter!(PROXY_STREAMS_TOTAL, "status" => status.as_u16().to_string()).increment(1);
}

// -- Metrics middleware -------------------------------------------------------

/// Axum middleware that records HTTP RED metrics for every request.
///
/// For streamed responses the duration covers time to headers, not the
/// whole body.
pub async fn metrics_middleware(
    req: Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Response {
    if req.uri().path() == "/metrics" {
        return next.run(req).await;
    }

    let method = req.method().to_string();
    let path = normalize_path(req.uri().path());

    let start = Instant::now();
    let response = next.run(req).await;
    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path, "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

// -- Path normalization -------------------------------------------------------

/// Normalize a request path to a route template for metric labels, so
/// file ids do not explode label cardinality.
fn normalize_path(path: &str) -> &'static str {
    match path {
        "/api/music" => "/api/music",
        "/proxy" => "/proxy",
        "/health" => "/health",
        "/openapi.json" => "/openapi.json",
        p if p.starts_with("/thumbnail/") => "/thumbnail/{fileId}",
        _ => "other",
    }
}

// -- Metrics endpoint handler -------------------------------------------------

/// `GET /metrics` -- Render Prometheus exposition format text.
pub async fn metrics_handler() -> Response {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}

// -- Tests --------------------------------------------------------------------
