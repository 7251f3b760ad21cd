//! Prometheus metrics for DCAuth
//!
//! Exposes metrics at `/metrics` endpoint in Prometheus format. Recording
//! goes through the `metrics` facade and is a no-op until a recorder is
//! installed.

use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dcauth_auth::ldap::{AttemptRecord, AuthReport};
use dcauth_core::{Error, Result};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::server::AppState;

/// Metric names
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "dcauth_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "dcauth_http_request_duration_seconds";

    // Authentication metrics
    pub const AUTH_OUTCOMES_TOTAL: &str = "dcauth_auth_outcomes_total";
    pub const AUTH_DURATION_SECONDS: &str = "dcauth_auth_duration_seconds";
    pub const BIND_ATTEMPTS_TOTAL: &str = "dcauth_bind_attempts_total";
    pub const BIND_ESCALATIONS_TOTAL: &str = "dcauth_bind_escalations_total";

    // System metrics
    pub const UPTIME_SECONDS: &str = "dcauth_uptime_seconds";
    pub const INFO: &str = "dcauth_info";
}

/// Route label for requests that matched no route
pub const UNMATCHED_ROUTE: &str = "unmatched";

/// Metrics recorder
#[derive(Clone)]
pub struct MetricsRecorder {
    handle: PrometheusHandle,
    start_time: Instant,
}

impl MetricsRecorder {
    /// Install the Prometheus recorder as the global `metrics` recorder
    ///
    /// Fails if another recorder is already installed.
    pub fn install() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| Error::InternalError(format!("failed to install metrics recorder: {}", e)))?;

        gauge!(names::INFO, "version" => dcauth_core::VERSION).set(1.0);

        Ok(Self {
            handle,
            start_time: Instant::now(),
        })
    }

    /// Get metrics output in Prometheus format
    pub fn render(&self) -> String {
        gauge!(names::UPTIME_SECONDS).set(self.start_time.elapsed().as_secs_f64());

        self.handle.render()
    }
}

/// Record an HTTP request
///
/// `route` must be a route template or [`UNMATCHED_ROUTE`], never a raw
/// request path.
pub fn record_http_request(method: &str, route: &str, status: u16, duration_secs: f64) {
    let status_class = format!("{}xx", status / 100);

    counter!(
        names::HTTP_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "route" => route.to_string(),
        "status" => status.to_string(),
        "status_class" => status_class
    )
    .increment(1);

    histogram!(
        names::HTTP_REQUEST_DURATION_SECONDS,
        "method" => method.to_string(),
        "route" => route.to_string()
    )
    .record(duration_secs);
}

/// Record the outcome of one run of the bind ladder
pub fn record_authentication(report: &AuthReport, duration: Duration) {
    let outcome = report.outcome.as_str();

    counter!(names::AUTH_OUTCOMES_TOTAL, "outcome" => outcome).increment(1);
    histogram!(names::AUTH_DURATION_SECONDS, "outcome" => outcome).record(duration.as_secs_f64());

    for attempt in &report.attempts {
        record_bind_attempt(attempt);
    }
}

fn record_bind_attempt(attempt: &AttemptRecord) {
    let result = attempt.failure.map(|f| f.as_str()).unwrap_or("success");

    counter!(
        names::BIND_ATTEMPTS_TOTAL,
        "transport" => attempt.spec.transport.as_str(),
        "mechanism" => attempt.spec.mechanism.as_str(),
        "result" => result
    )
    .increment(1);

    if attempt.failure.is_some_and(|f| f.is_escalatable()) {
        counter!(names::BIND_ESCALATIONS_TOTAL, "step" => attempt.step.to_string()).increment(1);
    }
}

/// Axum middleware for recording HTTP metrics
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let route = route_label(request.extensions().get::<MatchedPath>()).to_string();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16();

    record_http_request(&method, &route, status, duration);

    debug!(
        method = %method,
        path = %path,
        route = %route,
        status = %status,
        duration_ms = %(duration * 1000.0),
        "Request completed"
    );

    response
}

fn route_label(matched: Option<&MatchedPath>) -> &str {
    matched.map(MatchedPath::as_str).unwrap_or(UNMATCHED_ROUTE)
}

/// Handler for /metrics endpoint
pub async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(metrics) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            metrics.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}
