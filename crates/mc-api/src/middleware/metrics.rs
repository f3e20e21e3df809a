//! # Request Metrics
//!
//! Records every request through the `metrics` facade. The Prometheus
//! recorder installed by the binary renders them at `/metrics`; without a
//! recorder the macros are no-ops.
//!
//! Routes are labelled by their matched template (`/v1/jobs`), never by the
//! raw URI, so query strings and ids do not blow up label cardinality.

use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;

pub const REQUESTS_TOTAL: &str = "mc_http_requests_total";
pub const ERRORS_TOTAL: &str = "mc_http_errors_total";
pub const REQUEST_DURATION: &str = "mc_http_request_duration_seconds";

/// Label for requests that matched no route.
const UNMATCHED: &str = "unmatched";

pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| UNMATCHED.to_owned());
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status();
    metrics::counter!(
        REQUESTS_TOTAL,
        "method" => method.clone(),
        "route" => route.clone(),
        "status" => status.as_u16().to_string()
    )
    .increment(1);
    metrics::histogram!(REQUEST_DURATION, "method" => method.clone(), "route" => route.clone())
        .record(start.elapsed().as_secs_f64());
    if status.is_client_error() || status.is_server_error() {
        metrics::counter!(ERRORS_TOTAL, "method" => method, "route" => route).increment(1);
    }

    response
}
