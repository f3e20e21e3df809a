//! # mc-api: Axum API Services for Migrant Care
//!
//! HTTP and WebSocket surface over the job, roster and location stores.
//!
//! ## API Surface
//!
//! | Prefix                   | Module                   | Domain                    |
//! |--------------------------|--------------------------|---------------------------|
//! | `/v1/jobs*`              | [`routes::jobs`]         | Job postings              |
//! | `/v1/locations`          | [`routes::locations`]    | Worker locations          |
//! | `/v1/rosters*`           | [`routes::rosters`]      | Employer rosters          |
//! | `/v1/presence`           | [`routes::presence`]     | Real-time WebSocket       |
//! | `/openapi.json`          | [`openapi`]              | Generated OpenAPI 3.1     |
//! | `/health/*`, `/metrics`  | this module              | Probes and scrape target  |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → AuthMiddleware → Handler
//! ```

pub mod auth;
pub mod db;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;
pub mod visibility;

pub use error::AppError;
pub use state::AppState;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, StatusCode};
use axum::middleware::from_fn;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Router};
use tower_http::trace::TraceLayer;

use mc_state::JobStatus;

use crate::auth::AuthConfig;

/// Request bodies above this are rejected before deserialization.
const BODY_LIMIT_BYTES: usize = 1024 * 1024;

/// Assemble the full application router with all routes and middleware.
///
/// Health probes (`/health/*`) and `/metrics` are mounted outside the auth
/// middleware so they remain accessible without credentials.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
    };
    let metrics_on = state.config.metrics_enabled;

    let mut api = Router::new()
        .merge(routes::jobs::router())
        .merge(routes::locations::router())
        .merge(routes::rosters::router())
        .merge(routes::presence::router())
        .merge(openapi::router())
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(from_fn(auth::auth_middleware));

    if metrics_on {
        api = api.layer(from_fn(middleware::metrics::metrics_middleware));
    }

    let api = api
        .layer(TraceLayer::new_for_http())
        .layer(Extension(auth_config))
        .with_state(state.clone());

    let mut unauthenticated = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness));

    if metrics_on {
        unauthenticated = unauthenticated.route("/metrics", get(prometheus_metrics));
    }

    Router::new()
        .merge(unauthenticated.with_state(state))
        .merge(api)
}

/// GET /metrics: Prometheus scrape endpoint.
///
/// Refreshes the store gauges from `AppState` on each scrape, then renders
/// everything the installed recorder holds.
async fn prometheus_metrics(State(state): State<AppState>) -> Response {
    let Some(handle) = &state.metrics else {
        return (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response();
    };

    for status in [JobStatus::Pending, JobStatus::Done] {
        let count = state.jobs.filter(|job| job.status == status).len();
        metrics::gauge!("mc_jobs", "status" => status.as_str()).set(count as f64);
    }
    metrics::gauge!("mc_rosters").set(state.rosters.len() as f64);

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        handle.render(),
    )
        .into_response()
}

/// Liveness probe. Always 200 while the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe.
///
/// Checks the location cache and, when configured, the database. Returns
/// 200 "ready" or 503 naming the dependency that failed.
async fn readiness(State(state): State<AppState>) -> Response {
    if let Err(e) = state.locations.ping().await {
        tracing::warn!(backend = state.locations.backend(), error = %e, "location store health check failed");
        return (StatusCode::SERVICE_UNAVAILABLE, "location store unreachable").into_response();
    }

    if let Some(pool) = &state.db_pool {
        if let Err(e) = db::ping(pool).await {
            tracing::warn!(error = %e, "database health check failed");
            return (StatusCode::SERVICE_UNAVAILABLE, "database unreachable").into_response();
        }
    }

    (StatusCode::OK, "ready").into_response()
}
