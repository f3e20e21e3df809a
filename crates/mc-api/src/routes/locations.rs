//! # Worker Locations API
//!
//! Routes:
//! - GET /v1/locations?email=: Last known location of one worker

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use mc_core::Identity;
use mc_presence::LocationRecord;

use crate::error::AppError;
use crate::extractors::extract_query;
use crate::routes::EmailQuery;
use crate::state::AppState;

/// A worker's last reported position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LocationResponse {
    pub latitude: f64,
    pub longitude: f64,
    pub recorded_at: chrono::DateTime<chrono::Utc>,
}

impl From<LocationRecord> for LocationResponse {
    fn from(record: LocationRecord) -> Self {
        Self {
            latitude: record.coordinate.latitude(),
            longitude: record.coordinate.longitude(),
            recorded_at: *record.recorded_at.as_datetime(),
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/locations", get(employee_location))
}

/// GET /v1/locations?email=: Last known location of one worker.
#[utoipa::path(
    get,
    path = "/v1/locations",
    params(EmailQuery),
    responses(
        (status = 200, description = "Location found", body = LocationResponse),
        (status = 404, description = "Never reported, expired or stale", body = crate::error::ErrorBody),
        (status = 503, description = "Location cache unreachable", body = crate::error::ErrorBody),
    ),
    tag = "locations"
)]
pub async fn employee_location(
    State(state): State<AppState>,
    query: Result<Query<EmailQuery>, QueryRejection>,
) -> Result<Json<LocationResponse>, AppError> {
    let query = extract_query(query)?;
    let email = query
        .email
        .ok_or_else(|| AppError::BadRequest("email query parameter is required".into()))?;
    let worker = Identity::new(email)?;
    let record = state.visibility.employee_location(&worker).await?;
    Ok(Json(record.into()))
}
