//! # Employer Rosters API
//!
//! Routes:
//! - GET    /v1/rosters?email=: Roster document (defaults to the caller's)
//! - PUT    /v1/rosters: Replace the caller's roster
//! - DELETE /v1/rosters/workers?worker=: Remove one worker from the caller's roster
//! - GET    /v1/rosters/locations?email=: Roster members with their last known locations

use std::collections::HashSet;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::routing::{delete, get};
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use mc_core::Identity;

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::extractors::{extract_query, extract_validated_json, Validate};
use crate::routes::{roster_target, EmailQuery};
use crate::state::{AppState, EmployerRoster, RosterEntry};
use crate::visibility::RosterLocation;

const MAX_ROSTER_SIZE: usize = 1_000;

#[derive(Debug, Deserialize, ToSchema)]
pub struct SaveRosterRequest {
    /// Ordered roster entries. Each needs a `worker` email; other fields are kept as given.
    #[schema(value_type = Vec<Object>)]
    pub workers: Vec<RosterEntry>,
}

impl Validate for SaveRosterRequest {
    fn validate(&self) -> Result<(), String> {
        if self.workers.len() > MAX_ROSTER_SIZE {
            return Err(format!(
                "a roster may hold at most {MAX_ROSTER_SIZE} workers"
            ));
        }
        let mut seen = HashSet::with_capacity(self.workers.len());
        if let Some(dup) = self.workers.iter().find(|e| !seen.insert(&e.worker)) {
            return Err(format!("worker {} appears more than once", dup.worker));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct WorkerQuery {
    /// Worker identity to remove.
    pub worker: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/rosters", get(get_roster).put(save_roster))
        .route("/v1/rosters/workers", delete(remove_worker))
        .route("/v1/rosters/locations", get(roster_locations))
}

/// GET /v1/rosters?email=: Fetch a roster.
#[utoipa::path(
    get,
    path = "/v1/rosters",
    params(EmailQuery),
    responses(
        (status = 200, description = "Roster found", body = EmployerRoster),
        (status = 403, description = "Another employer's roster", body = crate::error::ErrorBody),
        (status = 404, description = "No roster saved", body = crate::error::ErrorBody),
    ),
    tag = "rosters"
)]
pub async fn get_roster(
    State(state): State<AppState>,
    caller: CallerIdentity,
    query: Result<Query<EmailQuery>, QueryRejection>,
) -> Result<Json<EmployerRoster>, AppError> {
    let query = extract_query(query)?;
    let employer = roster_target(&caller, query.email.as_deref())?;
    Ok(Json(state.visibility.roster(&employer)?))
}

/// PUT /v1/rosters: Replace the caller's roster wholesale.
#[utoipa::path(
    put,
    path = "/v1/rosters",
    request_body = SaveRosterRequest,
    responses(
        (status = 200, description = "Roster saved", body = EmployerRoster),
        (status = 403, description = "Caller is not an employer", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "rosters"
)]
pub async fn save_roster(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<SaveRosterRequest>, JsonRejection>,
) -> Result<Json<EmployerRoster>, AppError> {
    let req = extract_validated_json(body)?;
    Ok(Json(state.visibility.save_roster(&caller, req.workers).await?))
}

/// DELETE /v1/rosters/workers?worker=: Remove a worker from the caller's roster.
#[utoipa::path(
    delete,
    path = "/v1/rosters/workers",
    params(WorkerQuery),
    responses(
        (status = 200, description = "Updated roster", body = EmployerRoster),
        (status = 404, description = "No roster saved", body = crate::error::ErrorBody),
    ),
    tag = "rosters"
)]
pub async fn remove_worker(
    State(state): State<AppState>,
    caller: CallerIdentity,
    query: Result<Query<WorkerQuery>, QueryRejection>,
) -> Result<Json<EmployerRoster>, AppError> {
    let WorkerQuery { worker } = extract_query(query)?;
    let worker = Identity::new(worker)?;
    Ok(Json(
        state.visibility.remove_roster_worker(&caller, &worker).await?,
    ))
}

/// GET /v1/rosters/locations?email=: Resolve every roster member's location.
///
/// Members with no usable location are returned with `location: null`.
#[utoipa::path(
    get,
    path = "/v1/rosters/locations",
    params(EmailQuery),
    responses(
        (status = 200, description = "One entry per roster member", body = Vec<RosterLocation>),
        (status = 404, description = "No roster saved", body = crate::error::ErrorBody),
        (status = 503, description = "Location cache unreachable", body = crate::error::ErrorBody),
    ),
    tag = "rosters"
)]
pub async fn roster_locations(
    State(state): State<AppState>,
    caller: CallerIdentity,
    query: Result<Query<EmailQuery>, QueryRejection>,
) -> Result<Json<Vec<RosterLocation>>, AppError> {
    let query = extract_query(query)?;
    let employer = roster_target(&caller, query.email.as_deref())?;
    Ok(Json(state.visibility.roster_locations(&employer).await?))
}
