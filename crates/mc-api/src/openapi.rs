//! # OpenAPI Specification Assembly
//!
//! Collects every utoipa-documented route into one OpenAPI 3.1 document,
//! served at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::state::AppState;

/// Adds the service bearer token scheme.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .description(Some(
                            "Static service token. Set via the AUTH_TOKEN env var; unset disables the check.",
                        ))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Migrant Care API",
        version = "0.1.0",
        description = "Job postings, employer rosters and live worker locations for the Migrant Care map.\n\nCaller identity is supplied by the session layer in the `x-caller-email` and `x-caller-role` headers. When a service token is configured, every `/v1/*` route also requires `Authorization: Bearer <token>`. Health probes (`/health/*`) and `/metrics` are unauthenticated.",
        license(name = "AGPL-3.0-or-later")
    ),
    servers(
        (url = "http://localhost:3000", description = "Local development server"),
    ),
    security(
        ("bearer_auth" = [])
    ),
    paths(
        // ── Jobs ─────────────────────────────────────────────────────────
        crate::routes::jobs::list_jobs,
        crate::routes::jobs::list_all_jobs,
        crate::routes::jobs::post_job,
        crate::routes::jobs::edit_job,
        crate::routes::jobs::delete_job,
        crate::routes::jobs::mark_job_done,
        // ── Locations ────────────────────────────────────────────────────
        crate::routes::locations::employee_location,
        // ── Rosters ──────────────────────────────────────────────────────
        crate::routes::rosters::get_roster,
        crate::routes::rosters::save_roster,
        crate::routes::rosters::remove_worker,
        crate::routes::rosters::roster_locations,
        // ── Presence ─────────────────────────────────────────────────────
        crate::routes::presence::presence_socket,
    ),
    components(
        schemas(
            crate::state::JobPosting,
            crate::state::EmployerRoster,
            crate::error::ErrorBody,
            crate::error::ErrorDetail,
            crate::routes::jobs::PostJobRequest,
            crate::routes::jobs::EditJobRequest,
            crate::routes::jobs::UpdatedCount,
            crate::routes::jobs::DeletedCount,
            crate::routes::locations::LocationResponse,
            crate::routes::rosters::SaveRosterRequest,
            crate::visibility::RosterLocation,
        ),
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "jobs", description = "Job postings and their Pending → Done lifecycle"),
        (name = "locations", description = "Last known worker locations from the location cache"),
        (name = "rosters", description = "Employer worker rosters and their resolved locations"),
        (name = "presence", description = "Real-time location channel over WebSocket"),
    )
)]
pub struct ApiDoc;

pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

/// GET /openapi.json: Return the generated OpenAPI specification.
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
