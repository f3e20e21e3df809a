//! # Job Postings API
//!
//! Routes:
//! - GET    /v1/jobs?category=&status=&limit=&offset=: Filtered postings (default `Pending`)
//! - GET    /v1/jobs/all: Every posting, any status
//! - POST   /v1/jobs: Post a job (employer or admin)
//! - PUT    /v1/jobs: Edit title, description, tags and salary
//! - DELETE /v1/jobs?id=: Delete a posting (owner or admin)
//! - PUT    /v1/jobs/done?id=: Mark a posting `Done`

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use mc_core::{Coordinate, JobId};
use mc_state::JobStatus;

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::extractors::{extract_query, extract_validated_json, Validate};
use crate::state::{AppState, JobPosting};
use crate::visibility::{JobEdit, JobFilter, NewJob, Page};

const MAX_TITLE_LEN: usize = 255;
const MAX_DESCRIPTION_LEN: usize = 10_000;
const MAX_TAGS: usize = 32;
const MAX_TAG_LEN: usize = 64;

// ── DTOs ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct PostJobRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub salary: String,
}

impl Validate for PostJobRequest {
    fn validate(&self) -> Result<(), String> {
        validate_details(&self.title, &self.description, &self.tags)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EditJobRequest {
    #[schema(value_type = String, format = Uuid)]
    pub id: JobId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub salary: String,
}

impl Validate for EditJobRequest {
    fn validate(&self) -> Result<(), String> {
        validate_details(&self.title, &self.description, &self.tags)
    }
}

fn validate_details(title: &str, description: &str, tags: &[String]) -> Result<(), String> {
    if title.trim().is_empty() {
        return Err("title must not be empty".to_string());
    }
    if title.len() > MAX_TITLE_LEN {
        return Err(format!("title must not exceed {MAX_TITLE_LEN} characters"));
    }
    if description.len() > MAX_DESCRIPTION_LEN {
        return Err(format!(
            "description must not exceed {MAX_DESCRIPTION_LEN} characters"
        ));
    }
    if tags.len() > MAX_TAGS {
        return Err(format!("at most {MAX_TAGS} tags are allowed"));
    }
    if tags.iter().any(|t| t.trim().is_empty() || t.len() > MAX_TAG_LEN) {
        return Err(format!(
            "tags must be non-empty and at most {MAX_TAG_LEN} characters"
        ));
    }
    Ok(())
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListJobsQuery {
    /// Tag to match, or `all`. Empty means `all`.
    pub category: Option<String>,
    /// `Pending` (default, also when empty) or `Done`.
    pub status: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// `?status=` and `?category=` sent empty mean "not given".
fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl From<&PageQuery> for Page {
    fn from(q: &PageQuery) -> Self {
        Page {
            offset: q.offset.unwrap_or(0),
            limit: q.limit,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct JobIdQuery {
    #[param(value_type = String, format = Uuid)]
    pub id: JobId,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdatedCount {
    pub updated: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeletedCount {
    pub deleted: u64,
}

// ── Router ──────────────────────────────────────────────────────────────────

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/jobs",
            get(list_jobs)
                .post(post_job)
                .put(edit_job)
                .delete(delete_job),
        )
        .route("/v1/jobs/all", get(list_all_jobs))
        .route("/v1/jobs/done", put(mark_job_done))
}

// ── Handlers ────────────────────────────────────────────────────────────────

/// GET /v1/jobs: Postings filtered by status and category.
#[utoipa::path(
    get,
    path = "/v1/jobs",
    params(ListJobsQuery),
    responses(
        (status = 200, description = "Matching postings, oldest first", body = Vec<JobPosting>),
        (status = 422, description = "Unknown status", body = crate::error::ErrorBody),
    ),
    tag = "jobs"
)]
pub async fn list_jobs(
    State(state): State<AppState>,
    query: Result<Query<ListJobsQuery>, QueryRejection>,
) -> Result<Json<Vec<JobPosting>>, AppError> {
    let query = extract_query(query)?;
    let status = non_blank(query.status)
        .as_deref()
        .map(str::parse::<JobStatus>)
        .transpose()?;
    let filter = JobFilter {
        status,
        category: non_blank(query.category),
        page: Page {
            offset: query.offset.unwrap_or(0),
            limit: query.limit,
        },
    };
    Ok(Json(state.visibility.list_jobs(&filter)))
}

/// GET /v1/jobs/all: Every posting regardless of status.
#[utoipa::path(
    get,
    path = "/v1/jobs/all",
    params(PageQuery),
    responses(
        (status = 200, description = "All postings, oldest first", body = Vec<JobPosting>),
    ),
    tag = "jobs"
)]
pub async fn list_all_jobs(
    State(state): State<AppState>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Json<Vec<JobPosting>>, AppError> {
    let query = extract_query(query)?;
    Ok(Json(state.visibility.list_all_jobs(Page::from(&query))))
}

/// POST /v1/jobs: Post a new job.
#[utoipa::path(
    post,
    path = "/v1/jobs",
    request_body = PostJobRequest,
    responses(
        (status = 201, description = "Job posted", body = JobPosting),
        (status = 403, description = "Caller is not an employer", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "jobs"
)]
pub async fn post_job(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<PostJobRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<JobPosting>), AppError> {
    let req = extract_validated_json(body)?;
    let new = NewJob {
        coordinate: Coordinate::new(req.latitude, req.longitude)?,
        title: req.title,
        description: req.description,
        tags: req.tags,
        salary: req.salary,
    };
    let job = state.visibility.post_job(&caller, new).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

/// PUT /v1/jobs: Edit a posting's details.
#[utoipa::path(
    put,
    path = "/v1/jobs",
    request_body = EditJobRequest,
    responses(
        (status = 200, description = "Job updated", body = UpdatedCount),
        (status = 403, description = "Not the owner", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "jobs"
)]
pub async fn edit_job(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<EditJobRequest>, JsonRejection>,
) -> Result<Json<UpdatedCount>, AppError> {
    let req = extract_validated_json(body)?;
    let edit = JobEdit {
        id: req.id,
        title: req.title,
        description: req.description,
        tags: req.tags,
        salary: req.salary,
    };
    state.visibility.edit_job(&caller, edit).await?;
    Ok(Json(UpdatedCount { updated: 1 }))
}

/// DELETE /v1/jobs?id=: Delete a posting.
#[utoipa::path(
    delete,
    path = "/v1/jobs",
    params(JobIdQuery),
    responses(
        (status = 200, description = "Job deleted", body = DeletedCount),
        (status = 403, description = "Not the owner", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "jobs"
)]
pub async fn delete_job(
    State(state): State<AppState>,
    caller: CallerIdentity,
    query: Result<Query<JobIdQuery>, QueryRejection>,
) -> Result<Json<DeletedCount>, AppError> {
    let JobIdQuery { id } = extract_query(query)?;
    state.visibility.delete_job(&caller, id).await?;
    Ok(Json(DeletedCount { deleted: 1 }))
}

/// PUT /v1/jobs/done?id=: Mark a pending posting as done.
#[utoipa::path(
    put,
    path = "/v1/jobs/done",
    params(JobIdQuery),
    responses(
        (status = 200, description = "Job marked done", body = UpdatedCount),
        (status = 403, description = "Not the owner", body = crate::error::ErrorBody),
        (status = 404, description = "Not found or already done", body = crate::error::ErrorBody),
    ),
    tag = "jobs"
)]
pub async fn mark_job_done(
    State(state): State<AppState>,
    caller: CallerIdentity,
    query: Result<Query<JobIdQuery>, QueryRejection>,
) -> Result<Json<UpdatedCount>, AppError> {
    let JobIdQuery { id } = extract_query(query)?;
    state.visibility.mark_done(&caller, id).await?;
    Ok(Json(UpdatedCount { updated: 1 }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(title: &str, tags: &[&str]) -> PostJobRequest {
        PostJobRequest {
            title: title.to_string(),
            description: String::new(),
            latitude: 13.08,
            longitude: 80.27,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            salary: "500".to_string(),
        }
    }

    #[test]
    fn post_job_request_requires_title() {
        assert!(post("Harvest", &["farming"]).validate().is_ok());
        assert!(post("  ", &[]).validate().is_err());
        assert!(post(&"x".repeat(256), &[]).validate().is_err());
    }

    #[test]
    fn post_job_request_bounds_tags() {
        assert!(post("Harvest", &[""]).validate().is_err());
        let many: Vec<String> = (0..33).map(|i| format!("t{i}")).collect();
        let refs: Vec<&str> = many.iter().map(String::as_str).collect();
        assert!(post("Harvest", &refs).validate().is_err());
    }

    #[test]
    fn post_job_request_defaults_optional_fields() {
        let req: PostJobRequest =
            serde_json::from_str(r#"{"title":"Harvest","latitude":1.0,"longitude":2.0}"#).unwrap();
        assert!(req.tags.is_empty());
        assert!(req.description.is_empty());
        assert!(req.salary.is_empty());
    }

    #[test]
    fn blank_filter_values_count_as_absent() {
        assert_eq!(non_blank(Some(String::new())), None);
        assert_eq!(non_blank(Some("  ".to_string())), None);
        assert_eq!(non_blank(None), None);
        assert_eq!(non_blank(Some("farming".to_string())), Some("farming".to_string()));
    }

    #[test]
    fn page_query_defaults_offset() {
        let page = Page::from(&PageQuery {
            limit: Some(5),
            offset: None,
        });
        assert_eq!(page, Page { offset: 0, limit: Some(5) });
    }
}
