//! Job posting persistence operations.
//!
//! All functions take a `&PgPool` and operate on the `jobs` table.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use mc_core::{Coordinate, Identity, JobId, Timestamp};
use mc_state::JobStatus;

use crate::state::JobPosting;

/// Insert a new job posting.
pub async fn insert(pool: &PgPool, job: &JobPosting) -> Result<(), sqlx::Error> {
    let coordinate = job.location.coordinate();
    sqlx::query(
        "INSERT INTO jobs (id, title, description, latitude, longitude, tags, salary,
         status, posted_by, posted_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(*job.id.as_uuid())
    .bind(&job.title)
    .bind(&job.description)
    .bind(coordinate.latitude())
    .bind(coordinate.longitude())
    .bind(&job.tags)
    .bind(&job.salary)
    .bind(job.status.as_str())
    .bind(job.posted_by.as_str())
    .bind(*job.posted_at.as_datetime())
    .execute(pool)
    .await?;

    Ok(())
}

/// Overwrite the editable fields. Returns `false` if no row matched.
pub async fn update_details(pool: &PgPool, job: &JobPosting) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE jobs SET title = $1, description = $2, tags = $3, salary = $4 WHERE id = $5",
    )
    .bind(&job.title)
    .bind(&job.description)
    .bind(&job.tags)
    .bind(&job.salary)
    .bind(*job.id.as_uuid())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Move a job from `from` to `to`. Returns `false` if the row was not in
/// `from`, which makes a repeated mark-done a no-op.
pub async fn update_status(
    pool: &PgPool,
    id: JobId,
    from: JobStatus,
    to: JobStatus,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE jobs SET status = $1 WHERE id = $2 AND status = $3")
        .bind(to.as_str())
        .bind(*id.as_uuid())
        .bind(from.as_str())
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Returns `false` if no row matched.
pub async fn delete(pool: &PgPool, id: JobId) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM jobs WHERE id = $1")
        .bind(*id.as_uuid())
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Load all job postings into the in-memory store on startup.
pub async fn load_all(pool: &PgPool) -> Result<Vec<JobPosting>, sqlx::Error> {
    let rows = sqlx::query_as::<_, JobRow>(
        "SELECT id, title, description, latitude, longitude, tags, salary,
         status, posted_by, posted_at
         FROM jobs ORDER BY posted_at",
    )
    .fetch_all(pool)
    .await?;

    let mut jobs = Vec::with_capacity(rows.len());
    for row in rows {
        if let Some(job) = row.into_record() {
            jobs.push(job);
        }
    }
    Ok(jobs)
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    title: String,
    description: String,
    latitude: f64,
    longitude: f64,
    tags: Vec<String>,
    salary: String,
    status: String,
    posted_by: String,
    posted_at: DateTime<Utc>,
}

impl JobRow {
    fn into_record(self) -> Option<JobPosting> {
        let location = match Coordinate::new(self.latitude, self.longitude) {
            Ok(c) => c.into(),
            Err(e) => {
                tracing::warn!(id = %self.id, error = %e, "skipping job row with invalid location");
                return None;
            }
        };
        let posted_by = match Identity::new(&self.posted_by) {
            Ok(identity) => identity,
            Err(e) => {
                tracing::warn!(id = %self.id, error = %e, "skipping job row with invalid posted_by");
                return None;
            }
        };
        let status = self.status.parse::<JobStatus>().unwrap_or_else(|e| {
            tracing::warn!(id = %self.id, error = %e, "unknown job status in database, defaulting to Pending");
            JobStatus::Pending
        });

        Some(JobPosting {
            id: JobId(self.id),
            title: self.title,
            description: self.description,
            location,
            tags: self.tags,
            salary: self.salary,
            status,
            posted_by,
            posted_at: Timestamp::from_utc(self.posted_at),
        })
    }
}
