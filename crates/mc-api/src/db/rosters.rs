//! Employer roster persistence operations.
//!
//! All functions take a `&PgPool` and operate on the `employer_rosters` table.
//! The worker list is one JSONB array per employer.

use sqlx::PgPool;

use mc_core::Identity;

use crate::state::{EmployerRoster, RosterEntry};

/// Insert or replace an employer's roster.
pub async fn upsert(pool: &PgPool, roster: &EmployerRoster) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO employer_rosters (employer, workers, updated_at)
         VALUES ($1, $2, now())
         ON CONFLICT (employer) DO UPDATE SET workers = EXCLUDED.workers, updated_at = now()",
    )
    .bind(roster.employer.as_str())
    .bind(sqlx::types::Json(&roster.workers))
    .execute(pool)
    .await?;

    Ok(())
}

/// Remove every entry for `worker` from `employer`'s roster in one statement,
/// keeping the order of the rest. Returns `false` if the employer has no row.
pub async fn pull_worker(
    pool: &PgPool,
    employer: &Identity,
    worker: &Identity,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE employer_rosters
         SET workers = COALESCE(
                 (SELECT jsonb_agg(entry ORDER BY position)
                  FROM jsonb_array_elements(workers) WITH ORDINALITY AS t(entry, position)
                  WHERE entry->>'worker' IS DISTINCT FROM $2),
                 '[]'::jsonb),
             updated_at = now()
         WHERE employer = $1",
    )
    .bind(employer.as_str())
    .bind(worker.as_str())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Load all rosters into the in-memory store on startup.
pub async fn load_all(pool: &PgPool) -> Result<Vec<EmployerRoster>, sqlx::Error> {
    let rows = sqlx::query_as::<_, RosterRow>(
        "SELECT employer, workers FROM employer_rosters ORDER BY employer",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().filter_map(RosterRow::into_record).collect())
}

#[derive(sqlx::FromRow)]
struct RosterRow {
    employer: String,
    workers: serde_json::Value,
}

impl RosterRow {
    fn into_record(self) -> Option<EmployerRoster> {
        let employer = match Identity::new(&self.employer) {
            Ok(identity) => identity,
            Err(e) => {
                tracing::warn!(employer = %self.employer, error = %e, "skipping roster row with invalid employer");
                return None;
            }
        };
        match serde_json::from_value::<Vec<RosterEntry>>(self.workers) {
            Ok(workers) => Some(EmployerRoster { employer, workers }),
            Err(e) => {
                tracing::warn!(%employer, error = %e, "skipping roster row with unreadable workers");
                None
            }
        }
    }
}
