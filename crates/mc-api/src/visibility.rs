//! # Job Visibility Service
//!
//! Answers "which jobs can I see" and "where is my roster" for the map, and
//! routes the single-document job and roster mutations.
//!
//! Reads come from the in-memory stores and the location cache and never
//! block on writers. Mutations check the in-memory record, write through to
//! Postgres when a pool is configured, and only then apply in memory, so a
//! failed write leaves memory untouched.
//!
//! Roster mutations are serialized by an async gate held across the database
//! write and the in-memory apply, so Postgres and memory see roster writes in
//! the same order. Removing a worker is a single `UPDATE` in Postgres and a
//! `retain` under the store's write lock in memory; it never writes back a
//! roster read before the await.
//!
//! A missing job, roster or location is `NotFound`. A cache or database that
//! cannot be reached is `UpstreamUnavailable` and is never swallowed, with one
//! exception: a roster member with no location is reported as absent in
//! [`JobVisibilityService::roster_locations`] instead of failing the call.

use std::sync::Arc;

use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::Mutex;
use utoipa::ToSchema;

use mc_core::{Coordinate, Identity, JobId, Role, Timestamp};
use mc_presence::{LocationRecord, LocationStore, StalenessPolicy};
use mc_state::JobStatus;

use crate::auth::{require_role, CallerIdentity};
use crate::db;
use crate::error::AppError;
use crate::state::{EmployerRoster, JobPosting, JobStore, RosterEntry, RosterStore};

/// Category value that disables tag filtering.
pub const ALL_CATEGORIES: &str = "all";

/// Offset/limit window over a list result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Page {
    pub offset: usize,
    pub limit: Option<usize>,
}

impl Page {
    fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        let window = items.into_iter().skip(self.offset);
        match self.limit {
            Some(limit) => window.take(limit).collect(),
            None => window.collect(),
        }
    }
}

/// Filter for [`JobVisibilityService::list_jobs`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobFilter {
    /// Defaults to `Pending` when `None`.
    pub status: Option<JobStatus>,
    /// Tag to match. `None` or `"all"` matches every posting.
    pub category: Option<String>,
    pub page: Page,
}

impl JobFilter {
    pub fn matches(&self, job: &JobPosting) -> bool {
        if job.status != self.status.unwrap_or_default() {
            return false;
        }
        match self.category.as_deref() {
            None | Some(ALL_CATEGORIES) => true,
            Some(category) => job.has_tag(category),
        }
    }
}

/// Fields an employer supplies when posting a job.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub title: String,
    pub description: String,
    pub coordinate: Coordinate,
    pub tags: Vec<String>,
    pub salary: String,
}

/// Replacement values for a job's editable fields.
#[derive(Debug, Clone, PartialEq)]
pub struct JobEdit {
    pub id: JobId,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub salary: String,
}

/// One roster member and their last known location, if any.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct RosterLocation {
    #[schema(value_type = String)]
    pub worker: Identity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// `null` when the worker has never reported or the record is stale.
    #[schema(value_type = Option<Object>)]
    pub location: Option<LocationRecord>,
}

#[derive(Clone)]
pub struct JobVisibilityService {
    jobs: JobStore,
    rosters: RosterStore,
    locations: Arc<dyn LocationStore>,
    staleness: StalenessPolicy,
    db: Option<PgPool>,
    roster_writes: Arc<Mutex<()>>,
}

impl std::fmt::Debug for JobVisibilityService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobVisibilityService")
            .field("jobs", &self.jobs.len())
            .field("rosters", &self.rosters.len())
            .field("locations", &self.locations.backend())
            .field("staleness", &self.staleness)
            .field("db", &self.db.is_some())
            .finish()
    }
}

fn persistence_error(operation: &'static str, err: sqlx::Error) -> AppError {
    tracing::error!(operation, error = %err, "write-through to database failed");
    AppError::from(err)
}

fn job_not_found(id: JobId) -> AppError {
    AppError::NotFound(format!("job {id} not found"))
}

fn roster_not_found(employer: &Identity) -> AppError {
    AppError::NotFound(format!("no roster for {employer}"))
}

/// Oldest first, ties broken by id, so pages are stable.
fn sort_jobs(jobs: &mut [JobPosting]) {
    jobs.sort_by(|a, b| a.posted_at.cmp(&b.posted_at).then_with(|| a.id.cmp(&b.id)));
}

impl JobVisibilityService {
    pub fn new(
        jobs: JobStore,
        rosters: RosterStore,
        locations: Arc<dyn LocationStore>,
        staleness: StalenessPolicy,
        db: Option<PgPool>,
    ) -> Self {
        Self {
            jobs,
            rosters,
            locations,
            staleness,
            db,
            roster_writes: Arc::new(Mutex::new(())),
        }
    }

    // ── Queries ─────────────────────────────────────────────────────────

    /// Postings matching `filter`, oldest first.
    pub fn list_jobs(&self, filter: &JobFilter) -> Vec<JobPosting> {
        let mut jobs = self.jobs.filter(|job| filter.matches(job));
        sort_jobs(&mut jobs);
        filter.page.apply(jobs)
    }

    /// Every posting regardless of status, oldest first.
    pub fn list_all_jobs(&self, page: Page) -> Vec<JobPosting> {
        let mut jobs = self.jobs.list();
        sort_jobs(&mut jobs);
        page.apply(jobs)
    }

    pub fn job(&self, id: JobId) -> Result<JobPosting, AppError> {
        self.jobs.get(&id).ok_or_else(|| job_not_found(id))
    }

    pub fn roster(&self, employer: &Identity) -> Result<EmployerRoster, AppError> {
        self.rosters
            .get(employer)
            .ok_or_else(|| roster_not_found(employer))
    }

    /// Last known location of one worker, subject to the staleness policy.
    pub async fn employee_location(&self, worker: &Identity) -> Result<LocationRecord, AppError> {
        self.staleness
            .lookup(self.locations.as_ref(), worker)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("no location for {worker}")))
    }

    /// Resolve every roster member through the location cache.
    ///
    /// Returns one entry per roster member, in roster order. Members with no
    /// location get `location: None`.
    pub async fn roster_locations(
        &self,
        employer: &Identity,
    ) -> Result<Vec<RosterLocation>, AppError> {
        let roster = self.roster(employer)?;
        let mut resolved = Vec::with_capacity(roster.workers.len());
        for entry in roster.workers {
            let location = self
                .staleness
                .lookup(self.locations.as_ref(), &entry.worker)
                .await?;
            resolved.push(RosterLocation {
                worker: entry.worker,
                display_name: entry.display_name,
                location,
            });
        }
        Ok(resolved)
    }

    // ── Job mutations ───────────────────────────────────────────────────

    /// Create a `Pending` posting owned by `caller`. Employers and admins only.
    pub async fn post_job(&self, caller: &CallerIdentity, new: NewJob) -> Result<JobPosting, AppError> {
        require_role(caller, Role::Employer)?;
        let job = JobPosting {
            id: JobId::new(),
            title: new.title,
            description: new.description,
            location: new.coordinate.into(),
            tags: new.tags,
            salary: new.salary,
            status: JobStatus::Pending,
            posted_by: caller.email.clone(),
            posted_at: Timestamp::now(),
        };

        if let Some(pool) = &self.db {
            db::jobs::insert(pool, &job)
                .await
                .map_err(|e| persistence_error("insert job", e))?;
        }
        self.jobs.insert(job.id, job.clone());
        tracing::info!(job = %job.id, posted_by = %job.posted_by, "job posted");
        Ok(job)
    }

    /// Replace title, description, tags and salary. Owner or admin only.
    pub async fn edit_job(&self, caller: &CallerIdentity, edit: JobEdit) -> Result<JobPosting, AppError> {
        let current = self.job(edit.id)?;
        if !caller.can_act_for(&current.posted_by) {
            return Err(AppError::Forbidden(format!(
                "job {} belongs to another employer",
                edit.id
            )));
        }

        let updated = JobPosting {
            title: edit.title,
            description: edit.description,
            tags: edit.tags,
            salary: edit.salary,
            ..current
        };
        if let Some(pool) = &self.db {
            let matched = db::jobs::update_details(pool, &updated)
                .await
                .map_err(|e| persistence_error("update job", e))?;
            if !matched {
                return Err(job_not_found(edit.id));
            }
        }

        self.jobs
            .update(&edit.id, |job| {
                job.title = updated.title.clone();
                job.description = updated.description.clone();
                job.tags = updated.tags.clone();
                job.salary = updated.salary.clone();
            })
            .ok_or_else(|| job_not_found(edit.id))
    }

    /// Remove a posting. Owner or admin only.
    pub async fn delete_job(&self, caller: &CallerIdentity, id: JobId) -> Result<JobPosting, AppError> {
        let current = self.job(id)?;
        if !caller.can_act_for(&current.posted_by) {
            return Err(AppError::Forbidden(format!("job {id} belongs to another employer")));
        }

        if let Some(pool) = &self.db {
            let matched = db::jobs::delete(pool, id)
                .await
                .map_err(|e| persistence_error("delete job", e))?;
            if !matched {
                return Err(job_not_found(id));
            }
        }
        let removed = self.jobs.remove(&id).ok_or_else(|| job_not_found(id))?;
        tracing::info!(job = %id, by = %caller.email, "job deleted");
        Ok(removed)
    }

    /// `Pending -> Done`. A job that is absent or already `Done` is
    /// `NotFound`. Owner or admin only.
    pub async fn mark_done(&self, caller: &CallerIdentity, id: JobId) -> Result<JobPosting, AppError> {
        let current = self.job(id)?;
        if !caller.can_act_for(&current.posted_by) {
            return Err(AppError::Forbidden(format!("job {id} belongs to another employer")));
        }
        let next = current.status.mark_done()?;

        if let Some(pool) = &self.db {
            let matched = db::jobs::update_status(pool, id, current.status, next)
                .await
                .map_err(|e| persistence_error("mark job done", e))?;
            if !matched {
                return Err(AppError::NotFound(format!("job {id} not found or already Done")));
            }
        }

        let marked = self
            .jobs
            .try_update(&id, |job| {
                job.status = job.status.mark_done()?;
                Ok::<_, mc_state::JobStatusError>(job.clone())
            })
            .ok_or_else(|| job_not_found(id))??;
        tracing::info!(job = %id, by = %caller.email, "job marked done");
        Ok(marked)
    }

    // ── Roster mutations ────────────────────────────────────────────────

    /// Replace the caller's roster wholesale. Employers and admins only.
    pub async fn save_roster(
        &self,
        caller: &CallerIdentity,
        workers: Vec<RosterEntry>,
    ) -> Result<EmployerRoster, AppError> {
        require_role(caller, Role::Employer)?;
        let roster = EmployerRoster {
            employer: caller.email.clone(),
            workers,
        };
        self.store_roster(roster).await
    }

    /// Pull every entry for `worker` from the caller's roster. Removing a
    /// worker who is not on the roster is a no-op.
    pub async fn remove_roster_worker(
        &self,
        caller: &CallerIdentity,
        worker: &Identity,
    ) -> Result<EmployerRoster, AppError> {
        let employer = &caller.email;
        let _gate = self.roster_writes.lock().await;
        let current = self.roster(employer)?;
        if !current.contains(worker) {
            return Ok(current);
        }

        if let Some(pool) = &self.db {
            let matched = db::rosters::pull_worker(pool, employer, worker)
                .await
                .map_err(|e| persistence_error("pull roster worker", e))?;
            if !matched {
                return Err(roster_not_found(employer));
            }
        }
        let roster = self
            .rosters
            .update(employer, |roster| {
                roster.workers.retain(|entry| &entry.worker != worker)
            })
            .ok_or_else(|| roster_not_found(employer))?;
        tracing::info!(%employer, %worker, workers = roster.workers.len(), "worker removed from roster");
        Ok(roster)
    }

    async fn store_roster(&self, roster: EmployerRoster) -> Result<EmployerRoster, AppError> {
        let _gate = self.roster_writes.lock().await;
        if let Some(pool) = &self.db {
            db::rosters::upsert(pool, &roster)
                .await
                .map_err(|e| persistence_error("upsert roster", e))?;
        }
        self.rosters.insert(roster.employer.clone(), roster.clone());
        tracing::info!(employer = %roster.employer, workers = roster.workers.len(), "roster saved");
        Ok(roster)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mc_presence::MemoryLocationStore;
    use std::time::Duration;

    fn id(s: &str) -> Identity {
        Identity::new(s).unwrap()
    }

    fn employer() -> CallerIdentity {
        CallerIdentity::new(id("boss@example.com"), Role::Employer)
    }

    fn service_with(locations: MemoryLocationStore, staleness: StalenessPolicy) -> JobVisibilityService {
        JobVisibilityService::new(
            JobStore::new(),
            RosterStore::new(),
            Arc::new(locations),
            staleness,
            None,
        )
    }

    fn service() -> JobVisibilityService {
        service_with(MemoryLocationStore::new(), StalenessPolicy::default())
    }

    fn new_job(title: &str, tags: &[&str]) -> NewJob {
        NewJob {
            title: title.to_string(),
            description: "desc".to_string(),
            coordinate: Coordinate::new(13.08, 80.27).unwrap(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            salary: "500".to_string(),
        }
    }

    fn pending(category: Option<&str>) -> JobFilter {
        JobFilter {
            status: Some(JobStatus::Pending),
            category: category.map(str::to_string),
            page: Page::default(),
        }
    }

    fn done() -> JobFilter {
        JobFilter {
            status: Some(JobStatus::Done),
            ..JobFilter::default()
        }
    }

    #[tokio::test]
    async fn post_job_starts_pending_and_owned_by_caller() {
        let svc = service();
        let job = svc.post_job(&employer(), new_job("Harvest", &["farming"])).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.posted_by, id("boss@example.com"));
        assert_eq!(svc.job(job.id).unwrap(), job);
    }

    #[tokio::test]
    async fn employees_cannot_post_jobs() {
        let svc = service();
        let worker = CallerIdentity::new(id("w1@example.com"), Role::Employee);
        let err = svc.post_job(&worker, new_job("Harvest", &[])).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn list_jobs_defaults_to_pending() {
        let svc = service();
        let a = svc.post_job(&employer(), new_job("A", &["farming"])).await.unwrap();
        let b = svc.post_job(&employer(), new_job("B", &["farming"])).await.unwrap();
        svc.mark_done(&employer(), b.id).await.unwrap();

        let default_filter = JobFilter::default();
        let listed: Vec<JobId> = svc.list_jobs(&default_filter).iter().map(|j| j.id).collect();
        assert_eq!(listed, vec![a.id]);
    }

    #[tokio::test]
    async fn mark_done_moves_job_between_status_lists() {
        let svc = service();
        let job = svc.post_job(&employer(), new_job("A", &[])).await.unwrap();
        assert_eq!(svc.list_jobs(&pending(None)).len(), 1);
        assert!(svc.list_jobs(&done()).is_empty());

        let marked = svc.mark_done(&employer(), job.id).await.unwrap();
        assert_eq!(marked.status, JobStatus::Done);
        assert!(svc.list_jobs(&pending(None)).is_empty());
        assert_eq!(svc.list_jobs(&done())[0].id, job.id);
    }

    #[tokio::test]
    async fn mark_done_twice_is_not_found() {
        let svc = service();
        let job = svc.post_job(&employer(), new_job("A", &[])).await.unwrap();
        svc.mark_done(&employer(), job.id).await.unwrap();
        let err = svc.mark_done(&employer(), job.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn category_filter_is_tag_inclusion() {
        let svc = service();
        svc.post_job(&employer(), new_job("Farm", &["farming", "seasonal"])).await.unwrap();
        svc.post_job(&employer(), new_job("Build", &["construction"])).await.unwrap();

        assert_eq!(svc.list_jobs(&pending(Some("seasonal")))[0].title, "Farm");
        assert_eq!(svc.list_jobs(&pending(Some("construction"))).len(), 1);
        assert_eq!(svc.list_jobs(&pending(Some("all"))).len(), 2);
        assert_eq!(svc.list_jobs(&pending(None)).len(), 2);
        assert!(svc.list_jobs(&pending(Some("plumbing"))).is_empty());
    }

    #[tokio::test]
    async fn list_all_jobs_ignores_status_and_pages() {
        let svc = service();
        for title in ["A", "B", "C"] {
            svc.post_job(&employer(), new_job(title, &[])).await.unwrap();
        }
        let first = svc.list_all_jobs(Page::default())[0].clone();
        svc.mark_done(&employer(), first.id).await.unwrap();

        assert_eq!(svc.list_all_jobs(Page::default()).len(), 3);
        let window = svc.list_all_jobs(Page {
            offset: 1,
            limit: Some(1),
        });
        assert_eq!(window.len(), 1);
        assert_ne!(window[0].id, first.id);
    }

    #[tokio::test]
    async fn edit_unknown_job_is_not_found_and_creates_nothing() {
        let svc = service();
        let err = svc
            .edit_job(
                &employer(),
                JobEdit {
                    id: JobId::new(),
                    title: "x".into(),
                    description: "x".into(),
                    tags: vec![],
                    salary: "x".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(svc.list_all_jobs(Page::default()).is_empty());
    }

    #[tokio::test]
    async fn edit_job_replaces_editable_fields_only() {
        let svc = service();
        let job = svc.post_job(&employer(), new_job("A", &["farming"])).await.unwrap();
        let edited = svc
            .edit_job(
                &employer(),
                JobEdit {
                    id: job.id,
                    title: "A2".into(),
                    description: "new".into(),
                    tags: vec!["seasonal".into()],
                    salary: "600".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(edited.title, "A2");
        assert_eq!(edited.tags, vec!["seasonal".to_string()]);
        assert_eq!(edited.location, job.location);
        assert_eq!(edited.posted_at, job.posted_at);
        assert_eq!(svc.job(job.id).unwrap(), edited);
    }

    #[tokio::test]
    async fn other_employers_cannot_touch_a_job() {
        let svc = service();
        let job = svc.post_job(&employer(), new_job("A", &[])).await.unwrap();
        let rival = CallerIdentity::new(id("rival@example.com"), Role::Employer);
        assert!(matches!(
            svc.delete_job(&rival, job.id).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            svc.mark_done(&rival, job.id).await,
            Err(AppError::Forbidden(_))
        ));

        let admin = CallerIdentity::new(id("root@example.com"), Role::Admin);
        svc.delete_job(&admin, job.id).await.unwrap();
        assert!(matches!(
            svc.delete_job(&admin, job.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    async fn seed_roster(svc: &JobVisibilityService, workers: &[&str]) {
        let entries = workers.iter().map(|w| RosterEntry::new(id(w))).collect();
        svc.save_roster(&employer(), entries).await.unwrap();
    }

    #[tokio::test]
    async fn roster_locations_single_worker() {
        let locations = MemoryLocationStore::new();
        let svc = service_with(locations.clone(), StalenessPolicy::default());
        seed_roster(&svc, &["w1@example.com"]).await;

        let record = LocationRecord::now(Coordinate::new(13.08, 80.27).unwrap());
        locations.set(&id("w1@example.com"), record).await.unwrap();

        let resolved = svc.roster_locations(&id("boss@example.com")).await.unwrap();
        assert_eq!(
            resolved,
            vec![RosterLocation {
                worker: id("w1@example.com"),
                display_name: None,
                location: Some(record),
            }]
        );
    }

    #[tokio::test]
    async fn roster_locations_reports_missing_members_without_failing() {
        let locations = MemoryLocationStore::new();
        let svc = service_with(locations.clone(), StalenessPolicy::default());
        seed_roster(&svc, &["w1@example.com", "w2@example.com", "w3@example.com"]).await;
        for w in ["w1@example.com", "w3@example.com"] {
            locations
                .set(&id(w), LocationRecord::now(Coordinate::new(1.0, 2.0).unwrap()))
                .await
                .unwrap();
        }

        let resolved = svc.roster_locations(&id("boss@example.com")).await.unwrap();
        assert_eq!(resolved.len(), 3);
        assert_eq!(resolved.iter().filter(|r| r.location.is_none()).count(), 1);
        assert_eq!(resolved[1].worker, id("w2@example.com"));
        assert!(resolved[1].location.is_none());
    }

    #[tokio::test]
    async fn stale_locations_are_absent() {
        let locations = MemoryLocationStore::new();
        let svc = service_with(locations.clone(), StalenessPolicy::max_age(Duration::from_secs(60)));
        let old = LocationRecord::new(
            Coordinate::new(1.0, 2.0).unwrap(),
            Timestamp::parse("2020-01-01T00:00:00Z").unwrap(),
        );
        locations.set(&id("w1@example.com"), old).await.unwrap();
        assert!(matches!(
            svc.employee_location(&id("w1@example.com")).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn roster_without_document_is_not_found() {
        let svc = service();
        assert!(matches!(
            svc.roster_locations(&id("boss@example.com")).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            svc.remove_roster_worker(&employer(), &id("w1@example.com")).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn remove_roster_worker_pulls_entry() {
        let svc = service();
        seed_roster(&svc, &["w1@example.com", "w2@example.com"]).await;
        let roster = svc
            .remove_roster_worker(&employer(), &id("w1@example.com"))
            .await
            .unwrap();
        assert_eq!(roster.workers.len(), 1);
        assert_eq!(svc.roster(&id("boss@example.com")).unwrap().workers[0].worker, id("w2@example.com"));

        // Pulling an absent worker leaves the roster as is.
        let again = svc
            .remove_roster_worker(&employer(), &id("w1@example.com"))
            .await
            .unwrap();
        assert_eq!(again.workers.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_removals_do_not_lose_updates() {
        let svc = service();
        let mut workers: Vec<String> = (0..20).map(|i| format!("w{i}@example.com")).collect();
        workers.push("keep@example.com".to_string());
        let refs: Vec<&str> = workers.iter().map(String::as_str).collect();
        seed_roster(&svc, &refs).await;

        let removals: Vec<_> = workers[..20]
            .iter()
            .map(|w| {
                let svc = svc.clone();
                let worker = id(w);
                tokio::spawn(async move { svc.remove_roster_worker(&employer(), &worker).await })
            })
            .collect();
        for removal in removals {
            removal.await.unwrap().unwrap();
        }

        let roster = svc.roster(&id("boss@example.com")).unwrap();
        assert_eq!(roster.workers, vec![RosterEntry::new(id("keep@example.com"))]);
    }

    #[tokio::test]
    async fn save_roster_replaces_wholesale() {
        let svc = service();
        seed_roster(&svc, &["w1@example.com", "w2@example.com"]).await;
        seed_roster(&svc, &["w3@example.com"]).await;
        let roster = svc.roster(&id("boss@example.com")).unwrap();
        assert_eq!(roster.workers, vec![RosterEntry::new(id("w3@example.com"))]);
    }
}
