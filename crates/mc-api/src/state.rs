//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers
//! via the `State` extractor.
//!
//! ## What lives here
//!
//! - **Jobs** and **rosters**: in-memory [`Store`]s, hydrated from Postgres on
//!   startup and written through on every mutation when a pool is configured.
//! - **Locations**: the [`LocationStore`] (Redis in deployment, memory
//!   otherwise). Only the presence hub writes to it.
//! - **Presence hub**: the live broadcast set behind `/v1/presence`.
//! - **Visibility service**: the read/mutate façade used by the HTTP routes.

use std::collections::HashMap;
use std::hash::Hash;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use utoipa::ToSchema;

use mc_core::{GeoPoint, Identity, JobId, Timestamp};
use mc_presence::{
    BroadcastAll, HubConfig, LocationStore, MemoryLocationStore, PresenceHub, RecipientPolicy,
    RosterLookup, RosterScoped, StalenessPolicy,
};
use mc_state::JobStatus;

use crate::visibility::JobVisibilityService;

// -- Generic In-Memory Store --------------------------------------------------

/// Thread-safe, cloneable in-memory key-value store.
///
/// The lock is `parking_lot` and is never held across an `.await`.
#[derive(Debug)]
pub struct Store<K, V> {
    data: Arc<RwLock<HashMap<K, V>>>,
}

impl<K, V> Clone for Store<K, V> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> Store<K, V> {
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert a record, returning the previous value if the key existed.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.data.write().insert(key, value)
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.data.read().get(key).cloned()
    }

    /// Snapshot of all records, in no particular order.
    pub fn list(&self) -> Vec<V> {
        self.data.read().values().cloned().collect()
    }

    /// Snapshot of the records matching `keep`.
    pub fn filter(&self, mut keep: impl FnMut(&V) -> bool) -> Vec<V> {
        self.data
            .read()
            .values()
            .filter(|v| keep(v))
            .cloned()
            .collect()
    }

    /// Update a record in place. Returns the updated record, or `None` if not found.
    pub fn update(&self, key: &K, f: impl FnOnce(&mut V)) -> Option<V> {
        let mut guard = self.data.write();
        let entry = guard.get_mut(key)?;
        f(entry);
        Some(entry.clone())
    }

    /// Read-validate-update under a single write lock.
    ///
    /// Returns `None` if the record doesn't exist, or `Some(result)` with
    /// the closure's `Result`.
    pub fn try_update<R, E>(
        &self,
        key: &K,
        f: impl FnOnce(&mut V) -> Result<R, E>,
    ) -> Option<Result<R, E>> {
        self.data.write().get_mut(key).map(f)
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.data.write().remove(key)
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash + Clone, V: Clone> Default for Store<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

// -- Records ------------------------------------------------------------------

/// A job an employer has posted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct JobPosting {
    #[schema(value_type = String, format = Uuid)]
    pub id: JobId,
    pub title: String,
    pub description: String,
    /// GeoJSON point, `{"type": "Point", "coordinates": [longitude, latitude]}`.
    #[schema(value_type = Object)]
    pub location: GeoPoint,
    pub tags: Vec<String>,
    pub salary: String,
    #[schema(value_type = String, example = "Pending")]
    pub status: JobStatus,
    #[schema(value_type = String)]
    pub posted_by: Identity,
    #[schema(value_type = String, format = DateTime)]
    pub posted_at: Timestamp,
}

impl JobPosting {
    /// Whether any of this posting's tags equals `category`.
    pub fn has_tag(&self, category: &str) -> bool {
        self.tags.iter().any(|t| t == category)
    }
}

/// One worker an employer tracks.
///
/// Fields beyond `worker` and `display_name` are kept verbatim so clients can
/// store whatever they render next to a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub worker: Identity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl RosterEntry {
    pub fn new(worker: Identity) -> Self {
        Self {
            worker,
            display_name: None,
            extra: serde_json::Map::new(),
        }
    }
}

/// The ordered list of workers one employer tracks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EmployerRoster {
    #[schema(value_type = String)]
    pub employer: Identity,
    /// Each entry carries `worker`, an optional `display_name`, and any
    /// additional fields the client stored.
    #[schema(value_type = Vec<Object>)]
    pub workers: Vec<RosterEntry>,
}

impl EmployerRoster {
    pub fn contains(&self, worker: &Identity) -> bool {
        self.workers.iter().any(|w| &w.worker == worker)
    }
}

pub type JobStore = Store<JobId, JobPosting>;
pub type RosterStore = Store<Identity, EmployerRoster>;

impl RosterLookup for RosterStore {
    fn is_on_roster(&self, employer: &Identity, worker: &Identity) -> bool {
        self.data
            .read()
            .get(employer)
            .is_some_and(|roster| roster.contains(worker))
    }
}

// -- Configuration ------------------------------------------------------------

/// Recipient selection for the presence hub.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PresencePolicy {
    /// Every viewer sees every location event.
    #[default]
    All,
    /// Employers see their roster, employees themselves, admins everyone.
    Roster,
}

impl FromStr for PresencePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "roster" => Ok(Self::Roster),
            other => Err(format!("unknown presence policy {other:?}, expected all|roster")),
        }
    }
}

/// Application configuration.
///
/// Custom `Debug` redacts the `auth_token`.
#[derive(Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Static bearer token gating every non-health route. `None` disables it.
    pub auth_token: Option<String>,
    pub presence_policy: PresencePolicy,
    /// Per-viewer outbound queue bound.
    pub presence_queue_depth: usize,
    /// WebSocket ping interval. `None` disables pings.
    pub presence_heartbeat: Option<Duration>,
    /// Expiry the Redis backend applies to every location write.
    pub location_ttl: Option<Duration>,
    /// Location records older than this are reported as absent.
    pub location_max_age: Option<Duration>,
    pub metrics_enabled: bool,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("presence_policy", &self.presence_policy)
            .field("presence_queue_depth", &self.presence_queue_depth)
            .field("presence_heartbeat", &self.presence_heartbeat)
            .field("location_ttl", &self.location_ttl)
            .field("location_max_age", &self.location_max_age)
            .field("metrics_enabled", &self.metrics_enabled)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            auth_token: None,
            presence_policy: PresencePolicy::All,
            presence_queue_depth: HubConfig::default().queue_depth,
            presence_heartbeat: Some(Duration::from_secs(30)),
            location_ttl: None,
            location_max_age: None,
            metrics_enabled: true,
        }
    }
}

impl AppConfig {
    /// Build from process environment variables.
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Unset variables keep their
    /// defaults; set but unparseable ones are an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let defaults = Self::default();

        fn parsed<T: FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &str,
        ) -> Result<Option<T>, String>
        where
            T::Err: std::fmt::Display,
        {
            match lookup(key) {
                None => Ok(None),
                Some(raw) if raw.trim().is_empty() => Ok(None),
                Some(raw) => raw
                    .trim()
                    .parse::<T>()
                    .map(Some)
                    .map_err(|e| format!("{key}={raw:?}: {e}")),
            }
        }

        let secs = |key: &str| -> Result<Option<Duration>, String> {
            Ok(parsed::<u64>(&lookup, key)?.map(Duration::from_secs))
        };

        let presence_heartbeat = match secs("PRESENCE_HEARTBEAT_SECS")? {
            None => defaults.presence_heartbeat,
            Some(d) if d.is_zero() => None,
            Some(d) => Some(d),
        };

        Ok(Self {
            port: parsed(&lookup, "PORT")?.unwrap_or(defaults.port),
            auth_token: lookup("AUTH_TOKEN").filter(|t| !t.is_empty()),
            presence_policy: parsed(&lookup, "PRESENCE_POLICY")?
                .unwrap_or(defaults.presence_policy),
            presence_queue_depth: parsed(&lookup, "PRESENCE_QUEUE_DEPTH")?
                .unwrap_or(defaults.presence_queue_depth),
            presence_heartbeat,
            location_ttl: secs("LOCATION_TTL_SECS")?,
            location_max_age: secs("LOCATION_MAX_AGE_SECS")?,
            metrics_enabled: parsed(&lookup, "MC_METRICS_ENABLED")?
                .unwrap_or(defaults.metrics_enabled),
        })
    }

    pub fn staleness(&self) -> StalenessPolicy {
        StalenessPolicy {
            max_age: self.location_max_age,
        }
    }
}

// -- Application State --------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub jobs: JobStore,
    pub rosters: RosterStore,
    pub locations: Arc<dyn LocationStore>,
    pub hub: PresenceHub,
    pub visibility: JobVisibilityService,

    /// When `Some`, job and roster mutations are written through to Postgres.
    pub db_pool: Option<PgPool>,

    /// Prometheus render handle behind `/metrics`.
    pub metrics: Option<PrometheusHandle>,

    pub config: AppConfig,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("jobs", &self.jobs.len())
            .field("rosters", &self.rosters.len())
            .field("locations", &self.locations.backend())
            .field("hub", &self.hub)
            .field("db_pool", &self.db_pool.is_some())
            .field("metrics", &self.metrics.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl AppState {
    /// In-memory state with default configuration.
    pub fn new() -> Self {
        Self::with_config(AppConfig::default())
    }

    /// In-memory state: memory location store, no database.
    pub fn with_config(config: AppConfig) -> Self {
        Self::with_backends(config, Arc::new(MemoryLocationStore::new()), None)
    }

    pub fn with_backends(
        config: AppConfig,
        locations: Arc<dyn LocationStore>,
        db_pool: Option<PgPool>,
    ) -> Self {
        let jobs = JobStore::new();
        let rosters = RosterStore::new();

        let policy: Arc<dyn RecipientPolicy> = match config.presence_policy {
            PresencePolicy::All => Arc::new(BroadcastAll),
            PresencePolicy::Roster => Arc::new(RosterScoped::new(rosters.clone())),
        };
        let hub = PresenceHub::new(
            Arc::clone(&locations),
            policy,
            HubConfig {
                queue_depth: config.presence_queue_depth,
            },
        );
        let visibility = JobVisibilityService::new(
            jobs.clone(),
            rosters.clone(),
            Arc::clone(&locations),
            config.staleness(),
            db_pool.clone(),
        );

        Self {
            jobs,
            rosters,
            locations,
            hub,
            visibility,
            db_pool,
            metrics: None,
            config,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Load persisted jobs and rosters into the in-memory stores.
    ///
    /// No-op without a database pool.
    pub async fn hydrate_from_db(&self) -> Result<(), String> {
        let Some(pool) = &self.db_pool else {
            return Ok(());
        };

        let jobs = crate::db::jobs::load_all(pool)
            .await
            .map_err(|e| format!("failed to load jobs: {e}"))?;
        let job_count = jobs.len();
        for job in jobs {
            self.jobs.insert(job.id, job);
        }

        let rosters = crate::db::rosters::load_all(pool)
            .await
            .map_err(|e| format!("failed to load rosters: {e}"))?;
        let roster_count = rosters.len();
        for roster in rosters {
            self.rosters.insert(roster.employer.clone(), roster);
        }

        tracing::info!(
            jobs = job_count,
            rosters = roster_count,
            "Hydrated in-memory stores from database"
        );
        Ok(())
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mc_core::Coordinate;

    fn id(s: &str) -> Identity {
        Identity::new(s).unwrap()
    }

    fn sample_job() -> JobPosting {
        JobPosting {
            id: JobId::new(),
            title: "Harvest".to_string(),
            description: "Two weeks of rice harvest".to_string(),
            location: Coordinate::new(13.08, 80.27).unwrap().into(),
            tags: vec!["farming".to_string(), "seasonal".to_string()],
            salary: "500/day".to_string(),
            status: JobStatus::Pending,
            posted_by: id("boss@example.com"),
            posted_at: Timestamp::now(),
        }
    }

    #[test]
    fn store_insert_and_get_roundtrip() {
        let store = JobStore::new();
        let job = sample_job();
        assert!(store.insert(job.id, job.clone()).is_none());
        assert_eq!(store.get(&job.id), Some(job.clone()));
        assert!(store.insert(job.id, job).is_some());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn store_update_returns_none_for_missing_key() {
        let store = JobStore::new();
        assert!(store.update(&JobId::new(), |j| j.title.clear()).is_none());
    }

    #[test]
    fn store_try_update_runs_under_lock() {
        let store = JobStore::new();
        let job = sample_job();
        store.insert(job.id, job.clone());
        let result = store.try_update(&job.id, |j| j.status.mark_done().map(|s| j.status = s));
        assert_eq!(result, Some(Ok(())));
        let again = store.try_update(&job.id, |j| j.status.mark_done().map(|s| j.status = s));
        assert!(matches!(again, Some(Err(_))));
    }

    #[test]
    fn store_filter_and_remove() {
        let store = JobStore::new();
        let a = sample_job();
        let mut b = sample_job();
        b.tags = vec!["construction".to_string()];
        store.insert(a.id, a.clone());
        store.insert(b.id, b.clone());
        assert_eq!(store.filter(|j| j.has_tag("farming")), vec![a.clone()]);
        assert_eq!(store.remove(&a.id), Some(a.clone()));
        assert_eq!(store.get(&a.id), None);
        assert_eq!(store.list(), vec![b]);
    }

    #[test]
    fn store_clone_shares_underlying_data() {
        let store = JobStore::new();
        let clone = store.clone();
        let job = sample_job();
        store.insert(job.id, job.clone());
        assert_eq!(clone.get(&job.id), Some(job));
    }

    #[test]
    fn job_posting_serializes_geojson_location() {
        let json = serde_json::to_value(sample_job()).unwrap();
        assert_eq!(json["location"]["type"], "Point");
        assert_eq!(json["location"]["coordinates"][0], 80.27);
        assert_eq!(json["status"], "Pending");
        assert_eq!(json["posted_by"], "boss@example.com");
    }

    #[test]
    fn roster_entry_keeps_extra_fields() {
        let entry: RosterEntry = serde_json::from_str(
            r#"{"worker":"W1@example.com","display_name":"Ravi","unique_no":"A-17"}"#,
        )
        .unwrap();
        assert_eq!(entry.worker, id("w1@example.com"));
        assert_eq!(entry.display_name.as_deref(), Some("Ravi"));
        assert_eq!(entry.extra["unique_no"], "A-17");
        let back = serde_json::to_value(&entry).unwrap();
        assert_eq!(back["unique_no"], "A-17");
    }

    #[test]
    fn roster_store_answers_membership() {
        let rosters = RosterStore::new();
        rosters.insert(
            id("boss@example.com"),
            EmployerRoster {
                employer: id("boss@example.com"),
                workers: vec![RosterEntry::new(id("w1@example.com"))],
            },
        );
        assert!(rosters.is_on_roster(&id("boss@example.com"), &id("w1@example.com")));
        assert!(!rosters.is_on_roster(&id("boss@example.com"), &id("w2@example.com")));
        assert!(!rosters.is_on_roster(&id("other@example.com"), &id("w1@example.com")));
    }

    #[test]
    fn config_defaults_without_env() {
        let config = AppConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.presence_policy, PresencePolicy::All);
        assert_eq!(config.presence_queue_depth, 64);
        assert_eq!(config.presence_heartbeat, Some(Duration::from_secs(30)));
        assert!(config.metrics_enabled);
        assert!(config.auth_token.is_none());
    }

    #[test]
    fn config_reads_overrides() {
        let env: HashMap<&str, &str> = [
            ("PORT", "8081"),
            ("AUTH_TOKEN", "s3cret"),
            ("PRESENCE_POLICY", "roster"),
            ("PRESENCE_QUEUE_DEPTH", "8"),
            ("PRESENCE_HEARTBEAT_SECS", "0"),
            ("LOCATION_TTL_SECS", "600"),
            ("LOCATION_MAX_AGE_SECS", "300"),
            ("MC_METRICS_ENABLED", "false"),
        ]
        .into_iter()
        .collect();
        let config = AppConfig::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.port, 8081);
        assert_eq!(config.auth_token.as_deref(), Some("s3cret"));
        assert_eq!(config.presence_policy, PresencePolicy::Roster);
        assert_eq!(config.presence_queue_depth, 8);
        assert_eq!(config.presence_heartbeat, None);
        assert_eq!(config.location_ttl, Some(Duration::from_secs(600)));
        assert_eq!(config.staleness().max_age, Some(Duration::from_secs(300)));
        assert!(!config.metrics_enabled);
    }

    #[test]
    fn config_rejects_garbage() {
        let err = AppConfig::from_lookup(|k| (k == "PORT").then(|| "eighty".to_string()))
            .unwrap_err();
        assert!(err.contains("PORT"));
        assert!(AppConfig::from_lookup(|k| {
            (k == "PRESENCE_POLICY").then(|| "nearby".to_string())
        })
        .is_err());
    }

    #[test]
    fn config_debug_redacts_token() {
        let config = AppConfig {
            auth_token: Some("s3cret".into()),
            ..AppConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn app_state_new_is_empty_and_in_memory() {
        let state = AppState::new();
        assert!(state.jobs.is_empty());
        assert!(state.rosters.is_empty());
        assert!(state.db_pool.is_none());
        assert_eq!(state.locations.backend(), "memory");
        assert_eq!(state.hub.policy_name(), "all");
    }

    #[test]
    fn roster_policy_is_wired_from_config() {
        let state = AppState::with_config(AppConfig {
            presence_policy: PresencePolicy::Roster,
            ..AppConfig::default()
        });
        assert_eq!(state.hub.policy_name(), "roster");
    }
}
