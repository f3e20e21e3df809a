//! # Location Store
//!
//! Last-known position per worker. `set` overwrites unconditionally, so
//! concurrent writers for one identity resolve last-write-wins in arrival
//! order. `get` returns `None` when nothing was ever recorded or the backend
//! evicted the key; the two cases are indistinguishable to callers.
//!
//! Staleness is not the store's concern. [`StalenessPolicy`] is applied by
//! readers that want old records reported as absent.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use mc_core::{Coordinate, Identity, Timestamp, ValidationError};

/// A worker's last reported coordinate and when the server received it.
///
/// Serialized flat as `{"latitude", "longitude", "recorded_at"}`; this is
/// both the cache value and the HTTP response shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredLocation", into = "StoredLocation")]
pub struct LocationRecord {
    pub coordinate: Coordinate,
    pub recorded_at: Timestamp,
}

impl LocationRecord {
    pub fn new(coordinate: Coordinate, recorded_at: Timestamp) -> Self {
        Self {
            coordinate,
            recorded_at,
        }
    }

    /// Stamp `coordinate` with the current time.
    pub fn now(coordinate: Coordinate) -> Self {
        Self::new(coordinate, Timestamp::now())
    }
}

#[derive(Serialize, Deserialize)]
struct StoredLocation {
    latitude: f64,
    longitude: f64,
    recorded_at: Timestamp,
}

impl TryFrom<StoredLocation> for LocationRecord {
    type Error = ValidationError;

    fn try_from(raw: StoredLocation) -> Result<Self, Self::Error> {
        Ok(Self::new(
            Coordinate::new(raw.latitude, raw.longitude)?,
            raw.recorded_at,
        ))
    }
}

impl From<LocationRecord> for StoredLocation {
    fn from(record: LocationRecord) -> Self {
        Self {
            latitude: record.coordinate.latitude(),
            longitude: record.coordinate.longitude(),
            recorded_at: record.recorded_at,
        }
    }
}

#[derive(Error, Debug)]
pub enum LocationStoreError {
    /// The backing service could not be reached or refused the command.
    #[error("location store unavailable: {0}")]
    Unavailable(String),

    /// A record could not be encoded for the backend.
    #[error("location record encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Key-value cache of worker locations.
#[async_trait]
pub trait LocationStore: Send + Sync + 'static {
    /// Overwrite the record for `identity`.
    async fn set(&self, identity: &Identity, record: LocationRecord) -> Result<(), LocationStoreError>;

    async fn get(&self, identity: &Identity) -> Result<Option<LocationRecord>, LocationStoreError>;

    /// Readiness probe. Backends without a remote dependency are always ready.
    async fn ping(&self) -> Result<(), LocationStoreError> {
        Ok(())
    }

    /// Short backend name for logs and health output.
    fn backend(&self) -> &'static str;
}

/// Report records older than `max_age` as absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StalenessPolicy {
    pub max_age: Option<Duration>,
}

impl StalenessPolicy {
    /// Keep every record regardless of age.
    pub fn unbounded() -> Self {
        Self { max_age: None }
    }

    pub fn max_age(max_age: Duration) -> Self {
        Self {
            max_age: Some(max_age),
        }
    }

    /// `Some(record)` if the record is fresh at `now`.
    pub fn admit(&self, record: LocationRecord, now: Timestamp) -> Option<LocationRecord> {
        match self.max_age {
            Some(max) if record.recorded_at.age_at(now) > max => None,
            _ => Some(record),
        }
    }

    /// `store.get` filtered through this policy.
    pub async fn lookup(
        &self,
        store: &dyn LocationStore,
        identity: &Identity,
    ) -> Result<Option<LocationRecord>, LocationStoreError> {
        let now = Timestamp::now();
        Ok(store
            .get(identity)
            .await?
            .and_then(|record| self.admit(record, now)))
    }
}

/// Process-local backend. Used when no Redis URL is configured and in tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryLocationStore {
    records: Arc<RwLock<HashMap<Identity, LocationRecord>>>,
}

impl MemoryLocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl LocationStore for MemoryLocationStore {
    async fn set(&self, identity: &Identity, record: LocationRecord) -> Result<(), LocationStoreError> {
        self.records.write().insert(identity.clone(), record);
        Ok(())
    }

    async fn get(&self, identity: &Identity) -> Result<Option<LocationRecord>, LocationStoreError> {
        Ok(self.records.read().get(identity).copied())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
