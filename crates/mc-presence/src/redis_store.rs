//! # Redis Location Backend
//!
//! One string key per worker, `location:<identity>`, holding the JSON form of
//! [`LocationRecord`]. With a TTL configured every write is `SET .. EX`, so
//! Redis evicts workers who stop reporting; readers then see `None`.
//!
//! The connection is a [`ConnectionManager`], which reconnects on its own.
//! Commands are not retried here: a failure is reported to the caller as
//! [`LocationStoreError::Unavailable`].

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{AsyncCommands, Client};

use mc_core::Identity;

use crate::store::{LocationRecord, LocationStore, LocationStoreError};

const KEY_PREFIX: &str = "location:";
const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

impl From<redis::RedisError> for LocationStoreError {
    fn from(err: redis::RedisError) -> Self {
        LocationStoreError::Unavailable(err.to_string())
    }
}

#[derive(Clone)]
pub struct RedisLocationStore {
    connection: ConnectionManager,
    ttl: Option<Duration>,
}

impl std::fmt::Debug for RedisLocationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisLocationStore")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl RedisLocationStore {
    /// Open a managed connection to `redis_url`.
    pub async fn connect(redis_url: &str, ttl: Option<Duration>) -> Result<Self, LocationStoreError> {
        let config = ConnectionManagerConfig::new()
            .set_number_of_retries(1)
            .set_connection_timeout(CONNECT_TIMEOUT);

        let client = Client::open(redis_url)?;
        let connection = client.get_connection_manager_with_config(config).await?;
        tracing::info!(ttl_secs = ttl.map(|t| t.as_secs()), "connected to Redis location cache");
        Ok(Self { connection, ttl })
    }
}

fn key_for(identity: &Identity) -> String {
    format!("{KEY_PREFIX}{identity}")
}

#[async_trait]
impl LocationStore for RedisLocationStore {
    async fn set(&self, identity: &Identity, record: LocationRecord) -> Result<(), LocationStoreError> {
        let value = serde_json::to_string(&record)?;
        let mut conn = self.connection.clone();
        match self.ttl {
            Some(ttl) => {
                let _: () = conn.set_ex(key_for(identity), value, ttl.as_secs().max(1)).await?;
            }
            None => {
                let _: () = conn.set(key_for(identity), value).await?;
            }
        }
        Ok(())
    }

    async fn get(&self, identity: &Identity) -> Result<Option<LocationRecord>, LocationStoreError> {
        let mut conn = self.connection.clone();
        let raw: Option<String> = conn.get(key_for(identity)).await?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        match serde_json::from_str::<LocationRecord>(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                // Not written by us. Treat as absent rather than failing the read.
                tracing::warn!(%identity, error = %e, "unreadable location record in cache");
                Ok(None)
            }
        }
    }

    async fn ping(&self) -> Result<(), LocationStoreError> {
        let mut conn = self.connection.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
