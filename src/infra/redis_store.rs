//! Redis-backed cache store. Entries are hashes with `body` and `ts` fields.

use std::{collections::HashMap, fmt};

use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};
use tracing::info;

use crate::application::ports::{CacheEntry, CacheStore, CacheStoreError};

use super::error::InfraError;

const SOURCE: &str = "covid_chart::redis";

/// Shared Redis client. `ConnectionManager` reconnects on its own, so clones
/// are cheap handles onto one multiplexed connection.
#[derive(Clone)]
pub struct RedisCacheStore {
    connection: ConnectionManager,
    endpoint: String,
}

impl fmt::Debug for RedisCacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCacheStore")
            .field("endpoint", &self.endpoint)
            .field("connection", &"<ConnectionManager>")
            .finish()
    }
}

impl RedisCacheStore {
    /// Connect and verify the server answers `PING`.
    pub async fn connect(url: &str, display_endpoint: &str) -> Result<Self, InfraError> {
        let client = redis::Client::open(url).map_err(|err| {
            InfraError::cache_store(format!("invalid redis url for {display_endpoint}: {err}"))
        })?;
        let mut connection = ConnectionManager::new(client).await.map_err(|err| {
            InfraError::cache_store(format!("failed to connect to {display_endpoint}: {err}"))
        })?;

        let pong: String = redis::cmd("PING")
            .query_async(&mut connection)
            .await
            .map_err(|err| InfraError::cache_store(format!("redis ping failed: {err}")))?;
        info!(target: SOURCE, endpoint = display_endpoint, pong = %pong, "redis connected");

        Ok(Self {
            connection,
            endpoint: display_endpoint.to_string(),
        })
    }
}

fn classify(err: redis::RedisError) -> CacheStoreError {
    if err.is_io_error() || err.is_connection_dropped() || err.is_timeout() {
        CacheStoreError::Unavailable(err.to_string())
    } else {
        CacheStoreError::backend(err)
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheStoreError> {
        let mut connection = self.connection.clone();
        let fields: HashMap<String, String> =
            connection.hgetall(key).await.map_err(classify)?;
        Ok(CacheEntry::from_fields(fields))
    }

    async fn set(&self, key: &str, fields: &[(&str, String)]) -> Result<(), CacheStoreError> {
        let mut connection = self.connection.clone();
        connection
            .hset_multiple::<_, _, _, ()>(key, fields)
            .await
            .map_err(classify)
    }
}
