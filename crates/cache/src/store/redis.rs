use super::KeyValueStore;
use ::redis::aio::ConnectionManager;
use ::redis::{Client, RedisError};
use async_trait::async_trait;
use sqlbox_core::{Error, Result};
use std::time::Duration;

const BACKEND: &str = "redis";

/// Redis-backed store using native per-key expiry
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect to `url` (`redis://[:password@]host:port[/db]`)
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url).map_err(|e| store_error("open", e))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| store_error("connect", e))?;
        tracing::info!("connected to redis");
        Ok(Self { connection })
    }
}

/// Redis expiries are whole seconds; never round a live TTL down to zero
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

fn store_error(operation: &str, error: RedisError) -> Error {
    Error::store_with_source(BACKEND, operation, error)
}

#[async_trait]
impl KeyValueStore for RedisStore {
    fn name(&self) -> &'static str {
        BACKEND
    }

    async fn get_ex(&self, key: &str, ttl: Duration) -> Result<Option<String>> {
        let mut connection = self.connection.clone();
        let value: Option<String> = ::redis::cmd("GETEX")
            .arg(key)
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async(&mut connection)
            .await
            .map_err(|e| store_error("GETEX", e))?;
        Ok(value)
    }

    async fn touch(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut connection = self.connection.clone();
        let refreshed: bool = ::redis::cmd("EXPIRE")
            .arg(key)
            .arg(ttl_secs(ttl))
            .query_async(&mut connection)
            .await
            .map_err(|e| store_error("EXPIRE", e))?;
        Ok(refreshed)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut connection = self.connection.clone();
        let () = ::redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async(&mut connection)
            .await
            .map_err(|e| store_error("SET", e))?;
        Ok(())
    }
}
