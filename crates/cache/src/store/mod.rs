//! Key-value backends for the result cache
//!
//! Every operation carries a TTL: reads extend the entry's lifetime atomically
//! and writes replace the value together with its expiry.

mod memory;
mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

use async_trait::async_trait;
use sqlbox_core::Result;
use std::sync::Arc;
use std::time::Duration;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Backend name used in logs and errors
    fn name(&self) -> &'static str;

    /// Read `key` and reset its expiry to `ttl` in one step (`GETEX key EX ttl`)
    async fn get_ex(&self, key: &str, ttl: Duration) -> Result<Option<String>>;

    /// Reset the expiry of `key` to `ttl` without reading it (`EXPIRE key ttl`);
    /// returns whether the key was live
    async fn touch(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Write `value` under `key`, expiring after `ttl` (`SET key value EX ttl`)
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
}

#[async_trait]
impl<S: KeyValueStore + ?Sized> KeyValueStore for Arc<S> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn get_ex(&self, key: &str, ttl: Duration) -> Result<Option<String>> {
        (**self).get_ex(key, ttl).await
    }

    async fn touch(&self, key: &str, ttl: Duration) -> Result<bool> {
        (**self).touch(key, ttl).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        (**self).set_ex(key, value, ttl).await
    }
}
