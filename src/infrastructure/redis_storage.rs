//! Redis-backed counting store.
//!
//! Lets several application instances share request counters and cool-down
//! markers, so a caller's budget is enforced across all of them.
//!
//! ## Commands
//!
//! | Port operation | Redis command |
//! |----------------|---------------|
//! | `get` | `GET key` (nil -> `Ok(None)`) |
//! | `set_with_expiry` | `SET key value EX secs` |
//! | `increment` | `INCR key` |
//!
//! Expiry is handled entirely by Redis. TTLs are sent in whole seconds,
//! rounded up, with a minimum of one second.
//!
//! ## Connections
//!
//! Uses `redis::aio::ConnectionManager`, which multiplexes requests over one
//! connection and reconnects on failure. Each operation works on a clone of
//! the manager, so concurrent requests never wait on a client-side lock.
//!
//! ## Example
//!
//! ```rust,ignore
//! use http_throttle::{RedisStore, RedisStoreConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = RedisStoreConfig {
//!         key_prefix: "throttle:".to_string(),
//!     };
//!
//!     let store = RedisStore::connect_with_config("redis://127.0.0.1/", config)
//!         .await
//!         .expect("Failed to connect to Redis");
//! }
//! ```

use crate::application::ports::{CounterStore, StoreError};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError};
use std::fmt;
use std::time::Duration;

/// Configuration for Redis storage.
#[derive(Debug, Clone, Default)]
pub struct RedisStoreConfig {
    /// Prepended to every key (default: empty, keys are used as-is)
    pub key_prefix: String,
}

/// Redis-backed store for distributed admission control.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    config: RedisStoreConfig,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect to Redis with default configuration.
    ///
    /// # Arguments
    /// * `url` - Redis connection URL (e.g., "redis://127.0.0.1/")
    ///
    /// # Errors
    /// Returns error if connection fails.
    pub async fn connect(url: &str) -> Result<Self, RedisError> {
        Self::connect_with_config(url, RedisStoreConfig::default()).await
    }

    /// Connect to Redis with custom configuration.
    ///
    /// # Errors
    /// Returns error if the URL is invalid or the connection fails.
    pub async fn connect_with_config(
        url: &str,
        config: RedisStoreConfig,
    ) -> Result<Self, RedisError> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;

        Ok(Self { connection, config })
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }

    /// Delete every key under the configured prefix.
    ///
    /// Walks the keyspace with `SCAN`; intended for tests and maintenance,
    /// never called on the request path. With an empty prefix this clears
    /// the whole database.
    ///
    /// # Errors
    /// Returns the first Redis error encountered.
    pub async fn clear_prefix(&self) -> Result<usize, StoreError> {
        let pattern = format!("{}*", self.config.key_prefix);
        let mut conn = self.connection.clone();
        let mut cursor: u64 = 0;
        let mut deleted = 0;

        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(StoreError::backend)?;

            if !keys.is_empty() {
                let removed: usize = conn.del(&keys).await.map_err(StoreError::backend)?;
                deleted += removed;
            }

            if next_cursor == 0 {
                break;
            }
            cursor = next_cursor;
        }

        Ok(deleted)
    }
}

/// Whole seconds for `SET EX`, rounded up, at least one.
fn ttl_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection.clone();
        conn.get(self.key(key)).await.map_err(StoreError::backend)
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        conn.set_ex::<_, _, ()>(self.key(key), value, ttl_secs(ttl))
            .await
            .map_err(StoreError::backend)
    }

    async fn increment(&self, key: &str) -> Result<i64, StoreError> {
        let mut conn = self.connection.clone();
        conn.incr(self.key(key), 1).await.map_err(StoreError::backend)
    }
}
