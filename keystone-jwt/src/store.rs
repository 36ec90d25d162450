//! Key-value storage behind the blacklist.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors raised by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend could not be reached
    #[error("Connection error: {0}")]
    Connection(String),

    /// Backend answered with something unusable
    #[error("Backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Storage used by the [`Blacklist`](crate::Blacklist).
///
/// Values are opaque strings. A `None` TTL means the key never expires;
/// implementations must not evict such keys on their own.
#[async_trait]
pub trait BlacklistStore: Send + Sync {
    /// Get a value, `Ok(None)` if missing or expired.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Store a value with an optional time-to-live.
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> StoreResult<()>;

    /// Remove a key. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Remove every key under `prefix`.
    async fn clear(&self, prefix: &str) -> StoreResult<()>;
}

/// In-process store, suitable for a single instance and for tests.
#[derive(Clone, Default)]
pub struct MemoryStore {
    data: Arc<RwLock<HashMap<String, StoredValue>>>,
}

#[derive(Clone)]
struct StoredValue {
    value: String,
    expires_at: Option<tokio::time::Instant>,
}

impl StoredValue {
    fn is_live(&self, now: tokio::time::Instant) -> bool {
        self.expires_at.is_none_or(|exp| exp > now)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub async fn len(&self) -> usize {
        let now = tokio::time::Instant::now();
        self.data
            .read()
            .await
            .values()
            .filter(|v| v.is_live(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop expired keys.
    pub async fn purge_expired(&self) {
        let now = tokio::time::Instant::now();
        self.data.write().await.retain(|_, v| v.is_live(now));
    }
}

#[async_trait]
impl BlacklistStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let data = self.data.read().await;
        let now = tokio::time::Instant::now();
        Ok(data
            .get(key)
            .filter(|v| v.is_live(now))
            .map(|v| v.value.clone()))
    }

    /// Expired keys are dropped on every write. A TTL too large to
    /// represent is stored without expiry.
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> StoreResult<()> {
        let now = tokio::time::Instant::now();
        let expires_at = ttl.and_then(|d| now.checked_add(d));

        let mut data = self.data.write().await;
        data.retain(|_, v| v.is_live(now));
        data.insert(key.to_string(), StoredValue { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.data.write().await.remove(key);
        Ok(())
    }

    async fn clear(&self, prefix: &str) -> StoreResult<()> {
        self.data.write().await.retain(|k, _| !k.starts_with(prefix));
        Ok(())
    }
}

#[cfg(feature = "redis")]
pub use self::redis_store::RedisStore;

#[cfg(feature = "redis")]
mod redis_store {
    use super::*;
    use redis::{AsyncCommands, Client, aio::ConnectionManager};

    /// Redis-backed store for blacklists shared between instances.
    #[derive(Clone)]
    pub struct RedisStore {
        connection: ConnectionManager,
    }

    impl RedisStore {
        /// Connect to `url`, e.g. `redis://localhost:6379`.
        pub async fn connect(url: &str) -> StoreResult<Self> {
            let client = Client::open(url).map_err(|e| StoreError::Connection(e.to_string()))?;
            let connection = ConnectionManager::new(client)
                .await
                .map_err(|e| StoreError::Connection(e.to_string()))?;
            Ok(Self { connection })
        }
    }

    fn backend(e: redis::RedisError) -> StoreError {
        StoreError::Backend(e.to_string())
    }

    #[async_trait]
    impl BlacklistStore for RedisStore {
        async fn get(&self, key: &str) -> StoreResult<Option<String>> {
            let mut conn = self.connection.clone();
            conn.get(key).await.map_err(backend)
        }

        async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> StoreResult<()> {
            let mut conn = self.connection.clone();
            match ttl {
                Some(ttl) => {
                    let _: () = conn
                        .set_ex(key, value, ttl.as_secs().max(1))
                        .await
                        .map_err(backend)?;
                }
                None => {
                    let _: () = conn.set(key, value).await.map_err(backend)?;
                }
            }
            Ok(())
        }

        async fn delete(&self, key: &str) -> StoreResult<()> {
            let mut conn = self.connection.clone();
            let _: () = conn.del(key).await.map_err(backend)?;
            Ok(())
        }

        async fn clear(&self, prefix: &str) -> StoreResult<()> {
            let mut conn = self.connection.clone();
            let keys: Vec<String> = conn.keys(format!("{}*", prefix)).await.map_err(backend)?;
            if !keys.is_empty() {
                let _: () = conn.del(keys).await.map_err(backend)?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();

        store.set("a", "1".to_string(), None).await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));

        store.delete("a").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
        // deleting twice is fine
        store.delete("a").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_store_ttl() {
        let store = MemoryStore::new();
        store
            .set("short", "x".to_string(), Some(Duration::from_secs(10)))
            .await
            .unwrap();
        store.set("forever", "y".to_string(), None).await.unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;

        assert_eq!(store.get("short").await.unwrap(), None);
        assert_eq!(store.get("forever").await.unwrap().as_deref(), Some("y"));

        store.purge_expired().await;
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_store_drops_expired_keys_on_write() {
        let store = MemoryStore::new();
        for i in 0..10 {
            store
                .set(&format!("grace:{}", i), "x".to_string(), Some(Duration::from_secs(10)))
                .await
                .unwrap();
        }
        assert_eq!(store.data.read().await.len(), 10);

        tokio::time::advance(Duration::from_secs(11)).await;
        store.set("next", "y".to_string(), Some(Duration::from_secs(10))).await.unwrap();

        assert_eq!(store.data.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_huge_ttl() {
        let store = MemoryStore::new();
        store
            .set("far", "x".to_string(), Some(Duration::from_secs(u64::MAX)))
            .await
            .unwrap();
        assert_eq!(store.get("far").await.unwrap().as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn test_memory_store_clear_by_prefix() {
        let store = MemoryStore::new();
        store.set("jwt:a", "1".to_string(), None).await.unwrap();
        store.set("jwt:b", "1".to_string(), None).await.unwrap();
        store.set("other", "1".to_string(), None).await.unwrap();

        store.clear("jwt:").await.unwrap();

        assert_eq!(store.len().await, 1);
        assert!(store.get("other").await.unwrap().is_some());
    }
}
