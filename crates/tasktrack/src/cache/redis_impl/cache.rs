//! Redis cache implementation.
//!
//! List entry keys are tracked in a Redis Set per list namespace
//! (`ws:{workspace}:{type}:_lists`) so prefix invalidation deletes them by
//! exact key without SCAN.
//!
//! # Non-Atomicity Safety
//!
//! `set`, `delete` and `delete_prefix` issue several commands. A crash
//! between them leaves either a stale member in the tracking set (harmless:
//! DEL and SREM of missing keys are no-ops) or an untracked list entry.
//! Untracked list entries are still never served after invalidation,
//! because list readers compare the entry's epoch with the namespace epoch
//! that `delete_prefix` callers bump.
//!
//! Fences are raised by a Lua script, so concurrent or replayed
//! invalidations can never lower them.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;

use tasktrack_core::cache::{
    deserialize_fence, list_tracking_key, namespace_of_list_key, namespace_of_list_prefix,
    serialize_fence, Cache, CacheError, Result,
};

use super::error::map_redis_error;

/// Stores `max(current, ARGV[1])` with a fresh TTL and returns it.
const RAISE_FENCE_SCRIPT: &str = r#"
local current = redis.call("GET", KEYS[1])
if not current or tonumber(ARGV[1]) > tonumber(current) then
    current = ARGV[1]
end
redis.call("SET", KEYS[1], current, "PX", ARGV[2])
return tonumber(current)
"#;

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// Redis cache backend using connection manager for pooling.
#[derive(Clone)]
pub struct RedisCache {
    conn: redis::aio::ConnectionManager,
}

impl RedisCache {
    /// Creates a new Redis cache connection.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::ConnectionFailed` if the connection cannot be established.
    pub async fn new(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(map_redis_error)?;
        let conn = redis::aio::ConnectionManager::new(client)
            .await
            .map_err(map_redis_error)?;
        Ok(Self { conn })
    }

    /// Returns a handle on the underlying connection manager.
    pub fn connection(&self) -> redis::aio::ConnectionManager {
        self.conn.clone()
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let result: Option<Vec<u8>> = conn.get(key).await.map_err(map_redis_error)?;
        Ok(result)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.conn.clone();

        match ttl {
            Some(duration) => {
                conn.pset_ex::<_, _, ()>(key, value, ttl_millis(duration))
                    .await
                    .map_err(map_redis_error)?;
            }
            None => {
                conn.set::<_, _, ()>(key, value)
                    .await
                    .map_err(map_redis_error)?;
            }
        }

        if let Some(namespace) = namespace_of_list_key(key) {
            conn.sadd::<_, _, ()>(list_tracking_key(namespace), key)
                .await
                .map_err(map_redis_error)?;
        }

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();

        if let Some(namespace) = namespace_of_list_key(key) {
            conn.srem::<_, _, ()>(list_tracking_key(namespace), key)
                .await
                .map_err(map_redis_error)?;
        }

        conn.del::<_, ()>(key).await.map_err(map_redis_error)?;

        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        let Some(namespace) = namespace_of_list_prefix(prefix) else {
            // Only list namespaces are tracked.
            return Ok(());
        };

        let mut conn = self.conn.clone();
        let tracking_key = list_tracking_key(namespace);

        let tracked_keys: Vec<String> = conn
            .smembers(&tracking_key)
            .await
            .map_err(map_redis_error)?;

        if !tracked_keys.is_empty() {
            conn.del::<_, ()>(&tracked_keys)
                .await
                .map_err(map_redis_error)?;
            conn.srem::<_, _, ()>(&tracking_key, &tracked_keys)
                .await
                .map_err(map_redis_error)?;
        }

        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        conn.incr(key, 1u64).await.map_err(map_redis_error)
    }

    async fn counter(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let value: Option<u64> = conn.get(key).await.map_err(map_redis_error)?;
        Ok(value.unwrap_or(0))
    }

    async fn raise_fence(&self, key: &str, version: u64, ttl: Duration) -> Result<u64> {
        let mut conn = self.conn.clone();
        redis::Script::new(RAISE_FENCE_SCRIPT)
            .key(key)
            .arg(serialize_fence(version))
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_error)
    }

    async fn fence(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let bytes: Option<Vec<u8>> = conn.get(key).await.map_err(map_redis_error)?;
        match bytes {
            Some(bytes) => deserialize_fence(&bytes).map_err(CacheError::from),
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tasktrack_core::cache::{list_key, list_namespace, list_prefix, record_key};
    use tasktrack_core::record::{EntityRef, EntityType};
    use tasktrack_core::storage::ListQuery;
    use uuid::Uuid;

    /// Connects to `REDIS_URL`, or returns `None` so the test can skip.
    async fn connect() -> Option<RedisCache> {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".into());
        RedisCache::new(&url).await.ok()
    }

    /// A point key in a throwaway workspace.
    fn scratch_key() -> String {
        record_key(&EntityRef::new(Uuid::new_v4(), EntityType::Task, Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_redis_set_get_delete() {
        let Some(cache) = connect().await else {
            eprintln!("Skipping test: Redis not available");
            return;
        };

        let key = scratch_key();
        cache.set(&key, br#"{"stored_version":1}"#, None).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), Some(br#"{"stored_version":1}"#.to_vec()));

        cache.delete(&key).await.unwrap();
        assert!(cache.get(&key).await.unwrap().is_none());

        // Deleting again is a no-op
        cache.delete(&key).await.unwrap();
    }

    #[tokio::test]
    async fn test_redis_ttl() {
        let Some(cache) = connect().await else {
            eprintln!("Skipping test: Redis not available");
            return;
        };

        let key = scratch_key();
        cache
            .set(&key, b"v1", Some(Duration::from_millis(300)))
            .await
            .unwrap();
        assert!(cache.get(&key).await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(600)).await;

        assert!(cache.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_redis_delete_prefix_uses_tracking_set() {
        let Some(cache) = connect().await else {
            eprintln!("Skipping test: Redis not available");
            return;
        };

        let workspace_id = Uuid::new_v4();
        let all = list_key(&ListQuery::new(workspace_id, EntityType::Task));
        let deleted = list_key(&ListQuery::new(workspace_id, EntityType::Task).including_deleted());
        let projects = list_key(&ListQuery::new(workspace_id, EntityType::Project));
        let tracking_key = list_tracking_key(&list_namespace(workspace_id, EntityType::Task));

        cache.set(&all, b"[]", None).await.unwrap();
        cache.set(&deleted, b"[]", None).await.unwrap();
        cache.set(&projects, b"[]", None).await.unwrap();

        let mut conn = cache.connection();
        let tracked: Vec<String> = conn.smembers(&tracking_key).await.unwrap();
        assert_eq!(tracked.len(), 2);

        cache
            .delete_prefix(&list_prefix(workspace_id, EntityType::Task))
            .await
            .unwrap();

        assert!(cache.get(&all).await.unwrap().is_none());
        assert!(cache.get(&deleted).await.unwrap().is_none());
        assert!(cache.get(&projects).await.unwrap().is_some());

        let tracked_after: Vec<String> = conn.smembers(&tracking_key).await.unwrap();
        assert!(tracked_after.is_empty());

        cache
            .delete_prefix(&list_prefix(workspace_id, EntityType::Project))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_redis_delete_prefix_untracked_is_noop() {
        let Some(cache) = connect().await else {
            eprintln!("Skipping test: Redis not available");
            return;
        };

        let key = scratch_key();
        cache.set(&key, b"value", None).await.unwrap();

        cache.delete_prefix(&key).await.unwrap();

        assert!(cache.get(&key).await.unwrap().is_some());
        cache.delete(&key).await.unwrap();
    }

    #[tokio::test]
    async fn test_redis_counters() {
        let Some(cache) = connect().await else {
            eprintln!("Skipping test: Redis not available");
            return;
        };

        let key = scratch_key();
        assert_eq!(cache.counter(&key).await.unwrap(), 0);
        assert_eq!(cache.incr(&key).await.unwrap(), 1);
        assert_eq!(cache.incr(&key).await.unwrap(), 2);
        assert_eq!(cache.counter(&key).await.unwrap(), 2);

        cache.delete(&key).await.unwrap();
    }

    #[tokio::test]
    async fn test_redis_fences_only_move_forward() {
        let Some(cache) = connect().await else {
            eprintln!("Skipping test: Redis not available");
            return;
        };

        let key = format!("{}:_fence", scratch_key());
        let ttl = Duration::from_secs(30);
        assert_eq!(cache.fence(&key).await.unwrap(), 0);
        assert_eq!(cache.raise_fence(&key, 4, ttl).await.unwrap(), 4);
        assert_eq!(cache.raise_fence(&key, 2, ttl).await.unwrap(), 4);
        assert_eq!(cache.fence(&key).await.unwrap(), 4);

        cache.delete(&key).await.unwrap();
    }
}
