use std::time::Duration;

use async_trait::async_trait;

use tasktrack_core::lock::{HolderId, LeaseStore, LockError, Result};

use super::error::map_redis_error;

/// Deletes the lease only if `ARGV[1]` holds it.
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Resets the lease TTL to `ARGV[2]` milliseconds only if `ARGV[1]` holds it.
const RENEW_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("PEXPIRE", KEYS[1], ARGV[2])
else
    return 0
end
"#;

fn ttl_millis(ttl: Duration) -> Result<u64> {
    let millis = u64::try_from(ttl.as_millis()).map_err(|_| LockError::InvalidTtl(ttl))?;
    if millis == 0 {
        return Err(LockError::InvalidTtl(ttl));
    }
    Ok(millis)
}

/// Redis-backed [`LeaseStore`] shared by every process using the same server.
#[derive(Clone)]
pub struct RedisLeaseStore {
    conn: redis::aio::ConnectionManager,
}

impl RedisLeaseStore {
    /// Connects to Redis.
    ///
    /// # Errors
    ///
    /// Returns `LockError::ConnectionFailed` if the connection cannot be established.
    pub async fn new(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(map_redis_error)?;
        let conn = redis::aio::ConnectionManager::new(client)
            .await
            .map_err(map_redis_error)?;
        Ok(Self { conn })
    }

    /// Reuses an existing connection manager (e.g. the cache's).
    pub fn from_connection(conn: redis::aio::ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl LeaseStore for RedisLeaseStore {
    async fn try_acquire(&self, key: &str, holder: &HolderId, ttl: Duration) -> Result<bool> {
        let millis = ttl_millis(ttl)?;
        let mut conn = self.conn.clone();

        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(holder.as_str())
            .arg("NX")
            .arg("PX")
            .arg(millis)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;

        Ok(reply.is_some())
    }

    async fn release(&self, key: &str, holder: &HolderId) -> Result<bool> {
        let mut conn = self.conn.clone();

        let deleted: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(key)
            .arg(holder.as_str())
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_error)?;

        Ok(deleted == 1)
    }

    async fn renew(&self, key: &str, holder: &HolderId, ttl: Duration) -> Result<bool> {
        let millis = ttl_millis(ttl)?;
        let mut conn = self.conn.clone();

        let renewed: i64 = redis::Script::new(RENEW_SCRIPT)
            .key(key)
            .arg(holder.as_str())
            .arg(millis)
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_error)?;

        Ok(renewed == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const TTL: Duration = Duration::from_secs(5);

    fn redis_url() -> String {
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
    }

    /// Skip test if Redis not available.
    async fn get_test_store() -> Option<RedisLeaseStore> {
        RedisLeaseStore::new(&redis_url()).await.ok()
    }

    fn test_key() -> String {
        format!("test:lock:{}", Uuid::new_v4())
    }

    #[test]
    fn test_ttl_millis() {
        assert_eq!(ttl_millis(Duration::from_secs(2)), Ok(2000));
        assert_eq!(
            ttl_millis(Duration::from_micros(10)),
            Err(LockError::InvalidTtl(Duration::from_micros(10)))
        );
    }

    #[tokio::test]
    async fn test_redis_acquire_is_exclusive() {
        let Some(store) = get_test_store().await else {
            eprintln!("Skipping test: Redis not available");
            return;
        };

        let key = test_key();
        let a = HolderId::generate();
        let b = HolderId::generate();

        assert!(store.try_acquire(&key, &a, TTL).await.unwrap());
        assert!(!store.try_acquire(&key, &b, TTL).await.unwrap());

        assert!(!store.release(&key, &b).await.unwrap());
        assert!(store.release(&key, &a).await.unwrap());
        assert!(store.try_acquire(&key, &b, TTL).await.unwrap());
        store.release(&key, &b).await.unwrap();
    }

    #[tokio::test]
    async fn test_redis_lease_expires() {
        let Some(store) = get_test_store().await else {
            eprintln!("Skipping test: Redis not available");
            return;
        };

        let key = test_key();
        let a = HolderId::generate();
        let b = HolderId::generate();

        store
            .try_acquire(&key, &a, Duration::from_millis(200))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert!(!store.renew(&key, &a, TTL).await.unwrap());
        assert!(store.try_acquire(&key, &b, TTL).await.unwrap());
        assert!(!store.release(&key, &a).await.unwrap());
        store.release(&key, &b).await.unwrap();
    }

    #[tokio::test]
    async fn test_redis_renew_by_holder() {
        let Some(store) = get_test_store().await else {
            eprintln!("Skipping test: Redis not available");
            return;
        };

        let key = test_key();
        let a = HolderId::generate();

        store.try_acquire(&key, &a, TTL).await.unwrap();
        assert!(store.renew(&key, &a, TTL).await.unwrap());
        assert!(!store.renew(&key, &HolderId::generate(), TTL).await.unwrap());
        store.release(&key, &a).await.unwrap();
    }
}
