use std::time::Duration;

use async_trait::async_trait;

use super::Result;

/// Trait for basic cache operations.
///
/// The cache is advisory: every value it holds can be rebuilt from the
/// durable store, so callers treat errors as misses.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Gets a value from the cache by key.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Sets a value in the cache with an optional TTL.
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()>;

    /// Deletes a value from the cache by key. Deleting an absent key is a no-op.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Deletes every list entry registered under a list namespace prefix
    /// (e.g. `ws:{id}:task:list:`).
    ///
    /// Implementations track list keys as they are written and delete them
    /// by exact key; they never scan the keyspace. Any prefix that is not a
    /// list namespace is a no-op.
    async fn delete_prefix(&self, prefix: &str) -> Result<()>;

    /// Atomically increments a counter and returns the new value.
    ///
    /// Counters are never evicted by capacity pressure.
    async fn incr(&self, key: &str) -> Result<u64>;

    /// Reads a counter, returning 0 when it was never incremented.
    async fn counter(&self, key: &str) -> Result<u64>;

    /// Atomically raises the fence at `key` to `version` and returns the
    /// fence now stored. A lower `version` leaves the fence unchanged.
    ///
    /// Fences are never evicted by capacity pressure; they expire after `ttl`.
    async fn raise_fence(&self, key: &str, version: u64, ttl: Duration) -> Result<u64>;

    /// Reads a fence, returning 0 when none is set or it expired.
    async fn fence(&self, key: &str) -> Result<u64>;
}
