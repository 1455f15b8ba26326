//! In-memory cache implementation with LRU eviction.
//!
//! Mirrors the Redis cache behavior:
//! - List entry keys are tracked per list namespace for prefix deletion
//! - Deleting a list entry key removes it from tracking
//! - Counters and fences live outside the LRU so capacity pressure never resets them

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use tokio::sync::RwLock;
use tokio::time::Instant;

use tasktrack_core::cache::{namespace_of_list_key, namespace_of_list_prefix, Cache, Result};

/// A single cache entry with optional expiration.
#[derive(Debug, Clone)]
struct CacheEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(value: Vec<u8>, ttl: Option<Duration>) -> Self {
        let expires_at = ttl.map(|d| Instant::now() + d);
        Self { value, expires_at }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| Instant::now() >= exp)
    }
}

/// A record fence; raised monotonically, dropped once expired.
#[derive(Debug, Clone, Copy)]
struct Fence {
    version: u64,
    expires_at: Instant,
}

impl Fence {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-memory cache implementation with LRU eviction.
///
/// Thread-safe cache using `Arc<RwLock<LruCache>>` for concurrent access.
/// Supports TTL with lazy expiration (expired entries are dropped on access).
/// Uses `tokio::time::Instant` so expiry follows a paused test clock.
#[derive(Debug, Clone)]
pub struct MemoryCache {
    /// Main key-value store with LRU eviction.
    store: Arc<RwLock<LruCache<String, CacheEntry>>>,
    /// Maps list namespace -> set of list entry keys.
    tracking: Arc<RwLock<HashMap<String, HashSet<String>>>>,
    counters: Arc<RwLock<HashMap<String, u64>>>,
    fences: Arc<RwLock<HashMap<String, Fence>>>,
}

impl MemoryCache {
    /// Creates a new in-memory cache with LRU eviction.
    ///
    /// # Panics
    ///
    /// Panics if `max_entries` is 0.
    pub fn new(max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).expect("max_entries must be > 0");
        Self {
            store: Arc::new(RwLock::new(LruCache::new(capacity))),
            tracking: Arc::new(RwLock::new(HashMap::new())),
            counters: Arc::new(RwLock::new(HashMap::new())),
            fences: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Returns the number of live and not-yet-collected entries.
    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.read().await.is_empty()
    }

    async fn untrack(&self, namespace: &str, keys: &[String]) {
        let mut tracking = self.tracking.write().await;
        if let Some(tracked) = tracking.get_mut(namespace) {
            for key in keys {
                tracked.remove(key);
            }
            if tracked.is_empty() {
                tracking.remove(namespace);
            }
        }
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut store = self.store.write().await;

        let Some(entry) = store.get(key) else {
            return Ok(None);
        };
        if !entry.is_expired() {
            return Ok(Some(entry.value.clone()));
        }

        store.pop(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        {
            let mut store = self.store.write().await;
            store.put(key.to_string(), CacheEntry::new(value.to_vec(), ttl));
        }

        if let Some(namespace) = namespace_of_list_key(key) {
            let mut tracking = self.tracking.write().await;
            tracking
                .entry(namespace.to_string())
                .or_default()
                .insert(key.to_string());
        }

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        if let Some(namespace) = namespace_of_list_key(key) {
            self.untrack(namespace, &[key.to_string()]).await;
        }

        let mut store = self.store.write().await;
        store.pop(key);

        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        let Some(namespace) = namespace_of_list_prefix(prefix) else {
            // Only list namespaces are tracked.
            return Ok(());
        };

        let tracked_keys: Vec<String> = {
            let tracking = self.tracking.read().await;
            tracking
                .get(namespace)
                .map(|keys| keys.iter().cloned().collect())
                .unwrap_or_default()
        };

        if !tracked_keys.is_empty() {
            {
                let mut store = self.store.write().await;
                for key in &tracked_keys {
                    store.pop(key);
                }
            }
            self.untrack(namespace, &tracked_keys).await;
        }

        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<u64> {
        let mut counters = self.counters.write().await;
        let counter = counters.entry(key.to_string()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn counter(&self, key: &str) -> Result<u64> {
        let counters = self.counters.read().await;
        Ok(counters.get(key).copied().unwrap_or(0))
    }

    async fn raise_fence(&self, key: &str, version: u64, ttl: Duration) -> Result<u64> {
        let mut fences = self.fences.write().await;
        fences.retain(|_, fence| !fence.is_expired());

        let expires_at = Instant::now() + ttl;
        let fence = fences.entry(key.to_string()).or_insert(Fence {
            version,
            expires_at,
        });
        fence.version = fence.version.max(version);
        fence.expires_at = expires_at;
        Ok(fence.version)
    }

    async fn fence(&self, key: &str) -> Result<u64> {
        let fences = self.fences.read().await;
        Ok(fences
            .get(key)
            .filter(|fence| !fence.is_expired())
            .map_or(0, |fence| fence.version))
    }
}
