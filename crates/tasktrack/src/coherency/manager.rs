//! Read-through cache with ordered invalidation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tasktrack_core::cache::{
    deserialize_list, deserialize_record, fence_key, list_epoch_key, list_key, list_namespace,
    list_prefix, namespace_of_list_prefix, record_key, serialize_list, serialize_record, Cache,
    CacheError, CachedList, CachedRecord, Result as CacheResult,
};
use tasktrack_core::record::{EntityRef, EntityType, VersionedRecord};
use tasktrack_core::storage::{ListQuery, RepositoryError};
use uuid::Uuid;

use super::SingleFlight;

type Loaded<T> = std::result::Result<T, RepositoryError>;

/// A cache invalidation that can be replayed until it succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
    /// Fence and drop the point entry of a record at a committed version.
    Record { entity: EntityRef, version: u64 },
    /// Drop a single key.
    Key(String),
    /// Drop every list entry under a prefix and bump its namespace epoch.
    Pattern(String),
}

impl Invalidation {
    /// Invalidates every list of the entity type in the workspace.
    pub fn lists_of(workspace_id: Uuid, entity_type: EntityType) -> Self {
        Invalidation::Pattern(list_prefix(workspace_id, entity_type))
    }
}

/// Cache-aside reads with stampede protection and coherent invalidation.
///
/// Point entries are guarded by fences: [`invalidate_record`] stores the
/// committed version before dropping the entry, and lookups discard any
/// entry cached at an older version. List entries carry the namespace epoch
/// read before their load; [`invalidate_pattern`] bumps the epoch, so a list
/// loaded before a commit is never served after its invalidation.
///
/// The cache is advisory. Every cache failure degrades to a load from the
/// store, and every cache call carries its own deadline.
///
/// [`invalidate_record`]: Self::invalidate_record
/// [`invalidate_pattern`]: Self::invalidate_pattern
pub struct CacheCoherencyManager {
    cache: Arc<dyn Cache>,
    ttl: Duration,
    op_timeout: Duration,
    records: SingleFlight<Loaded<Option<VersionedRecord>>>,
    lists: SingleFlight<Loaded<Vec<VersionedRecord>>>,
}

impl CacheCoherencyManager {
    pub fn new(cache: Arc<dyn Cache>, ttl: Duration, op_timeout: Duration) -> Self {
        Self {
            cache,
            ttl,
            op_timeout,
            records: SingleFlight::new(),
            lists: SingleFlight::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fences outlive the entries they guard.
    fn fence_ttl(&self) -> Duration {
        self.ttl.saturating_mul(2)
    }

    async fn guarded<T>(&self, op: impl Future<Output = CacheResult<T>>) -> CacheResult<T> {
        tokio::time::timeout(self.op_timeout, op)
            .await
            .map_err(|_| CacheError::Timeout(self.op_timeout))?
    }

    async fn fence(&self, entity: &EntityRef) -> CacheResult<u64> {
        self.guarded(self.cache.fence(&fence_key(entity))).await
    }

    async fn epoch(&self, namespace: &str) -> CacheResult<u64> {
        self.guarded(self.cache.counter(&list_epoch_key(namespace)))
            .await
    }

    /// Returns the cached record if present and not older than its fence.
    async fn lookup_record(&self, entity: &EntityRef) -> Option<VersionedRecord> {
        let key = record_key(entity);

        let bytes = match self.guarded(self.cache.get(&key)).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                tracing::trace!(%key, "Cache miss for record");
                return None;
            }
            Err(err) => {
                tracing::warn!(%key, error = %err, "Cache read failed, loading from store");
                return None;
            }
        };

        let entry = match deserialize_record(&bytes) {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(%key, error = %err, "Cache entry deserialization failed");
                return None;
            }
        };

        match self.fence(entity).await {
            Ok(fence) if entry.stored_version >= fence => {
                tracing::trace!(%key, version = entry.stored_version, "Cache hit for record");
                Some(entry.record)
            }
            Ok(fence) => {
                tracing::trace!(
                    %key,
                    stored_version = entry.stored_version,
                    fence,
                    "Discarding fenced cache entry"
                );
                None
            }
            Err(err) => {
                tracing::warn!(%key, error = %err, "Fence read failed, loading from store");
                None
            }
        }
    }

    async fn populate_record(&self, entity: &EntityRef, record: &VersionedRecord) {
        let key = record_key(entity);
        let bytes = match serialize_record(&CachedRecord::new(record.clone())) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(%key, error = %err, "Failed to serialize record for cache");
                return;
            }
        };

        if let Err(err) = self
            .guarded(self.cache.set(&key, &bytes, Some(self.ttl)))
            .await
        {
            tracing::warn!(%key, error = %err, "Failed to cache record");
        }
    }

    /// Returns a record from the cache, or loads it once per key.
    ///
    /// Concurrent misses for the same record share one `loader` call. Live
    /// records are cached with the version they were read at; missing and
    /// soft-deleted records are not cached.
    pub async fn get_or_load<F, Fut>(
        &self,
        entity: &EntityRef,
        loader: F,
    ) -> Loaded<Option<VersionedRecord>>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Loaded<Option<VersionedRecord>>> + Send,
    {
        if let Some(record) = self.lookup_record(entity).await {
            return Ok(Some(record));
        }

        let key = record_key(entity);
        self.records
            .run(&key, || async {
                // A flight that finished just before this one may have filled the entry.
                if let Some(record) = self.lookup_record(entity).await {
                    return Ok(Some(record));
                }

                let loaded = loader().await;
                if let Ok(Some(record)) = &loaded {
                    if !record.is_deleted() {
                        self.populate_record(entity, record).await;
                    }
                }
                loaded
            })
            .await
    }

    /// Returns a list result from the cache, or loads it once per query.
    ///
    /// An entry is served only if its epoch equals the namespace's current
    /// epoch. When the epoch cannot be read the loader runs uncached.
    pub async fn get_or_load_list<F, Fut>(
        &self,
        query: &ListQuery,
        loader: F,
    ) -> Loaded<Vec<VersionedRecord>>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Loaded<Vec<VersionedRecord>>> + Send,
    {
        let namespace = list_namespace(query.workspace_id, query.entity_type);
        let key = list_key(query);

        if let Some(records) = self.lookup_list(&key, &namespace).await {
            return Ok(records);
        }

        self.lists
            .run(&key, || async {
                if let Some(records) = self.lookup_list(&key, &namespace).await {
                    return Ok(records);
                }

                let epoch = match self.epoch(&namespace).await {
                    Ok(epoch) => epoch,
                    Err(err) => {
                        tracing::warn!(%key, error = %err, "Epoch read failed, list not cached");
                        return loader().await;
                    }
                };

                let loaded = loader().await;
                if let Ok(records) = &loaded {
                    self.populate_list(&key, epoch, records).await;
                }
                loaded
            })
            .await
    }

    async fn lookup_list(&self, key: &str, namespace: &str) -> Option<Vec<VersionedRecord>> {
        let bytes = match self.guarded(self.cache.get(key)).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                tracing::trace!(%key, "Cache miss for list");
                return None;
            }
            Err(err) => {
                tracing::warn!(%key, error = %err, "Cache read failed, loading from store");
                return None;
            }
        };

        let entry = match deserialize_list(&bytes) {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(%key, error = %err, "Cache list deserialization failed");
                return None;
            }
        };

        match self.epoch(namespace).await {
            Ok(epoch) if epoch == entry.epoch => {
                tracing::trace!(%key, count = entry.records.len(), "Cache hit for list");
                Some(entry.records)
            }
            Ok(epoch) => {
                tracing::trace!(%key, cached = entry.epoch, epoch, "Discarding outdated list");
                None
            }
            Err(err) => {
                tracing::warn!(%key, error = %err, "Epoch read failed, loading from store");
                None
            }
        }
    }

    async fn populate_list(&self, key: &str, epoch: u64, records: &[VersionedRecord]) {
        let entry = CachedList {
            epoch,
            records: records.to_vec(),
        };
        let bytes = match serialize_list(&entry) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(%key, error = %err, "Failed to serialize list for cache");
                return;
            }
        };

        if let Err(err) = self
            .guarded(self.cache.set(key, &bytes, Some(self.ttl)))
            .await
        {
            tracing::warn!(%key, error = %err, "Failed to cache list");
        }
    }

    /// Removes a single entry. Idempotent.
    pub async fn invalidate(&self, key: &str) -> CacheResult<()> {
        self.guarded(self.cache.delete(key)).await?;
        self.records.forget(key).await;
        self.lists.forget(key).await;
        Ok(())
    }

    /// Invalidates a record's point entry after a commit at `committed_version`.
    ///
    /// The fence is raised before the entry is dropped, so an in-flight
    /// load of an older snapshot that lands afterwards is never served.
    /// Fences only move forward, even when older invalidations are replayed.
    pub async fn invalidate_record(
        &self,
        entity: &EntityRef,
        committed_version: u64,
    ) -> CacheResult<()> {
        let fence = self
            .guarded(self.cache.raise_fence(
                &fence_key(entity),
                committed_version,
                self.fence_ttl(),
            ))
            .await?;

        let key = record_key(entity);
        self.invalidate(&key).await?;
        tracing::trace!(%key, version = committed_version, fence, "Invalidated record");
        Ok(())
    }

    /// Removes every list entry under `prefix`.
    ///
    /// For list prefixes the namespace epoch is bumped first, which retires
    /// entries even if the deletion itself fails halfway.
    pub async fn invalidate_pattern(&self, prefix: &str) -> CacheResult<()> {
        if let Some(namespace) = namespace_of_list_prefix(prefix) {
            let epoch = self
                .guarded(self.cache.incr(&list_epoch_key(namespace)))
                .await?;
            tracing::trace!(%prefix, epoch, "Bumped list epoch");
        }

        self.guarded(self.cache.delete_prefix(prefix)).await?;
        self.lists.forget_prefix(prefix).await;
        Ok(())
    }

    /// Applies a queued invalidation.
    pub async fn apply(&self, invalidation: &Invalidation) -> CacheResult<()> {
        match invalidation {
            Invalidation::Record { entity, version } => {
                self.invalidate_record(entity, *version).await
            }
            Invalidation::Key(key) => self.invalidate(key).await,
            Invalidation::Pattern(prefix) => self.invalidate_pattern(prefix).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tasktrack_core::record::{Actor, EntityData, Task};

    const TTL: Duration = Duration::from_secs(300);
    const OP_TIMEOUT: Duration = Duration::from_millis(250);

    fn manager_with(cache: Arc<dyn Cache>) -> CacheCoherencyManager {
        CacheCoherencyManager::new(cache, TTL, OP_TIMEOUT)
    }

    fn manager() -> (Arc<MemoryCache>, CacheCoherencyManager) {
        let cache = Arc::new(MemoryCache::new(1000));
        (cache.clone(), manager_with(cache))
    }

    fn task(workspace_id: Uuid) -> VersionedRecord {
        VersionedRecord::initial(
            workspace_id,
            Uuid::new_v4(),
            EntityData::Task(Task::new(Uuid::new_v4(), "Cached")),
            &Actor::new("alice"),
        )
    }

    fn bump(record: &VersionedRecord) -> VersionedRecord {
        record.next_version(record.data.clone(), &Actor::new("bob"))
    }

    /// Cache whose every call fails.
    struct BrokenCache;

    #[async_trait]
    impl Cache for BrokenCache {
        async fn get(&self, _: &str) -> CacheResult<Option<Vec<u8>>> {
            Err(CacheError::ConnectionFailed("down".to_string()))
        }
        async fn set(&self, _: &str, _: &[u8], _: Option<Duration>) -> CacheResult<()> {
            Err(CacheError::ConnectionFailed("down".to_string()))
        }
        async fn delete(&self, _: &str) -> CacheResult<()> {
            Err(CacheError::ConnectionFailed("down".to_string()))
        }
        async fn delete_prefix(&self, _: &str) -> CacheResult<()> {
            Err(CacheError::ConnectionFailed("down".to_string()))
        }
        async fn incr(&self, _: &str) -> CacheResult<u64> {
            Err(CacheError::ConnectionFailed("down".to_string()))
        }
        async fn counter(&self, _: &str) -> CacheResult<u64> {
            Err(CacheError::ConnectionFailed("down".to_string()))
        }
        async fn raise_fence(&self, _: &str, _: u64, _: Duration) -> CacheResult<u64> {
            Err(CacheError::ConnectionFailed("down".to_string()))
        }
        async fn fence(&self, _: &str) -> CacheResult<u64> {
            Err(CacheError::ConnectionFailed("down".to_string()))
        }
    }

    /// Cache that never answers.
    struct HangingCache;

    #[async_trait]
    impl Cache for HangingCache {
        async fn get(&self, _: &str) -> CacheResult<Option<Vec<u8>>> {
            std::future::pending().await
        }
        async fn set(&self, _: &str, _: &[u8], _: Option<Duration>) -> CacheResult<()> {
            std::future::pending().await
        }
        async fn delete(&self, _: &str) -> CacheResult<()> {
            std::future::pending().await
        }
        async fn delete_prefix(&self, _: &str) -> CacheResult<()> {
            std::future::pending().await
        }
        async fn incr(&self, _: &str) -> CacheResult<u64> {
            std::future::pending().await
        }
        async fn counter(&self, _: &str) -> CacheResult<u64> {
            std::future::pending().await
        }
        async fn raise_fence(&self, _: &str, _: u64, _: Duration) -> CacheResult<u64> {
            std::future::pending().await
        }
        async fn fence(&self, _: &str) -> CacheResult<u64> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_miss_loads_then_hits() {
        let (_cache, manager) = manager();
        let record = task(Uuid::new_v4());
        let entity = record.entity_ref();
        let loads = AtomicUsize::new(0);

        for _ in 0..3 {
            let loaded = manager
                .get_or_load(&entity, || async {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok(Some(record.clone()))
                })
                .await
                .unwrap();
            assert_eq!(loaded, Some(record.clone()));
        }

        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_and_deleted_records_are_not_cached() {
        let (cache, manager) = manager();
        let record = task(Uuid::new_v4());
        let deleted = record.tombstone(&Actor::new("bob"));
        let entity = record.entity_ref();

        manager.get_or_load(&entity, || async { Ok(None) }).await.unwrap();
        manager
            .get_or_load(&entity, || async { Ok(Some(deleted.clone())) })
            .await
            .unwrap();

        assert!(cache.get(&record_key(&entity)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_loader_errors_are_returned_and_not_cached() {
        let (cache, manager) = manager();
        let entity = task(Uuid::new_v4()).entity_ref();

        let result = manager
            .get_or_load(&entity, || async {
                Err(RepositoryError::ConnectionFailed("db down".to_string()))
            })
            .await;

        assert_eq!(
            result,
            Err(RepositoryError::ConnectionFailed("db down".to_string()))
        );
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_invalidate_record_fences_older_snapshots() {
        let (cache, manager) = manager();
        let v1 = task(Uuid::new_v4());
        let v2 = bump(&v1);
        let entity = v1.entity_ref();

        manager.invalidate_record(&entity, 2).await.unwrap();

        // A slow loader that read v1 before the commit writes it back late.
        let bytes = serialize_record(&CachedRecord::new(v1.clone())).unwrap();
        cache.set(&record_key(&entity), &bytes, Some(TTL)).await.unwrap();

        let loaded = manager
            .get_or_load(&entity, || async { Ok(Some(v2.clone())) })
            .await
            .unwrap();
        assert_eq!(loaded, Some(v2.clone()));

        let cached = manager
            .get_or_load(&entity, || async {
                Err(RepositoryError::QueryFailed("expected a cache hit".to_string()))
            })
            .await
            .unwrap();
        assert_eq!(cached, Some(v2));
    }

    #[tokio::test]
    async fn test_fences_never_move_backwards() {
        let (cache, manager) = manager();
        let entity = task(Uuid::new_v4()).entity_ref();

        manager.invalidate_record(&entity, 5).await.unwrap();
        manager
            .apply(&Invalidation::Record { entity, version: 3 })
            .await
            .unwrap();

        assert_eq!(cache.fence(&fence_key(&entity)).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_fence_holds_when_the_cache_is_full() {
        let cache = Arc::new(MemoryCache::new(2));
        let manager = manager_with(cache.clone());
        let v1 = task(Uuid::new_v4());
        let v2 = bump(&v1);
        let entity = v1.entity_ref();

        manager.invalidate_record(&entity, 2).await.unwrap();
        for other in [task(Uuid::new_v4()), task(Uuid::new_v4())] {
            let bytes = serialize_record(&CachedRecord::new(other.clone())).unwrap();
            cache
                .set(&record_key(&other.entity_ref()), &bytes, Some(TTL))
                .await
                .unwrap();
        }

        // A slow loader that read v1 before the commit writes it back late.
        let bytes = serialize_record(&CachedRecord::new(v1.clone())).unwrap();
        cache.set(&record_key(&entity), &bytes, Some(TTL)).await.unwrap();

        let loaded = manager
            .get_or_load(&entity, || async { Ok(Some(v2.clone())) })
            .await
            .unwrap();
        assert_eq!(loaded.map(|record| record.version), Some(2));
    }

    #[tokio::test]
    async fn test_invalidate_is_idempotent() {
        let (_cache, manager) = manager();
        manager.invalidate("ws:1:task:1").await.unwrap();
        manager.invalidate("ws:1:task:1").await.unwrap();
    }

    #[tokio::test]
    async fn test_list_is_reloaded_after_pattern_invalidation() {
        let (_cache, manager) = manager();
        let workspace_id = Uuid::new_v4();
        let query = ListQuery::new(workspace_id, EntityType::Task);
        let first = vec![task(workspace_id)];
        let second = vec![task(workspace_id), task(workspace_id)];

        let loaded = manager
            .get_or_load_list(&query, || async { Ok(first.clone()) })
            .await
            .unwrap();
        assert_eq!(loaded, first);

        let cached = manager
            .get_or_load_list(&query, || async { Ok(second.clone()) })
            .await
            .unwrap();
        assert_eq!(cached, first);

        manager
            .apply(&Invalidation::lists_of(workspace_id, EntityType::Task))
            .await
            .unwrap();

        let reloaded = manager
            .get_or_load_list(&query, || async { Ok(second.clone()) })
            .await
            .unwrap();
        assert_eq!(reloaded, second);
    }

    #[tokio::test]
    async fn test_list_loaded_before_epoch_bump_is_not_served() {
        let (cache, manager) = manager();
        let workspace_id = Uuid::new_v4();
        let query = ListQuery::new(workspace_id, EntityType::Task);
        let namespace = list_namespace(workspace_id, EntityType::Task);

        // Entry written by a load that started before the bump.
        let stale = CachedList {
            epoch: 0,
            records: vec![task(workspace_id)],
        };
        cache.incr(&list_epoch_key(&namespace)).await.unwrap();
        cache
            .set(&list_key(&query), &serialize_list(&stale).unwrap(), Some(TTL))
            .await
            .unwrap();

        let loaded = manager
            .get_or_load_list(&query, || async { Ok(Vec::new()) })
            .await
            .unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn test_invalidating_one_type_keeps_other_lists() {
        let (_cache, manager) = manager();
        let workspace_id = Uuid::new_v4();
        let projects = ListQuery::new(workspace_id, EntityType::Project);
        let cached = vec![task(workspace_id)];

        manager
            .get_or_load_list(&projects, || async { Ok(cached.clone()) })
            .await
            .unwrap();
        manager
            .invalidate_pattern(&list_prefix(workspace_id, EntityType::Task))
            .await
            .unwrap();

        let still_cached = manager
            .get_or_load_list(&projects, || async { Ok(Vec::new()) })
            .await
            .unwrap();
        assert_eq!(still_cached, cached);
    }

    #[tokio::test]
    async fn test_broken_cache_falls_back_to_loader() {
        let manager = manager_with(Arc::new(BrokenCache));
        let record = task(Uuid::new_v4());
        let entity = record.entity_ref();

        let loaded = manager
            .get_or_load(&entity, || async { Ok(Some(record.clone())) })
            .await
            .unwrap();
        assert_eq!(loaded, Some(record.clone()));

        let listed = manager
            .get_or_load_list(&ListQuery::new(record.workspace_id, EntityType::Task), || async {
                Ok(vec![record.clone()])
            })
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);

        assert!(manager.invalidate_record(&entity, 2).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_cache_times_out() {
        let manager = manager_with(Arc::new(HangingCache));
        let record = task(Uuid::new_v4());
        let entity = record.entity_ref();

        let loaded = manager
            .get_or_load(&entity, || async { Ok(Some(record.clone())) })
            .await
            .unwrap();
        assert_eq!(loaded, Some(record));

        assert_eq!(
            manager.invalidate("ws:1:task:1").await,
            Err(CacheError::Timeout(OP_TIMEOUT))
        );
    }

    #[tokio::test]
    async fn test_concurrent_misses_collapse_to_one_load() {
        let (_cache, manager) = manager();
        let manager = Arc::new(manager);
        let record = task(Uuid::new_v4());
        let entity = record.entity_ref();
        let loads = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(tokio::sync::Barrier::new(50));

        let mut handles = Vec::new();
        for _ in 0..50 {
            let manager = manager.clone();
            let loads = loads.clone();
            let barrier = barrier.clone();
            let record = record.clone();
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                manager
                    .get_or_load(&entity, || async {
                        loads.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(Some(record))
                    })
                    .await
            }));
        }

        for handle in handles {
            assert!(handle.await.unwrap().unwrap().is_some());
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }
}
