//! Application state wiring.
//!
//! Constructs the backends once, injects them into the coherency manager,
//! lock coordinator, pipeline and reader, and owns the lifetime of the
//! invalidation retry worker. Backends are chosen by feature flags.

use std::sync::Arc;

use tasktrack_core::cache::Cache;
use tasktrack_core::lock::LeaseStore;
use tasktrack_core::storage::DurableStore;

use crate::coherency::{CacheCoherencyManager, InvalidationRetrier};
use crate::config::Config;
use crate::lock::LockCoordinator;
use crate::pipeline::MutationPipeline;
use crate::storage::CachedReader;

/// Shared application state.
///
/// Everything callers touch is behind cheap clones; the retry worker is
/// stopped through [`AppState::shutdown`].
pub struct AppState {
    /// Durable store, used directly for audit history.
    pub store: Arc<dyn DurableStore>,
    /// Create, update and delete.
    pub pipeline: MutationPipeline,
    /// Cache-first point and list reads.
    pub reader: CachedReader,
    pub coherency: Arc<CacheCoherencyManager>,
    retrier: InvalidationRetrier,
}

impl AppState {
    /// Wires the given backends together.
    ///
    /// Must be called inside a Tokio runtime: the retry worker is spawned here.
    pub fn build(
        store: Arc<dyn DurableStore>,
        cache: Arc<dyn Cache>,
        leases: Arc<dyn LeaseStore>,
        config: &Config,
    ) -> Self {
        let coherency = Arc::new(CacheCoherencyManager::new(
            cache,
            config.cache_ttl(),
            config.cache_op_timeout(),
        ));
        let retrier =
            InvalidationRetrier::spawn(coherency.clone(), config.invalidation_retry_policy());
        let locks = LockCoordinator::new(leases, config.lock_policy())
            .with_op_timeout(config.cache_op_timeout());

        let pipeline = MutationPipeline::new(
            store.clone(),
            locks,
            coherency.clone(),
            retrier.queue(),
            config.pipeline_settings(),
        );
        let reader = CachedReader::new(store.clone(), coherency.clone(), config.store_timeout());

        Self {
            store,
            pipeline,
            reader,
            coherency,
            retrier,
        }
    }

    /// Connects the feature-selected backends and builds the state.
    pub async fn from_config(config: &Config) -> Result<Self, anyhow::Error> {
        let store = backends::open_store(config).await?;
        let (cache, leases) = backends::open_shared(config).await?;

        tracing::info!(
            cache_ttl_seconds = config.cache_ttl_seconds,
            lock_ttl_ms = config.lock_ttl_ms,
            "Application state ready"
        );

        Ok(Self::build(store, cache, leases, config))
    }

    /// Stops the retry worker after it drains queued invalidations.
    pub async fn shutdown(self) {
        self.retrier.shutdown().await;
    }
}

// ============================================================================
// Backend factories for the enabled features
// ============================================================================

mod backends {
    use super::*;

    #[cfg(feature = "sqlite")]
    pub(super) async fn open_store(config: &Config) -> Result<Arc<dyn DurableStore>, anyhow::Error> {
        use crate::storage::SqliteStore;

        let store = SqliteStore::new(&config.sqlite_path).await?;
        tracing::debug!(path = %config.sqlite_path, "Opened SQLite store");
        Ok(Arc::new(store))
    }

    #[cfg(not(feature = "sqlite"))]
    pub(super) async fn open_store(_config: &Config) -> Result<Arc<dyn DurableStore>, anyhow::Error> {
        use crate::storage::InMemoryStore;

        tracing::warn!("SQLite disabled, records live only for this process");
        Ok(Arc::new(InMemoryStore::new()))
    }

    #[cfg(feature = "redis")]
    pub(super) async fn open_shared(
        config: &Config,
    ) -> Result<(Arc<dyn Cache>, Arc<dyn LeaseStore>), anyhow::Error> {
        use crate::cache::RedisCache;
        use crate::lock::RedisLeaseStore;

        let cache = RedisCache::new(&config.redis_url).await?;
        let leases = RedisLeaseStore::from_connection(cache.connection());
        tracing::debug!(url = %config.redis_url, "Connected to Redis");
        Ok((Arc::new(cache), Arc::new(leases)))
    }

    #[cfg(not(feature = "redis"))]
    pub(super) async fn open_shared(
        config: &Config,
    ) -> Result<(Arc<dyn Cache>, Arc<dyn LeaseStore>), anyhow::Error> {
        use crate::cache::MemoryCache;
        use crate::lock::MemoryLeaseStore;

        let cache = MemoryCache::new(config.cache_max_entries);
        Ok((Arc::new(cache), Arc::new(MemoryLeaseStore::new())))
    }
}
