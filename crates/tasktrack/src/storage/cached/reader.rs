use std::sync::Arc;
use std::time::Duration;

use tasktrack_core::record::{EntityRef, VersionedRecord};
use tasktrack_core::storage::{DurableStore, ListQuery, Result};

use crate::coherency::CacheCoherencyManager;
use crate::storage::with_deadline;

/// Read-side companion of the mutation pipeline.
#[derive(Clone)]
pub struct CachedReader {
    store: Arc<dyn DurableStore>,
    coherency: Arc<CacheCoherencyManager>,
    store_timeout: Duration,
}

impl CachedReader {
    pub fn new(
        store: Arc<dyn DurableStore>,
        coherency: Arc<CacheCoherencyManager>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            coherency,
            store_timeout,
        }
    }

    /// Reads a live record. Soft-deleted records read as absent.
    pub async fn get(&self, entity: &EntityRef) -> Result<Option<VersionedRecord>> {
        let store = self.store.clone();
        let deadline = self.store_timeout;
        let target = *entity;

        let record = self
            .coherency
            .get_or_load(entity, || async move {
                with_deadline(deadline, store.read(&target)).await
            })
            .await?;

        Ok(record.filter(|record| !record.is_deleted()))
    }

    /// Lists the records matching a query, oldest first.
    pub async fn list(&self, query: &ListQuery) -> Result<Vec<VersionedRecord>> {
        let store = self.store.clone();
        let deadline = self.store_timeout;
        let target = *query;

        self.coherency
            .get_or_load_list(query, || async move {
                with_deadline(deadline, store.list(&target)).await
            })
            .await
    }
}
