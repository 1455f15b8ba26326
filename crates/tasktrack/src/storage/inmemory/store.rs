use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use tasktrack_core::record::{apply_patch, validate_data, Actor, EntityRef, Patch, VersionedRecord};
use tasktrack_core::storage::{
    AuditEntry, DurableStore, ListQuery, NewRecord, RepositoryError, Result, WriteOutcome,
};

/// In-memory implementation of [`DurableStore`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    records: Arc<RwLock<HashMap<Uuid, VersionedRecord>>>,
    audit: Arc<RwLock<Vec<AuditEntry>>>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn matches_ref(record: &VersionedRecord, entity: &EntityRef) -> bool {
    record.workspace_id == entity.workspace_id && record.entity_type() == entity.entity_type
}

#[async_trait]
impl DurableStore for InMemoryStore {
    async fn read(&self, entity: &EntityRef) -> Result<Option<VersionedRecord>> {
        let records = self.records.read().await;
        Ok(records
            .get(&entity.id)
            .filter(|record| matches_ref(record, entity))
            .cloned())
    }

    async fn list(&self, query: &ListQuery) -> Result<Vec<VersionedRecord>> {
        let records = self.records.read().await;
        let mut result: Vec<VersionedRecord> = records
            .values()
            .filter(|record| query.matches(record))
            .cloned()
            .collect();
        result.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(result)
    }

    async fn create(&self, record: NewRecord) -> Result<VersionedRecord> {
        validate_data(&record.data)?;

        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(RepositoryError::AlreadyExists {
                entity_type: record.data.entity_type().as_str(),
                id: record.id.to_string(),
            });
        }

        let created = record.into_record();
        records.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_if(
        &self,
        entity: &EntityRef,
        expected_version: u64,
        patch: &Patch,
        actor: &Actor,
    ) -> Result<WriteOutcome> {
        let mut records = self.records.write().await;
        let current = records
            .get(&entity.id)
            .filter(|record| matches_ref(record, entity));

        if let Some(outcome) = WriteOutcome::precheck(current, expected_version) {
            return Ok(outcome);
        }
        let Some(before) = current.cloned() else {
            return Ok(WriteOutcome::NotFound);
        };

        let after = apply_patch(&before, patch, actor)?;
        records.insert(after.id, after.clone());
        Ok(WriteOutcome::Applied { before, after })
    }

    async fn soft_delete(
        &self,
        entity: &EntityRef,
        expected_version: u64,
        actor: &Actor,
    ) -> Result<WriteOutcome> {
        let mut records = self.records.write().await;
        let current = records
            .get(&entity.id)
            .filter(|record| matches_ref(record, entity));

        if let Some(outcome) = WriteOutcome::precheck(current, expected_version) {
            return Ok(outcome);
        }
        let Some(before) = current.cloned() else {
            return Ok(WriteOutcome::NotFound);
        };

        let after = before.tombstone(actor);
        records.insert(after.id, after.clone());
        Ok(WriteOutcome::Applied { before, after })
    }

    async fn append_audit(&self, entry: &AuditEntry) -> Result<()> {
        let mut audit = self.audit.write().await;
        audit.push(entry.clone());
        Ok(())
    }

    async fn audit_trail(&self, entity: &EntityRef) -> Result<Vec<AuditEntry>> {
        let audit = self.audit.read().await;
        Ok(audit
            .iter()
            .filter(|entry| entry.entity_ref() == *entity)
            .cloned()
            .collect())
    }
}
