use async_trait::async_trait;

use crate::record::{Actor, EntityRef, Patch, VersionedRecord};

use super::{AuditEntry, ListQuery, NewRecord, Result, WriteOutcome};

/// The primary database behind the tracker.
///
/// The store is the only component that persists records and the only one
/// allowed to advance `version`. Conditional writes must be a single atomic
/// operation at the storage layer.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Reads a record, including soft-deleted ones.
    async fn read(&self, entity: &EntityRef) -> Result<Option<VersionedRecord>>;

    /// Lists the records matching a query, oldest first.
    async fn list(&self, query: &ListQuery) -> Result<Vec<VersionedRecord>>;

    /// Persists a new record at version 1.
    async fn create(&self, record: NewRecord) -> Result<VersionedRecord>;

    /// Applies a patch if the record is live and at `expected_version`.
    ///
    /// On success the record moves to `expected_version + 1`.
    async fn update_if(
        &self,
        entity: &EntityRef,
        expected_version: u64,
        patch: &Patch,
        actor: &Actor,
    ) -> Result<WriteOutcome>;

    /// Soft-deletes a record with the same conditional semantics as `update_if`.
    async fn soft_delete(
        &self,
        entity: &EntityRef,
        expected_version: u64,
        actor: &Actor,
    ) -> Result<WriteOutcome>;

    /// Appends an entry to the audit trail.
    async fn append_audit(&self, entry: &AuditEntry) -> Result<()>;

    /// Returns the audit trail of a record, oldest first.
    async fn audit_trail(&self, entity: &EntityRef) -> Result<Vec<AuditEntry>>;
}
