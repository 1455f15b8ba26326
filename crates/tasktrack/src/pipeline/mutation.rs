use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use tasktrack_core::cache::record_key;
use tasktrack_core::lock::{resource_key, ReleaseOutcome};
use tasktrack_core::mutation::{MutationOutcome, PipelineState};
use tasktrack_core::record::{validate_data, Actor, EntityData, EntityRef, Patch, VersionedRecord};
use tasktrack_core::storage::{
    AuditAction, AuditEntry, DurableStore, NewRecord, RepositoryError, Result, WriteOutcome,
};

use super::run::Run;
use crate::coherency::{CacheCoherencyManager, Invalidation, InvalidationQueue};
use crate::lock::{LeaseGuard, LockCoordinator};
use crate::storage::with_deadline;

/// Deadlines of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Lease TTL; longer than the expected run, bounded so a crashed holder
    /// cannot starve others.
    pub lock_ttl: Duration,
    pub store_timeout: Duration,
    pub audit_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            lock_ttl: Duration::from_secs(10),
            store_timeout: Duration::from_secs(2),
            audit_timeout: Duration::from_secs(1),
        }
    }
}

/// What the conditional write did.
enum Committed {
    Applied {
        before: Option<VersionedRecord>,
        after: VersionedRecord,
    },
    Rejected(MutationOutcome),
}

impl From<WriteOutcome> for Committed {
    fn from(outcome: WriteOutcome) -> Self {
        match outcome {
            WriteOutcome::Applied { before, after } => Committed::Applied {
                before: Some(before),
                after,
            },
            WriteOutcome::VersionConflict { current_version } => {
                Committed::Rejected(MutationOutcome::Conflict { current_version })
            }
            WriteOutcome::NotFound => Committed::Rejected(MutationOutcome::NotFound),
        }
    }
}

/// Serialized, versioned and cache-coherent mutations.
///
/// The lease only serializes editors of one record. The store's version
/// compare is what prevents lost updates, so a run whose lease expired
/// mid-flight still cannot overwrite a newer version.
#[derive(Clone)]
pub struct MutationPipeline {
    store: Arc<dyn DurableStore>,
    locks: LockCoordinator,
    coherency: Arc<CacheCoherencyManager>,
    retries: InvalidationQueue,
    settings: PipelineSettings,
}

impl MutationPipeline {
    pub fn new(
        store: Arc<dyn DurableStore>,
        locks: LockCoordinator,
        coherency: Arc<CacheCoherencyManager>,
        retries: InvalidationQueue,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            locks,
            coherency,
            retries,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Creates a record at version 1.
    pub async fn create(
        &self,
        workspace_id: Uuid,
        data: EntityData,
        actor: &Actor,
    ) -> MutationOutcome {
        let record = NewRecord::new(workspace_id, data, actor.clone());
        let entity = record.entity_ref();

        if let Err(err) = validate_data(&record.data) {
            return Run::new("create", entity).fail(MutationOutcome::Invalid {
                reason: err.to_string(),
            });
        }

        self.execute("create", entity, AuditAction::Created, actor, || async {
            self.store
                .create(record)
                .await
                .map(|created| Committed::Applied {
                    before: None,
                    after: created,
                })
        })
        .await
    }

    /// Applies `patch` if the record is live and still at `expected_version`.
    pub async fn update(
        &self,
        entity: &EntityRef,
        expected_version: u64,
        patch: &Patch,
        actor: &Actor,
    ) -> MutationOutcome {
        if patch.entity_type() != entity.entity_type {
            return Run::new("update", *entity).fail(MutationOutcome::Invalid {
                reason: format!(
                    "Cannot apply a {} patch to a {}",
                    patch.entity_type(),
                    entity.entity_type
                ),
            });
        }

        self.execute("update", *entity, AuditAction::Updated, actor, || async {
            self.store
                .update_if(entity, expected_version, patch, actor)
                .await
                .map(Committed::from)
        })
        .await
    }

    /// Soft-deletes the record if it is live and still at `expected_version`.
    pub async fn delete(
        &self,
        entity: &EntityRef,
        expected_version: u64,
        actor: &Actor,
    ) -> MutationOutcome {
        self.execute("delete", *entity, AuditAction::Deleted, actor, || async {
            self.store
                .soft_delete(entity, expected_version, actor)
                .await
                .map(Committed::from)
        })
        .await
    }

    async fn execute<W, Fut>(
        &self,
        operation: &'static str,
        entity: EntityRef,
        action: AuditAction,
        actor: &Actor,
        write: W,
    ) -> MutationOutcome
    where
        W: FnOnce() -> Fut,
        Fut: Future<Output = Result<Committed>>,
    {
        let mut run = Run::new(operation, entity);

        run.advance(PipelineState::LockAcquiring);
        let guard = match self
            .locks
            .lock(&resource_key(&entity), self.settings.lock_ttl)
            .await
        {
            Ok(Some(guard)) => guard,
            Ok(None) => return run.fail(MutationOutcome::Busy),
            Err(err) => {
                tracing::warn!(%entity, error = %err, "Lease backend failed, reporting busy");
                return run.fail(MutationOutcome::Busy);
            }
        };
        run.advance(PipelineState::LockHeld);

        run.advance(PipelineState::Writing);
        let outcome = match with_deadline(self.settings.store_timeout, write()).await {
            Ok(Committed::Applied { before, after }) => {
                self.after_commit(&mut run, action, before, after, actor)
                    .await
            }
            Ok(Committed::Rejected(outcome)) => run.fail(outcome),
            Err(RepositoryError::Timeout(timeout)) => {
                tracing::warn!(%entity, ?timeout, "Store write timed out, outcome unknown");
                self.invalidate_uncertain(&entity).await;
                run.fail(MutationOutcome::StoreTimeout)
            }
            Err(RepositoryError::InvalidData(reason)) => {
                run.fail(MutationOutcome::Invalid { reason })
            }
            Err(err) => run.fail(MutationOutcome::InternalError {
                detail: err.to_string(),
            }),
        };

        self.release(guard, &entity).await;
        outcome
    }

    async fn after_commit(
        &self,
        run: &mut Run,
        action: AuditAction,
        before: Option<VersionedRecord>,
        after: VersionedRecord,
        actor: &Actor,
    ) -> MutationOutcome {
        run.advance(PipelineState::Invalidating);
        let entity = after.entity_ref();
        self.invalidate_or_enqueue(Invalidation::Record {
            entity,
            version: after.version,
        })
        .await;
        self.invalidate_or_enqueue(Invalidation::lists_of(
            after.workspace_id,
            after.entity_type(),
        ))
        .await;

        run.advance(PipelineState::Auditing);
        let entry = AuditEntry::new(action, before, after.clone(), actor);
        let audit = with_deadline(self.settings.audit_timeout, self.store.append_audit(&entry)).await;
        if let Err(err) = audit {
            tracing::warn!(
                %entity,
                version = after.version,
                action = action.as_str(),
                error = %err,
                "Failed to append audit entry"
            );
        }

        run.advance(PipelineState::Done);
        tracing::debug!(
            %entity,
            version = after.version,
            action = action.as_str(),
            "Mutation committed"
        );
        MutationOutcome::success(after)
    }

    /// The write may have committed; drop whatever the cache holds for it.
    async fn invalidate_uncertain(&self, entity: &EntityRef) {
        self.invalidate_or_enqueue(Invalidation::Key(record_key(entity)))
            .await;
        self.invalidate_or_enqueue(Invalidation::lists_of(
            entity.workspace_id,
            entity.entity_type,
        ))
        .await;
    }

    async fn invalidate_or_enqueue(&self, invalidation: Invalidation) {
        let Err(err) = self.coherency.apply(&invalidation).await else {
            return;
        };

        tracing::warn!(?invalidation, error = %err, "Invalidation failed, scheduling retry");
        if !self.retries.enqueue(invalidation) {
            tracing::warn!("Invalidation retry worker stopped, entry will expire with its TTL");
        }
    }

    async fn release(&self, guard: LeaseGuard, entity: &EntityRef) {
        if guard.has_expired() {
            tracing::warn!(
                %entity,
                elapsed = ?guard.elapsed(),
                ttl = ?guard.ttl(),
                "Mutation outlived its lease"
            );
        }

        match guard.release().await {
            Ok(ReleaseOutcome::Released) => {}
            Ok(ReleaseOutcome::NotHeld) => {
                tracing::warn!(%entity, "Lease was no longer held at release");
            }
            Err(err) => {
                tracing::warn!(%entity, error = %err, "Failed to release lease");
            }
        }
    }
}
