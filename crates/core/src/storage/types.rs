use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::record::{Actor, EntityData, EntityRef, EntityType, VersionedRecord};

/// A record about to be created. The store assigns version 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub data: EntityData,
    pub actor: Actor,
}

impl NewRecord {
    /// Creates a new record with a freshly generated id.
    pub fn new(workspace_id: Uuid, data: EntityData, actor: Actor) -> Self {
        Self {
            id: Uuid::new_v4(),
            workspace_id,
            data,
            actor,
        }
    }

    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(self.workspace_id, self.data.entity_type(), self.id)
    }

    pub fn into_record(self) -> VersionedRecord {
        VersionedRecord::initial(self.workspace_id, self.id, self.data, &self.actor)
    }
}

/// Result of a conditional write (update or soft delete).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The expected version matched and the write committed.
    Applied {
        before: VersionedRecord,
        after: VersionedRecord,
    },
    /// The record exists but its version differs from the expected one.
    VersionConflict { current_version: u64 },
    /// The record does not exist or is already soft-deleted.
    NotFound,
}

impl WriteOutcome {
    /// Decides the outcome of a conditional write against the current row.
    ///
    /// Soft-deleted rows read as missing, so deleting twice yields
    /// `NotFound` rather than a conflict.
    pub fn precheck(current: Option<&VersionedRecord>, expected_version: u64) -> Option<Self> {
        match current {
            None => Some(WriteOutcome::NotFound),
            Some(record) if record.is_deleted() => Some(WriteOutcome::NotFound),
            Some(record) if record.version != expected_version => {
                Some(WriteOutcome::VersionConflict {
                    current_version: record.version,
                })
            }
            Some(_) => None,
        }
    }
}

/// A list query over one entity type inside a workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListQuery {
    pub workspace_id: Uuid,
    pub entity_type: EntityType,
    /// Restricts the result to children of this record (tasks of a project,
    /// comments of a task).
    pub parent_id: Option<Uuid>,
    pub include_deleted: bool,
}

impl ListQuery {
    pub fn new(workspace_id: Uuid, entity_type: EntityType) -> Self {
        Self {
            workspace_id,
            entity_type,
            parent_id: None,
            include_deleted: false,
        }
    }

    pub fn with_parent(mut self, parent_id: Uuid) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn including_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }

    /// Returns true if the record belongs to this query's result set.
    pub fn matches(&self, record: &VersionedRecord) -> bool {
        record.workspace_id == self.workspace_id
            && record.entity_type() == self.entity_type
            && self.parent_id.is_none_or(|id| record.parent_id() == Some(id))
            && (self.include_deleted || !record.is_deleted())
    }

    /// Stable string identifying the query within its namespace.
    pub fn fingerprint(&self) -> String {
        let parent = self
            .parent_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "any".to_string());
        format!("parent={}:deleted={}", parent, u8::from(self.include_deleted))
    }
}

/// What a mutation did, as recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Created,
    Updated,
    Deleted,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Created => "created",
            AuditAction::Updated => "updated",
            AuditAction::Deleted => "deleted",
        }
    }
}

impl std::str::FromStr for AuditAction {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value {
            "created" => Ok(AuditAction::Created),
            "updated" => Ok(AuditAction::Updated),
            "deleted" => Ok(AuditAction::Deleted),
            other => Err(format!("Unknown audit action: {other}")),
        }
    }
}

/// Append-only record of one successful mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub action: AuditAction,
    /// The record version produced by the mutation.
    pub version: u64,
    pub before: Option<VersionedRecord>,
    pub after: Option<VersionedRecord>,
    pub actor: Actor,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    /// Builds an audit entry for a committed mutation.
    pub fn new(
        action: AuditAction,
        before: Option<VersionedRecord>,
        after: VersionedRecord,
        actor: &Actor,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            workspace_id: after.workspace_id,
            entity_type: after.entity_type(),
            entity_id: after.id,
            action,
            version: after.version,
            before,
            after: Some(after),
            actor: actor.clone(),
            recorded_at: Utc::now(),
        }
    }

    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(self.workspace_id, self.entity_type, self.entity_id)
    }
}
