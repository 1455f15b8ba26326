use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::RecordError;

/// The kinds of versioned entities the tracker mutates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Task,
    Project,
    Comment,
}

impl EntityType {
    /// Returns the stable lowercase name used in keys and storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Task => "task",
            EntityType::Project => "project",
            EntityType::Comment => "comment",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = RecordError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "task" => Ok(EntityType::Task),
            "project" => Ok(EntityType::Project),
            "comment" => Ok(EntityType::Comment),
            other => Err(RecordError::UnknownEntityType(other.to_string())),
        }
    }
}

/// Identifies one record: tenant scope, entity type and id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub workspace_id: Uuid,
    pub entity_type: EntityType,
    pub id: Uuid,
}

impl EntityRef {
    pub fn new(workspace_id: Uuid, entity_type: EntityType, id: Uuid) -> Self {
        Self {
            workspace_id,
            entity_type,
            id,
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.workspace_id, self.entity_type, self.id)
    }
}

/// Opaque identity of whoever performs a mutation, recorded for audit only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Actor(String);

impl Actor {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Actor {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Workflow state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    InReview,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

/// A unit of work inside a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub project_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,
    pub assignee: Option<String>,
    pub due_date: Option<NaiveDate>,
}

impl Task {
    /// Creates a new task in the given project with default status and priority.
    pub fn new(project_id: Uuid, title: impl Into<String>) -> Self {
        Self {
            project_id,
            title: title.into(),
            description: None,
            status: TaskStatus::default(),
            priority: Priority::default(),
            assignee: None,
            due_date: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_assignee(mut self, assignee: impl Into<String>) -> Self {
        self.assignee = Some(assignee.into());
        self
    }

    pub fn with_due_date(mut self, due_date: NaiveDate) -> Self {
        self.due_date = Some(due_date);
        self
    }
}

/// A named container of tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub archived: bool,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            archived: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A remark attached to a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub task_id: Uuid,
    pub body: String,
}

impl Comment {
    pub fn new(task_id: Uuid, body: impl Into<String>) -> Self {
        Self {
            task_id,
            body: body.into(),
        }
    }
}

/// The entity-specific payload of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntityData {
    Task(Task),
    Project(Project),
    Comment(Comment),
}

impl EntityData {
    pub fn entity_type(&self) -> EntityType {
        match self {
            EntityData::Task(_) => EntityType::Task,
            EntityData::Project(_) => EntityType::Project,
            EntityData::Comment(_) => EntityType::Comment,
        }
    }

    /// Returns the id of the owning record used to scope list queries.
    ///
    /// Tasks belong to a project, comments to a task; projects have no parent.
    pub fn parent_id(&self) -> Option<Uuid> {
        match self {
            EntityData::Task(task) => Some(task.project_id),
            EntityData::Project(_) => None,
            EntityData::Comment(comment) => Some(comment.task_id),
        }
    }
}

/// A mutable entity together with its optimistic version and audit fields.
///
/// `version` starts at 1 and grows by exactly one on every successful
/// mutation. Only the durable store writes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedRecord {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub version: u64,
    pub data: EntityData,
    pub created_by: Actor,
    pub created_at: DateTime<Utc>,
    pub updated_by: Actor,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl VersionedRecord {
    /// Builds the first version of a record.
    pub fn initial(workspace_id: Uuid, id: Uuid, data: EntityData, actor: &Actor) -> Self {
        let now = Utc::now();
        Self {
            id,
            workspace_id,
            version: 1,
            data,
            created_by: actor.clone(),
            created_at: now,
            updated_by: actor.clone(),
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn entity_type(&self) -> EntityType {
        self.data.entity_type()
    }

    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(self.workspace_id, self.entity_type(), self.id)
    }

    pub fn parent_id(&self) -> Option<Uuid> {
        self.data.parent_id()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Returns the successor of this record with bumped version and audit fields.
    pub fn next_version(&self, data: EntityData, actor: &Actor) -> Self {
        Self {
            version: self.version + 1,
            data,
            updated_by: actor.clone(),
            updated_at: Utc::now(),
            ..self.clone()
        }
    }

    /// Returns the soft-deleted successor of this record.
    pub fn tombstone(&self, actor: &Actor) -> Self {
        let now = Utc::now();
        Self {
            version: self.version + 1,
            updated_by: actor.clone(),
            updated_at: now,
            deleted_at: Some(now),
            ..self.clone()
        }
    }
}
