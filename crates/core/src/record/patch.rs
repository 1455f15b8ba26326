//! Partial updates for versioned records.
//!
//! A patch only carries the fields the caller wants to change. Applying it
//! is a pure operation on [`EntityData`]; the durable store runs it inside
//! its conditional update so the patch always lands on the version the
//! caller expected.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::RecordError;
use super::types::{EntityData, EntityType, Priority, TaskStatus};

/// Changes to a task. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    /// Moves the task to another project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<Uuid>,
}

impl TaskPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
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

    pub fn with_project_id(mut self, project_id: Uuid) -> Self {
        self.project_id = Some(project_id);
        self
    }
}

/// Changes to a project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived: Option<bool>,
}

impl ProjectPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_archived(mut self, archived: bool) -> Self {
        self.archived = Some(archived);
        self
    }
}

/// Changes to a comment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl CommentPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// A patch for any entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Patch {
    Task(TaskPatch),
    Project(ProjectPatch),
    Comment(CommentPatch),
}

impl Patch {
    pub fn entity_type(&self) -> EntityType {
        match self {
            Patch::Task(_) => EntityType::Task,
            Patch::Project(_) => EntityType::Project,
            Patch::Comment(_) => EntityType::Comment,
        }
    }

    /// Applies the patch to a payload of the same entity type.
    ///
    /// The payload is left untouched when the types differ.
    pub fn apply_to(&self, data: &mut EntityData) -> Result<(), RecordError> {
        match (self, data) {
            (Patch::Task(patch), EntityData::Task(task)) => {
                if let Some(title) = &patch.title {
                    task.title = title.clone();
                }
                if let Some(description) = &patch.description {
                    task.description = Some(description.clone());
                }
                if let Some(status) = patch.status {
                    task.status = status;
                }
                if let Some(priority) = patch.priority {
                    task.priority = priority;
                }
                if let Some(assignee) = &patch.assignee {
                    task.assignee = Some(assignee.clone());
                }
                if let Some(due_date) = patch.due_date {
                    task.due_date = Some(due_date);
                }
                if let Some(project_id) = patch.project_id {
                    task.project_id = project_id;
                }
                Ok(())
            }
            (Patch::Project(patch), EntityData::Project(project)) => {
                if let Some(name) = &patch.name {
                    project.name = name.clone();
                }
                if let Some(description) = &patch.description {
                    project.description = Some(description.clone());
                }
                if let Some(archived) = patch.archived {
                    project.archived = archived;
                }
                Ok(())
            }
            (Patch::Comment(patch), EntityData::Comment(comment)) => {
                if let Some(body) = &patch.body {
                    comment.body = body.clone();
                }
                Ok(())
            }
            (patch, data) => Err(RecordError::PatchTypeMismatch {
                expected: data.entity_type(),
                found: patch.entity_type(),
            }),
        }
    }
}
