//! Command-line interface of the `tasktrack` binary.
//!
//! Each invocation runs one command against the configured backends and
//! prints its result as JSON.

use anyhow::Context;
use chrono::NaiveDate;
use serde_json::{json, Value};
use uuid::Uuid;

use tasktrack_core::mutation::MutationOutcome;
use tasktrack_core::record::{
    Actor, Comment, EntityData, EntityRef, EntityType, Patch, Priority, Project, ProjectPatch,
    Task, TaskPatch, TaskStatus,
};
use tasktrack_core::storage::{repository_error_to_status_code, ListQuery, RepositoryError};

use crate::config::Config;
use crate::state::AppState;

/// tasktrack - Versioned, conflict-safe edits of tasks, projects and comments
#[derive(Debug, clap::Parser)]
#[command(name = "tasktrack")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Workspace every command operates in.
    #[arg(long, short, global = true, value_name = "UUID", env = "TASKTRACK_WORKSPACE")]
    pub workspace: Option<Uuid>,

    /// Identity recorded in the audit trail.
    #[arg(long, global = true, default_value = "cli", env = "TASKTRACK_ACTOR")]
    pub actor: String,

    /// Path to the SQLite database file.
    #[arg(long, global = true, value_name = "PATH", env = "SQLITE_PATH")]
    pub sqlite_path: Option<String>,

    /// Redis connection URL.
    #[arg(long, global = true, value_name = "URL", env = "REDIS_URL")]
    pub redis_url: Option<String>,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value = "text", env = "LOG_FORMAT")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Available commands.
#[derive(Debug, clap::Subcommand)]
pub enum Command {
    /// Create a project.
    CreateProject(CreateProjectArgs),

    /// Create a task inside a project.
    CreateTask(CreateTaskArgs),

    /// Comment on a task.
    Comment(CommentArgs),

    /// Update a task at a known version.
    UpdateTask(UpdateTaskArgs),

    /// Update a project at a known version.
    UpdateProject(UpdateProjectArgs),

    /// Soft-delete a record at a known version.
    Delete(DeleteArgs),

    /// Show a live record.
    Get(TargetArgs),

    /// List records of one type.
    List(ListArgs),

    /// Show the audit trail of a record.
    History(TargetArgs),
}

#[derive(Debug, clap::Args)]
pub struct CreateProjectArgs {
    /// Project name.
    #[arg(long)]
    pub name: String,

    #[arg(long)]
    pub description: Option<String>,
}

#[derive(Debug, clap::Args)]
pub struct CreateTaskArgs {
    /// Project the task belongs to.
    #[arg(long, value_name = "UUID")]
    pub project: Uuid,

    #[arg(long)]
    pub title: String,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long, value_enum, default_value = "medium")]
    pub priority: PriorityArg,

    #[arg(long)]
    pub assignee: Option<String>,

    /// Format: YYYY-MM-DD
    #[arg(long, value_name = "DATE")]
    pub due: Option<NaiveDate>,
}

#[derive(Debug, clap::Args)]
pub struct CommentArgs {
    /// Task being commented on.
    #[arg(long, value_name = "UUID")]
    pub task: Uuid,

    #[arg(long)]
    pub body: String,
}

#[derive(Debug, clap::Args)]
pub struct UpdateTaskArgs {
    #[arg(long, value_name = "UUID")]
    pub id: Uuid,

    /// Version the change was prepared against.
    #[arg(long, value_name = "VERSION")]
    pub expected_version: u64,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long, value_enum)]
    pub status: Option<StatusArg>,

    #[arg(long, value_enum)]
    pub priority: Option<PriorityArg>,

    #[arg(long)]
    pub assignee: Option<String>,

    /// Format: YYYY-MM-DD
    #[arg(long, value_name = "DATE")]
    pub due: Option<NaiveDate>,

    /// Move the task to another project.
    #[arg(long, value_name = "UUID")]
    pub project: Option<Uuid>,
}

#[derive(Debug, clap::Args)]
pub struct UpdateProjectArgs {
    #[arg(long, value_name = "UUID")]
    pub id: Uuid,

    /// Version the change was prepared against.
    #[arg(long, value_name = "VERSION")]
    pub expected_version: u64,

    #[arg(long)]
    pub name: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long)]
    pub archived: Option<bool>,
}

#[derive(Debug, clap::Args)]
pub struct DeleteArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Version the deletion was prepared against.
    #[arg(long, value_name = "VERSION")]
    pub expected_version: u64,
}

#[derive(Debug, clap::Args)]
pub struct TargetArgs {
    #[arg(long = "type", value_enum)]
    pub entity_type: EntityTypeArg,

    #[arg(long, value_name = "UUID")]
    pub id: Uuid,
}

#[derive(Debug, clap::Args)]
pub struct ListArgs {
    #[arg(long = "type", value_enum)]
    pub entity_type: EntityTypeArg,

    /// Only children of this record (tasks of a project, comments of a task).
    #[arg(long, value_name = "UUID")]
    pub parent: Option<Uuid>,

    /// Include soft-deleted records.
    #[arg(long)]
    pub include_deleted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum EntityTypeArg {
    Task,
    Project,
    Comment,
}

impl From<EntityTypeArg> for EntityType {
    fn from(arg: EntityTypeArg) -> Self {
        match arg {
            EntityTypeArg::Task => EntityType::Task,
            EntityTypeArg::Project => EntityType::Project,
            EntityTypeArg::Comment => EntityType::Comment,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum StatusArg {
    Todo,
    InProgress,
    InReview,
    Done,
}

impl From<StatusArg> for TaskStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Todo => TaskStatus::Todo,
            StatusArg::InProgress => TaskStatus::InProgress,
            StatusArg::InReview => TaskStatus::InReview,
            StatusArg::Done => TaskStatus::Done,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PriorityArg {
    Low,
    Medium,
    High,
    Urgent,
}

impl From<PriorityArg> for Priority {
    fn from(arg: PriorityArg) -> Self {
        match arg {
            PriorityArg::Low => Priority::Low,
            PriorityArg::Medium => Priority::Medium,
            PriorityArg::High => Priority::High,
            PriorityArg::Urgent => Priority::Urgent,
        }
    }
}

/// Printed result of one command.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutput {
    pub body: Value,
    /// False when a mutation did not succeed or a record was not found.
    pub success: bool,
}

impl CommandOutput {
    fn found(body: Value) -> Self {
        Self {
            success: !body.is_null(),
            body,
        }
    }

    /// Wraps a read result, reporting store failures with their status code.
    fn read<T: serde::Serialize>(
        result: Result<T, RepositoryError>,
    ) -> anyhow::Result<Self> {
        match result {
            Ok(value) => Ok(Self::found(serde_json::to_value(value)?)),
            Err(err) => Ok(Self {
                success: false,
                body: json!({
                    "status": repository_error_to_status_code(&err),
                    "error": err.to_string(),
                }),
            }),
        }
    }
}

impl From<MutationOutcome> for CommandOutput {
    fn from(outcome: MutationOutcome) -> Self {
        Self {
            success: outcome.is_success(),
            body: json!({
                "status": outcome.status_code(),
                "message": outcome.user_message(),
                "retryable": outcome.is_retryable(),
                "result": outcome,
            }),
        }
    }
}

impl Cli {
    /// Applies command-line backend overrides on top of the environment.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(path) = &self.sqlite_path {
            config.sqlite_path = path.clone();
        }
        if let Some(url) = &self.redis_url {
            config.redis_url = url.clone();
        }
    }

    /// Runs the selected command.
    pub async fn run(&self, state: &AppState) -> anyhow::Result<CommandOutput> {
        let workspace_id = self
            .workspace
            .context("A workspace is required (--workspace or TASKTRACK_WORKSPACE)")?;
        let actor = Actor::new(self.actor.as_str());

        self.command.run(state, workspace_id, &actor).await
    }
}

impl Command {
    pub async fn run(
        &self,
        state: &AppState,
        workspace_id: Uuid,
        actor: &Actor,
    ) -> anyhow::Result<CommandOutput> {
        let output: CommandOutput = match self {
            Command::CreateProject(args) => {
                let mut project = Project::new(args.name.as_str());
                project.description = args.description.clone();
                state
                    .pipeline
                    .create(workspace_id, EntityData::Project(project), actor)
                    .await
                    .into()
            }
            Command::CreateTask(args) => {
                let mut task =
                    Task::new(args.project, args.title.as_str()).with_priority(args.priority.into());
                task.description = args.description.clone();
                task.assignee = args.assignee.clone();
                task.due_date = args.due;
                state
                    .pipeline
                    .create(workspace_id, EntityData::Task(task), actor)
                    .await
                    .into()
            }
            Command::Comment(args) => state
                .pipeline
                .create(
                    workspace_id,
                    EntityData::Comment(Comment::new(args.task, args.body.as_str())),
                    actor,
                )
                .await
                .into(),
            Command::UpdateTask(args) => {
                let entity = EntityRef::new(workspace_id, EntityType::Task, args.id);
                let patch = Patch::Task(TaskPatch {
                    title: args.title.clone(),
                    description: args.description.clone(),
                    status: args.status.map(Into::into),
                    priority: args.priority.map(Into::into),
                    assignee: args.assignee.clone(),
                    due_date: args.due,
                    project_id: args.project,
                });
                state
                    .pipeline
                    .update(&entity, args.expected_version, &patch, actor)
                    .await
                    .into()
            }
            Command::UpdateProject(args) => {
                let entity = EntityRef::new(workspace_id, EntityType::Project, args.id);
                let patch = Patch::Project(ProjectPatch {
                    name: args.name.clone(),
                    description: args.description.clone(),
                    archived: args.archived,
                });
                state
                    .pipeline
                    .update(&entity, args.expected_version, &patch, actor)
                    .await
                    .into()
            }
            Command::Delete(args) => {
                let entity = args.target.entity_ref(workspace_id);
                state
                    .pipeline
                    .delete(&entity, args.expected_version, actor)
                    .await
                    .into()
            }
            Command::Get(args) => {
                CommandOutput::read(state.reader.get(&args.entity_ref(workspace_id)).await)?
            }
            Command::List(args) => {
                let mut query = ListQuery::new(workspace_id, args.entity_type.into());
                if let Some(parent) = args.parent {
                    query = query.with_parent(parent);
                }
                if args.include_deleted {
                    query = query.including_deleted();
                }
                CommandOutput::read(state.reader.list(&query).await)?
            }
            Command::History(args) => {
                CommandOutput::read(state.store.audit_trail(&args.entity_ref(workspace_id)).await)?
            }
        };

        Ok(output)
    }
}

impl TargetArgs {
    fn entity_ref(&self, workspace_id: Uuid) -> EntityRef {
        EntityRef::new(workspace_id, self.entity_type.into(), self.id)
    }
}
