mod error;
mod operations;
mod patch;
mod types;

pub use error::RecordError;
pub use operations::{apply_patch, validate_data, MAX_BODY_LEN, MAX_NAME_LEN, MAX_TITLE_LEN};
pub use patch::{CommentPatch, Patch, ProjectPatch, TaskPatch};
pub use types::{
    Actor, Comment, EntityData, EntityRef, EntityType, Priority, Project, Task, TaskStatus,
    VersionedRecord,
};
