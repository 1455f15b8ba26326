use super::error::RecordError;
use super::patch::Patch;
use super::types::{Actor, EntityData, VersionedRecord};

pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_NAME_LEN: usize = 100;
pub const MAX_BODY_LEN: usize = 10_000;

/// Validates an entity payload before it is created or after a patch was applied.
pub fn validate_data(data: &EntityData) -> Result<(), RecordError> {
    match data {
        EntityData::Task(task) => {
            if task.title.trim().is_empty() {
                return Err(RecordError::EmptyTitle);
            }
            if task.title.chars().count() > MAX_TITLE_LEN {
                return Err(RecordError::TitleTooLong);
            }
        }
        EntityData::Project(project) => {
            if project.name.trim().is_empty() {
                return Err(RecordError::EmptyName);
            }
            if project.name.chars().count() > MAX_NAME_LEN {
                return Err(RecordError::NameTooLong);
            }
        }
        EntityData::Comment(comment) => {
            if comment.body.trim().is_empty() {
                return Err(RecordError::EmptyBody);
            }
            if comment.body.chars().count() > MAX_BODY_LEN {
                return Err(RecordError::BodyTooLong);
            }
        }
    }
    Ok(())
}

/// Computes the successor of `record` with `patch` applied and validated.
///
/// Durable stores call this inside their conditional update so the result
/// is always derived from the version the caller expected.
pub fn apply_patch(
    record: &VersionedRecord,
    patch: &Patch,
    actor: &Actor,
) -> Result<VersionedRecord, RecordError> {
    let mut data = record.data.clone();
    patch.apply_to(&mut data)?;
    validate_data(&data)?;
    Ok(record.next_version(data, actor))
}
