//! SQLite row conversion functions.
//!
//! Pure functions for converting between SQLite rows and domain types.

use chrono::{DateTime, Utc};
use rusqlite::Row;
use uuid::Uuid;

use tasktrack_core::record::{Actor, EntityData, EntityType, VersionedRecord};
use tasktrack_core::storage::{AuditAction, AuditEntry, RepositoryError};

/// Convert a SQLite row to a VersionedRecord.
///
/// Expected columns: id, workspace_id, entity_type, version, data,
/// created_by, created_at, updated_by, updated_at, deleted_at
pub fn row_to_record(row: &Row) -> rusqlite::Result<VersionedRecord> {
    let id: String = row.get(0)?;
    let workspace_id: String = row.get(1)?;
    let entity_type: String = row.get(2)?;
    let version: i64 = row.get(3)?;
    let data: String = row.get(4)?;
    let created_by: String = row.get(5)?;
    let created_at: String = row.get(6)?;
    let updated_by: String = row.get(7)?;
    let updated_at: String = row.get(8)?;
    let deleted_at: Option<String> = row.get(9)?;

    let data: EntityData = parse_json(4, &data)?;
    if data.entity_type().as_str() != entity_type {
        return Err(conversion_error(
            2,
            format!(
                "Row entity type {entity_type} does not match payload type {}",
                data.entity_type()
            ),
        ));
    }

    Ok(VersionedRecord {
        id: parse_uuid(0, &id)?,
        workspace_id: parse_uuid(1, &workspace_id)?,
        version: parse_version(3, version)?,
        data,
        created_by: Actor::new(created_by),
        created_at: parse_datetime(6, &created_at)?,
        updated_by: Actor::new(updated_by),
        updated_at: parse_datetime(8, &updated_at)?,
        deleted_at: deleted_at
            .map(|value| parse_datetime(9, &value))
            .transpose()?,
    })
}

/// Convert a SQLite row to an AuditEntry.
///
/// Expected columns: id, workspace_id, entity_type, entity_id, action,
/// version, before, after, actor, recorded_at
pub fn row_to_audit_entry(row: &Row) -> rusqlite::Result<AuditEntry> {
    let id: String = row.get(0)?;
    let workspace_id: String = row.get(1)?;
    let entity_type: String = row.get(2)?;
    let entity_id: String = row.get(3)?;
    let action: String = row.get(4)?;
    let version: i64 = row.get(5)?;
    let before: Option<String> = row.get(6)?;
    let after: Option<String> = row.get(7)?;
    let actor: String = row.get(8)?;
    let recorded_at: String = row.get(9)?;

    Ok(AuditEntry {
        id: parse_uuid(0, &id)?,
        workspace_id: parse_uuid(1, &workspace_id)?,
        entity_type: entity_type
            .parse::<EntityType>()
            .map_err(|e| conversion_error(2, e.to_string()))?,
        entity_id: parse_uuid(3, &entity_id)?,
        action: action
            .parse::<AuditAction>()
            .map_err(|e| conversion_error(4, e))?,
        version: parse_version(5, version)?,
        before: before.map(|json| parse_json(6, &json)).transpose()?,
        after: after.map(|json| parse_json(7, &json)).transpose()?,
        actor: Actor::new(actor),
        recorded_at: parse_datetime(9, &recorded_at)?,
    })
}

/// Serialize an entity payload for the `data` column.
pub fn data_to_json(data: &EntityData) -> Result<String, RepositoryError> {
    serde_json::to_string(data).map_err(|e| RepositoryError::Serialization(e.to_string()))
}

/// Serialize an optional record snapshot for the audit log.
pub fn snapshot_to_json(record: Option<&VersionedRecord>) -> Result<Option<String>, RepositoryError> {
    record
        .map(|record| {
            serde_json::to_string(record).map_err(|e| RepositoryError::Serialization(e.to_string()))
        })
        .transpose()
}

/// Convert a version to the signed integer SQLite stores.
pub fn version_to_sql(version: u64) -> Result<i64, RepositoryError> {
    i64::try_from(version)
        .map_err(|_| RepositoryError::InvalidData(format!("Version {version} out of range")))
}

/// Format a DateTime<Utc> for SQLite storage (RFC 3339).
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

// ============================================================================
// Helper functions
// ============================================================================

fn conversion_error(column: usize, message: impl Into<String>) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            message.into(),
        )),
    )
}

fn parse_uuid(column: usize, s: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_datetime(column: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                column,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

fn parse_version(column: usize, version: i64) -> rusqlite::Result<u64> {
    u64::try_from(version).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            rusqlite::types::Type::Integer,
            Box::new(e),
        )
    })
}

fn parse_json<T: serde::de::DeserializeOwned>(column: usize, json: &str) -> rusqlite::Result<T> {
    serde_json::from_str(json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
    })
}
