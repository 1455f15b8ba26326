//! SQLite schema definitions and SQL query constants.

/// SQL statement to create all tables.
pub const CREATE_TABLES: &str = r#"
-- Versioned records of every entity type
CREATE TABLE IF NOT EXISTS records (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    parent_id TEXT,
    version INTEGER NOT NULL CHECK (version >= 1),
    data TEXT NOT NULL,
    created_by TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_by TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);

-- Append-only audit trail
CREATE TABLE IF NOT EXISTS audit_log (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    action TEXT NOT NULL,
    version INTEGER NOT NULL,
    before TEXT,
    after TEXT,
    actor TEXT NOT NULL,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_records_scope ON records(workspace_id, entity_type);
CREATE INDEX IF NOT EXISTS idx_records_parent ON records(workspace_id, entity_type, parent_id);
CREATE INDEX IF NOT EXISTS idx_audit_entity ON audit_log(workspace_id, entity_type, entity_id);
"#;

const RECORD_COLUMNS: &str =
    "id, workspace_id, entity_type, version, data, created_by, created_at, updated_by, updated_at, deleted_at";

pub const INSERT_RECORD: &str = r#"
INSERT INTO records (id, workspace_id, entity_type, parent_id, version, data, created_by, created_at, updated_by, updated_at, deleted_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
"#;

pub const SELECT_RECORD: &str = r#"
SELECT id, workspace_id, entity_type, version, data, created_by, created_at, updated_by, updated_at, deleted_at
FROM records
WHERE id = ?1 AND workspace_id = ?2 AND entity_type = ?3
"#;

/// Conditional update: only a live row at the expected version changes.
pub const UPDATE_RECORD_IF_VERSION: &str = r#"
UPDATE records
SET version = ?4, data = ?5, parent_id = ?6, updated_by = ?7, updated_at = ?8
WHERE id = ?1 AND workspace_id = ?2 AND version = ?3 AND deleted_at IS NULL
"#;

/// Conditional soft delete with the same guard as the update.
pub const SOFT_DELETE_RECORD_IF_VERSION: &str = r#"
UPDATE records
SET version = ?4, updated_by = ?5, updated_at = ?6, deleted_at = ?6
WHERE id = ?1 AND workspace_id = ?2 AND version = ?3 AND deleted_at IS NULL
"#;

pub const INSERT_AUDIT: &str = r#"
INSERT INTO audit_log (id, workspace_id, entity_type, entity_id, action, version, before, after, actor, recorded_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
"#;

pub const SELECT_AUDIT_FOR_ENTITY: &str = r#"
SELECT id, workspace_id, entity_type, entity_id, action, version, before, after, actor, recorded_at
FROM audit_log
WHERE workspace_id = ?1 AND entity_type = ?2 AND entity_id = ?3
ORDER BY version ASC, recorded_at ASC
"#;

/// Builds the list query; optional filters are appended in a fixed order:
/// workspace, type, then parent (`?3`) when present.
pub fn select_records_list(with_parent: bool, include_deleted: bool) -> String {
    let mut sql = format!(
        "SELECT {RECORD_COLUMNS} FROM records WHERE workspace_id = ?1 AND entity_type = ?2"
    );
    if with_parent {
        sql.push_str(" AND parent_id = ?3");
    }
    if !include_deleted {
        sql.push_str(" AND deleted_at IS NULL");
    }
    sql.push_str(" ORDER BY created_at ASC, id ASC");
    sql
}
