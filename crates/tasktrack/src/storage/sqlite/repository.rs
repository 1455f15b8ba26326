//! SQLite implementation of [`DurableStore`].

use async_trait::async_trait;
use rusqlite::{OptionalExtension, TransactionBehavior};
use tokio_rusqlite::Connection;

use tasktrack_core::record::{
    apply_patch, validate_data, Actor, EntityRef, Patch, VersionedRecord,
};
use tasktrack_core::storage::{
    AuditEntry, DurableStore, ListQuery, NewRecord, RepositoryError, Result, WriteOutcome,
};

use super::conversions::{
    data_to_json, format_datetime, row_to_audit_entry, row_to_record, snapshot_to_json,
    version_to_sql,
};
use super::error::map_tokio_rusqlite_error;
use super::schema;

/// Helper to wrap rusqlite errors for tokio_rusqlite closures.
fn wrap_err(e: rusqlite::Error) -> tokio_rusqlite::Error {
    tokio_rusqlite::Error::Rusqlite(e)
}

/// Result of a closure that can fail at the SQLite layer (outer) or with a
/// domain error that must not be mapped as a database failure (inner).
type CallResult<T> = std::result::Result<Result<T>, tokio_rusqlite::Error>;

fn select_record(
    conn: &rusqlite::Connection,
    entity: &EntityRef,
) -> rusqlite::Result<Option<VersionedRecord>> {
    conn.query_row(
        schema::SELECT_RECORD,
        rusqlite::params![
            entity.id.to_string(),
            entity.workspace_id.to_string(),
            entity.entity_type.as_str()
        ],
        row_to_record,
    )
    .optional()
}

/// SQLite-based durable store.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens (or creates) a file-based database and ensures the schema exists.
    pub async fn new(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .await
            .map_err(|e| RepositoryError::ConnectionFailed(e.to_string()))?;

        Self::init_schema(&conn).await?;

        Ok(Self { conn })
    }

    /// Creates a store backed by an in-memory database.
    ///
    /// Useful for testing - data is lost when the connection is dropped.
    pub async fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| RepositoryError::ConnectionFailed(e.to_string()))?;

        Self::init_schema(&conn).await?;

        Ok(Self { conn })
    }

    async fn init_schema(conn: &Connection) -> Result<()> {
        conn.call(|conn| {
            conn.execute_batch(schema::CREATE_TABLES)
                .map_err(wrap_err)?;
            Ok(())
        })
        .await
        .map_err(|e| RepositoryError::QueryFailed(e.to_string()))
    }
}

#[async_trait]
impl DurableStore for SqliteStore {
    async fn read(&self, entity: &EntityRef) -> Result<Option<VersionedRecord>> {
        let entity = *entity;

        self.conn
            .call(move |conn| select_record(conn, &entity).map_err(wrap_err))
            .await
            .map_err(|e| map_tokio_rusqlite_error(e, entity.entity_type.as_str(), entity.id))
    }

    async fn list(&self, query: &ListQuery) -> Result<Vec<VersionedRecord>> {
        let sql = schema::select_records_list(query.parent_id.is_some(), query.include_deleted);
        let mut params = vec![
            query.workspace_id.to_string(),
            query.entity_type.as_str().to_string(),
        ];
        if let Some(parent_id) = query.parent_id {
            params.push(parent_id.to_string());
        }

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql).map_err(wrap_err)?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(params.iter()), row_to_record)
                    .map_err(wrap_err)?;

                let mut records = Vec::new();
                for row_result in rows {
                    records.push(row_result.map_err(wrap_err)?);
                }
                Ok(records)
            })
            .await
            .map_err(|e| RepositoryError::QueryFailed(e.to_string()))
    }

    async fn create(&self, record: NewRecord) -> Result<VersionedRecord> {
        validate_data(&record.data)?;

        let created = record.into_record();
        let entity_type = created.entity_type().as_str();
        let id = created.id.to_string();
        let workspace_id = created.workspace_id.to_string();
        let parent_id = created.parent_id().map(|id| id.to_string());
        let version = version_to_sql(created.version)?;
        let data = data_to_json(&created.data)?;
        let created_by = created.created_by.to_string();
        let created_at = format_datetime(&created.created_at);
        let updated_by = created.updated_by.to_string();
        let updated_at = format_datetime(&created.updated_at);
        let record_id = id.clone();

        self.conn
            .call(move |conn| {
                conn.execute(
                    schema::INSERT_RECORD,
                    rusqlite::params![
                        id,
                        workspace_id,
                        entity_type,
                        parent_id,
                        version,
                        data,
                        created_by,
                        created_at,
                        updated_by,
                        updated_at,
                        Option::<String>::None
                    ],
                )
                .map_err(wrap_err)?;
                Ok(())
            })
            .await
            .map_err(|e| map_tokio_rusqlite_error(e, entity_type, record_id))?;

        Ok(created)
    }

    async fn update_if(
        &self,
        entity: &EntityRef,
        expected_version: u64,
        patch: &Patch,
        actor: &Actor,
    ) -> Result<WriteOutcome> {
        let entity = *entity;
        let patch = patch.clone();
        let actor = actor.clone();

        let outcome: CallResult<WriteOutcome> = self
            .conn
            .call(move |conn| {
                let tx = conn
                    .transaction_with_behavior(TransactionBehavior::Immediate)
                    .map_err(wrap_err)?;

                let current = select_record(&tx, &entity).map_err(wrap_err)?;
                if let Some(outcome) = WriteOutcome::precheck(current.as_ref(), expected_version) {
                    return Ok(Ok(outcome));
                }
                let Some(before) = current else {
                    return Ok(Ok(WriteOutcome::NotFound));
                };

                let after = match apply_patch(&before, &patch, &actor) {
                    Ok(after) => after,
                    Err(e) => return Ok(Err(e.into())),
                };
                let encoded = version_to_sql(expected_version)
                    .and_then(|expected| Ok((expected, version_to_sql(after.version)?)))
                    .and_then(|versions| Ok((versions, data_to_json(&after.data)?)));
                let ((expected, next), data) = match encoded {
                    Ok(encoded) => encoded,
                    Err(e) => return Ok(Err(e)),
                };

                let rows = tx
                    .execute(
                        schema::UPDATE_RECORD_IF_VERSION,
                        rusqlite::params![
                            entity.id.to_string(),
                            entity.workspace_id.to_string(),
                            expected,
                            next,
                            data,
                            after.parent_id().map(|id| id.to_string()),
                            after.updated_by.to_string(),
                            format_datetime(&after.updated_at)
                        ],
                    )
                    .map_err(wrap_err)?;
                if rows != 1 {
                    return Ok(Ok(WriteOutcome::VersionConflict {
                        current_version: before.version,
                    }));
                }

                tx.commit().map_err(wrap_err)?;
                Ok(Ok(WriteOutcome::Applied { before, after }))
            })
            .await;

        outcome.map_err(|e| map_tokio_rusqlite_error(e, entity.entity_type.as_str(), entity.id))?
    }

    async fn soft_delete(
        &self,
        entity: &EntityRef,
        expected_version: u64,
        actor: &Actor,
    ) -> Result<WriteOutcome> {
        let entity = *entity;
        let actor = actor.clone();

        let outcome: CallResult<WriteOutcome> = self
            .conn
            .call(move |conn| {
                let tx = conn
                    .transaction_with_behavior(TransactionBehavior::Immediate)
                    .map_err(wrap_err)?;

                let current = select_record(&tx, &entity).map_err(wrap_err)?;
                if let Some(outcome) = WriteOutcome::precheck(current.as_ref(), expected_version) {
                    return Ok(Ok(outcome));
                }
                let Some(before) = current else {
                    return Ok(Ok(WriteOutcome::NotFound));
                };

                let after = before.tombstone(&actor);
                let (expected, next) = match version_to_sql(expected_version)
                    .and_then(|expected| Ok((expected, version_to_sql(after.version)?)))
                {
                    Ok(versions) => versions,
                    Err(e) => return Ok(Err(e)),
                };
                // The tombstone shares one timestamp for updated_at and deleted_at.
                let deleted_at = format_datetime(&after.updated_at);

                let rows = tx
                    .execute(
                        schema::SOFT_DELETE_RECORD_IF_VERSION,
                        rusqlite::params![
                            entity.id.to_string(),
                            entity.workspace_id.to_string(),
                            expected,
                            next,
                            after.updated_by.to_string(),
                            deleted_at
                        ],
                    )
                    .map_err(wrap_err)?;
                if rows != 1 {
                    return Ok(Ok(WriteOutcome::VersionConflict {
                        current_version: before.version,
                    }));
                }

                tx.commit().map_err(wrap_err)?;
                Ok(Ok(WriteOutcome::Applied { before, after }))
            })
            .await;

        outcome.map_err(|e| map_tokio_rusqlite_error(e, entity.entity_type.as_str(), entity.id))?
    }

    async fn append_audit(&self, entry: &AuditEntry) -> Result<()> {
        let id = entry.id.to_string();
        let workspace_id = entry.workspace_id.to_string();
        let entity_type = entry.entity_type.as_str();
        let entity_id = entry.entity_id.to_string();
        let action = entry.action.as_str();
        let version = version_to_sql(entry.version)?;
        let before = snapshot_to_json(entry.before.as_ref())?;
        let after = snapshot_to_json(entry.after.as_ref())?;
        let actor = entry.actor.to_string();
        let recorded_at = format_datetime(&entry.recorded_at);
        let audit_id = id.clone();

        self.conn
            .call(move |conn| {
                conn.execute(
                    schema::INSERT_AUDIT,
                    rusqlite::params![
                        id,
                        workspace_id,
                        entity_type,
                        entity_id,
                        action,
                        version,
                        before,
                        after,
                        actor,
                        recorded_at
                    ],
                )
                .map_err(wrap_err)?;
                Ok(())
            })
            .await
            .map_err(|e| map_tokio_rusqlite_error(e, "audit_entry", audit_id))
    }

    async fn audit_trail(&self, entity: &EntityRef) -> Result<Vec<AuditEntry>> {
        let workspace_id = entity.workspace_id.to_string();
        let entity_type = entity.entity_type.as_str();
        let entity_id = entity.id.to_string();

        self.conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(schema::SELECT_AUDIT_FOR_ENTITY)
                    .map_err(wrap_err)?;
                let rows = stmt
                    .query_map(
                        rusqlite::params![workspace_id, entity_type, entity_id],
                        row_to_audit_entry,
                    )
                    .map_err(wrap_err)?;

                let mut entries = Vec::new();
                for row_result in rows {
                    entries.push(row_result.map_err(wrap_err)?);
                }
                Ok(entries)
            })
            .await
            .map_err(|e| RepositoryError::QueryFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tasktrack_core::record::{Comment, EntityData, EntityType, Project, Task, TaskPatch};
    use tasktrack_core::storage::AuditAction;
    use uuid::Uuid;

    async fn setup() -> SqliteStore {
        SqliteStore::new_in_memory()
            .await
            .expect("Failed to create in-memory store")
    }

    fn alice() -> Actor {
        Actor::new("alice")
    }

    async fn create_task(store: &SqliteStore, workspace_id: Uuid, project_id: Uuid) -> VersionedRecord {
        store
            .create(NewRecord::new(
                workspace_id,
                EntityData::Task(Task::new(project_id, "Initial")),
                alice(),
            ))
            .await
            .unwrap()
    }

    fn title(title: &str) -> Patch {
        Patch::Task(TaskPatch::new().with_title(title))
    }

    #[tokio::test]
    async fn test_create_and_read() {
        let store = setup().await;
        let record = create_task(&store, Uuid::new_v4(), Uuid::new_v4()).await;

        let read = store.read(&record.entity_ref()).await.unwrap();

        assert_eq!(record.version, 1);
        assert_eq!(read, Some(record));
    }

    #[tokio::test]
    async fn test_read_is_scoped_by_workspace_and_type() {
        let store = setup().await;
        let record = create_task(&store, Uuid::new_v4(), Uuid::new_v4()).await;

        let other_workspace = EntityRef::new(Uuid::new_v4(), EntityType::Task, record.id);
        let other_type = EntityRef::new(record.workspace_id, EntityType::Comment, record.id);

        assert_eq!(store.read(&other_workspace).await.unwrap(), None);
        assert_eq!(store.read(&other_type).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_create_duplicate_id_fails() {
        let store = setup().await;
        let new = NewRecord::new(
            Uuid::new_v4(),
            EntityData::Project(Project::new("P")),
            alice(),
        );

        store.create(new.clone()).await.unwrap();
        let result = store.create(new.clone()).await;

        assert_eq!(
            result,
            Err(RepositoryError::AlreadyExists {
                entity_type: "project",
                id: new.id.to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_update_if_commits_next_version() {
        let store = setup().await;
        let record = create_task(&store, Uuid::new_v4(), Uuid::new_v4()).await;
        let entity = record.entity_ref();

        let outcome = store
            .update_if(&entity, 1, &title("A"), &Actor::new("bob"))
            .await
            .unwrap();
        let WriteOutcome::Applied { after, .. } = outcome else {
            panic!("expected applied, got {outcome:?}");
        };

        assert_eq!(after.version, 2);
        assert_eq!(store.read(&entity).await.unwrap(), Some(after));
    }

    #[tokio::test]
    async fn test_update_if_stale_version_conflicts() {
        let store = setup().await;
        let record = create_task(&store, Uuid::new_v4(), Uuid::new_v4()).await;
        let entity = record.entity_ref();

        store.update_if(&entity, 1, &title("A"), &alice()).await.unwrap();
        let outcome = store.update_if(&entity, 1, &title("B"), &alice()).await.unwrap();

        assert_eq!(outcome, WriteOutcome::VersionConflict { current_version: 2 });
    }

    #[tokio::test]
    async fn test_update_if_invalid_patch_rolls_back() {
        let store = setup().await;
        let record = create_task(&store, Uuid::new_v4(), Uuid::new_v4()).await;
        let entity = record.entity_ref();

        let result = store
            .update_if(
                &entity,
                1,
                &Patch::Comment(Default::default()),
                &alice(),
            )
            .await;

        assert!(matches!(result, Err(RepositoryError::InvalidData(_))));
        assert_eq!(store.read(&entity).await.unwrap().unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_soft_delete_twice_is_not_found() {
        let store = setup().await;
        let record = create_task(&store, Uuid::new_v4(), Uuid::new_v4()).await;
        let entity = record.entity_ref();

        let outcome = store.soft_delete(&entity, 1, &alice()).await.unwrap();
        assert!(matches!(outcome, WriteOutcome::Applied { ref after, .. } if after.is_deleted()));

        assert_eq!(
            store.soft_delete(&entity, 2, &alice()).await.unwrap(),
            WriteOutcome::NotFound
        );
        assert_eq!(
            store.update_if(&entity, 2, &title("A"), &alice()).await.unwrap(),
            WriteOutcome::NotFound
        );

        let stored = store.read(&entity).await.unwrap().unwrap();
        assert_eq!(stored.version, 2);
        assert!(stored.is_deleted());
    }

    #[tokio::test]
    async fn test_list_by_parent_and_deletion() {
        let store = setup().await;
        let workspace_id = Uuid::new_v4();
        let task = create_task(&store, workspace_id, Uuid::new_v4()).await;

        let mut comments = Vec::new();
        for body in ["first", "second"] {
            comments.push(
                store
                    .create(NewRecord::new(
                        workspace_id,
                        EntityData::Comment(Comment::new(task.id, body)),
                        alice(),
                    ))
                    .await
                    .unwrap(),
            );
        }
        store
            .soft_delete(&comments[0].entity_ref(), 1, &alice())
            .await
            .unwrap();

        let query = ListQuery::new(workspace_id, EntityType::Comment).with_parent(task.id);
        let live = store.list(&query).await.unwrap();
        assert_eq!(live, vec![comments[1].clone()]);
        assert_eq!(store.list(&query.including_deleted()).await.unwrap().len(), 2);
        assert!(store
            .list(&ListQuery::new(Uuid::new_v4(), EntityType::Comment))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_audit_trail_round_trip() {
        let store = setup().await;
        let record = create_task(&store, Uuid::new_v4(), Uuid::new_v4()).await;
        let entity = record.entity_ref();

        let created = AuditEntry::new(AuditAction::Created, None, record.clone(), &alice());
        store.append_audit(&created).await.unwrap();

        let WriteOutcome::Applied { before, after } =
            store.soft_delete(&entity, 1, &alice()).await.unwrap()
        else {
            panic!("expected applied");
        };
        let deleted = AuditEntry::new(AuditAction::Deleted, Some(before), after, &alice());
        store.append_audit(&deleted).await.unwrap();

        let trail = store.audit_trail(&entity).await.unwrap();
        assert_eq!(trail, vec![created, deleted]);
    }

    #[tokio::test]
    async fn test_file_backed_store_persists_across_connections() {
        let path = std::env::temp_dir().join(format!("tasktrack-{}.db", Uuid::new_v4()));
        let path_str = path.to_string_lossy().to_string();

        let record = {
            let store = SqliteStore::new(&path_str).await.unwrap();
            create_task(&store, Uuid::new_v4(), Uuid::new_v4()).await
        };

        let reopened = SqliteStore::new(&path_str).await.unwrap();
        assert_eq!(
            reopened.read(&record.entity_ref()).await.unwrap(),
            Some(record)
        );

        drop(reopened);
        let _ = std::fs::remove_file(&path);
    }
}
