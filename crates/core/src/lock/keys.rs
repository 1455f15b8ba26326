use crate::record::EntityRef;

/// Derives the lease resource key of a record.
///
/// Keys carry the workspace and entity type so leases never collide across
/// tenants or entity types that happen to share an id.
pub fn resource_key(entity: &EntityRef) -> String {
    format!(
        "lock:ws:{}:{}:{}",
        entity.workspace_id, entity.entity_type, entity.id
    )
}
