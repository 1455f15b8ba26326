//! Cache key derivation.
//!
//! Every key starts with the workspace scope so identical ids in different
//! tenants never share an entry:
//!
//! - point entry: `ws:{workspace}:{type}:{id}`
//! - point fence: `ws:{workspace}:{type}:{id}:_fence`
//! - list entry: `ws:{workspace}:{type}:list:{fingerprint}`
//! - list registry: `ws:{workspace}:{type}:_lists`
//! - list epoch: `ws:{workspace}:{type}:_epoch`

use uuid::Uuid;

use crate::record::{EntityRef, EntityType};
use crate::storage::ListQuery;

const LIST_SEGMENT: &str = ":list:";

/// Returns the cache key for a single record.
pub fn record_key(entity: &EntityRef) -> String {
    format!(
        "ws:{}:{}:{}",
        entity.workspace_id, entity.entity_type, entity.id
    )
}

/// Returns the key holding the last committed version invalidated for a record.
pub fn fence_key(entity: &EntityRef) -> String {
    format!("{}:_fence", record_key(entity))
}

/// Returns the list namespace of an entity type within a workspace.
pub fn list_namespace(workspace_id: Uuid, entity_type: EntityType) -> String {
    format!("ws:{}:{}", workspace_id, entity_type)
}

/// Returns the prefix shared by every list entry of an entity type.
pub fn list_prefix(workspace_id: Uuid, entity_type: EntityType) -> String {
    format!("{}{}", list_namespace(workspace_id, entity_type), LIST_SEGMENT)
}

/// Returns the cache key for a list query result.
pub fn list_key(query: &ListQuery) -> String {
    format!(
        "{}{}",
        list_prefix(query.workspace_id, query.entity_type),
        query.fingerprint()
    )
}

/// Returns the set key tracking all list entries of a namespace.
///
/// The set lets prefix invalidation delete list entries by exact key
/// instead of scanning.
pub fn list_tracking_key(namespace: &str) -> String {
    format!("{}:_lists", namespace)
}

/// Returns the counter key bumped whenever a namespace's lists are invalidated.
pub fn list_epoch_key(namespace: &str) -> String {
    format!("{}:_epoch", namespace)
}

/// Extracts the list namespace from a list entry key.
///
/// Returns `None` for point keys, fences and bookkeeping keys.
///
/// # Examples
///
/// ```
/// use tasktrack_core::cache::namespace_of_list_key;
///
/// let key = "ws:7:task:list:parent=any:deleted=0";
/// assert_eq!(namespace_of_list_key(key), Some("ws:7:task"));
/// assert_eq!(namespace_of_list_key("ws:7:task:42"), None);
/// ```
pub fn namespace_of_list_key(key: &str) -> Option<&str> {
    let index = key.find(LIST_SEGMENT)?;
    let namespace = &key[..index];
    if namespace.is_empty() {
        None
    } else {
        Some(namespace)
    }
}

/// Extracts the list namespace from a list prefix such as `ws:7:task:list:`.
pub fn namespace_of_list_prefix(prefix: &str) -> Option<&str> {
    prefix
        .strip_suffix(LIST_SEGMENT)
        .filter(|namespace| !namespace.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace() -> Uuid {
        Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap()
    }

    fn entity() -> EntityRef {
        EntityRef::new(
            workspace(),
            EntityType::Task,
            Uuid::parse_str("6ba7b810-9dad-11d1-80b4-00c04fd430c8").unwrap(),
        )
    }

    #[test]
    fn test_record_key_format() {
        assert_eq!(
            record_key(&entity()),
            "ws:550e8400-e29b-41d4-a716-446655440000:task:6ba7b810-9dad-11d1-80b4-00c04fd430c8"
        );
    }

    #[test]
    fn test_fence_key_extends_record_key() {
        let entity = entity();
        assert_eq!(fence_key(&entity), format!("{}:_fence", record_key(&entity)));
    }

    #[test]
    fn test_record_keys_differ_across_workspaces_and_types() {
        let a = entity();
        let other_workspace = EntityRef::new(Uuid::new_v4(), a.entity_type, a.id);
        let other_type = EntityRef::new(a.workspace_id, EntityType::Comment, a.id);

        assert_ne!(record_key(&a), record_key(&other_workspace));
        assert_ne!(record_key(&a), record_key(&other_type));
    }

    #[test]
    fn test_list_key_starts_with_list_prefix() {
        let query = ListQuery::new(workspace(), EntityType::Task).with_parent(Uuid::nil());
        let key = list_key(&query);

        assert!(key.starts_with(&list_prefix(workspace(), EntityType::Task)));
        assert_eq!(
            key,
            "ws:550e8400-e29b-41d4-a716-446655440000:task:list:parent=00000000-0000-0000-0000-000000000000:deleted=0"
        );
    }

    #[test]
    fn test_namespace_of_list_key() {
        let query = ListQuery::new(workspace(), EntityType::Project);
        let namespace = list_namespace(workspace(), EntityType::Project);

        assert_eq!(namespace_of_list_key(&list_key(&query)), Some(namespace.as_str()));
        assert_eq!(namespace_of_list_key(&record_key(&entity())), None);
        assert_eq!(namespace_of_list_key(":list:x"), None);
    }

    #[test]
    fn test_namespace_of_list_prefix() {
        let prefix = list_prefix(workspace(), EntityType::Comment);
        let namespace = list_namespace(workspace(), EntityType::Comment);

        assert_eq!(namespace_of_list_prefix(&prefix), Some(namespace.as_str()));
        assert_eq!(namespace_of_list_prefix("ws:1:task:"), None);
        assert_eq!(namespace_of_list_prefix(":list:"), None);
    }

    #[test]
    fn test_bookkeeping_keys() {
        let namespace = list_namespace(workspace(), EntityType::Task);
        assert_eq!(
            list_tracking_key(&namespace),
            "ws:550e8400-e29b-41d4-a716-446655440000:task:_lists"
        );
        assert_eq!(
            list_epoch_key(&namespace),
            "ws:550e8400-e29b-41d4-a716-446655440000:task:_epoch"
        );
    }
}
