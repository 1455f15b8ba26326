//! Pure functions for serializing cache envelopes to and from bytes.
//!
//! Values are stored as JSON so cache contents stay readable when inspected
//! with `redis-cli`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::VersionedRecord;

/// Errors that can occur during cache serialization/deserialization.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SerializationError {
    /// Failed to serialize a value to bytes.
    #[error("Failed to serialize: {0}")]
    SerializeFailed(String),
    /// Failed to deserialize bytes to a value.
    #[error("Failed to deserialize: {0}")]
    DeserializeFailed(String),
}

/// Result type for serialization operations.
pub type Result<T> = std::result::Result<T, SerializationError>;

/// A cached point entry: the record plus the version it had when cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedRecord {
    pub stored_version: u64,
    pub record: VersionedRecord,
}

impl CachedRecord {
    pub fn new(record: VersionedRecord) -> Self {
        Self {
            stored_version: record.version,
            record,
        }
    }
}

/// A cached list result tagged with the namespace epoch read before loading it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedList {
    pub epoch: u64,
    pub records: Vec<VersionedRecord>,
}

pub fn serialize_record(entry: &CachedRecord) -> Result<Vec<u8>> {
    serde_json::to_vec(entry).map_err(|e| SerializationError::SerializeFailed(e.to_string()))
}

pub fn deserialize_record(bytes: &[u8]) -> Result<CachedRecord> {
    serde_json::from_slice(bytes).map_err(|e| SerializationError::DeserializeFailed(e.to_string()))
}

pub fn serialize_list(entry: &CachedList) -> Result<Vec<u8>> {
    serde_json::to_vec(entry).map_err(|e| SerializationError::SerializeFailed(e.to_string()))
}

pub fn deserialize_list(bytes: &[u8]) -> Result<CachedList> {
    serde_json::from_slice(bytes).map_err(|e| SerializationError::DeserializeFailed(e.to_string()))
}

/// Encodes a fence version as a decimal string.
pub fn serialize_fence(version: u64) -> Vec<u8> {
    version.to_string().into_bytes()
}

pub fn deserialize_fence(bytes: &[u8]) -> Result<u64> {
    std::str::from_utf8(bytes)
        .map_err(|e| SerializationError::DeserializeFailed(e.to_string()))?
        .trim()
        .parse()
        .map_err(|e: std::num::ParseIntError| SerializationError::DeserializeFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Actor, EntityData, Task};
    use uuid::Uuid;

    fn task_record() -> VersionedRecord {
        VersionedRecord::initial(
            Uuid::new_v4(),
            Uuid::new_v4(),
            EntityData::Task(Task::new(Uuid::new_v4(), "Cache me")),
            &Actor::new("alice"),
        )
    }

    #[test]
    fn test_cached_record_takes_version_from_record() {
        let record = task_record().next_version(
            EntityData::Task(Task::new(Uuid::new_v4(), "Again")),
            &Actor::new("bob"),
        );
        let entry = CachedRecord::new(record);

        assert_eq!(entry.stored_version, 2);
        let bytes = serialize_record(&entry).expect("serialize should succeed");
        assert_eq!(deserialize_record(&bytes), Ok(entry));
    }

    #[test]
    fn test_cached_list_keeps_epoch() {
        let entry = CachedList {
            epoch: 7,
            records: vec![task_record(), task_record()],
        };

        let bytes = serialize_list(&entry).expect("serialize should succeed");
        let decoded = deserialize_list(&bytes).expect("deserialize should succeed");

        assert_eq!(decoded.epoch, 7);
        assert_eq!(decoded.records, entry.records);
    }

    #[test]
    fn test_deserialize_record_malformed_bytes() {
        let result = deserialize_record(b"not valid json");
        assert!(matches!(
            result,
            Err(SerializationError::DeserializeFailed(_))
        ));
    }

    #[test]
    fn test_list_bytes_are_not_a_record() {
        let bytes = serialize_list(&CachedList {
            epoch: 0,
            records: vec![],
        })
        .unwrap();
        assert!(deserialize_record(&bytes).is_err());
    }

    #[test]
    fn test_fence_encoding() {
        assert_eq!(serialize_fence(42), b"42".to_vec());
        assert_eq!(deserialize_fence(b"42"), Ok(42));
        assert!(deserialize_fence(b"forty-two").is_err());
        assert!(deserialize_fence(&[0xff, 0xfe]).is_err());
    }
}
