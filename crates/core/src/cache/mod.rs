mod error;
mod keys;
mod serialization;
mod traits;

pub use error::{CacheError, Result};
pub use keys::{
    fence_key, list_epoch_key, list_key, list_namespace, list_prefix, list_tracking_key,
    namespace_of_list_key, namespace_of_list_prefix, record_key,
};
pub use serialization::{
    deserialize_fence, deserialize_list, deserialize_record, serialize_fence, serialize_list,
    serialize_record, CachedList, CachedRecord, SerializationError,
};
pub use traits::Cache;
