//! Mapping of Redis failures onto [`CacheError`].

use tasktrack_core::cache::CacheError;

/// Classifies a Redis error.
///
/// Network-level failures become `ConnectionFailed` so the invalidation
/// retrier treats them as transient. Everything else, such as a `WRONGTYPE`
/// reply, is an `OperationFailed` that retrying will not fix.
pub fn map_redis_error(err: redis::RedisError) -> CacheError {
    let transient = err.is_io_error()
        || err.is_connection_refusal()
        || err.is_connection_dropped()
        || err.is_timeout();

    if transient {
        CacheError::ConnectionFailed(err.to_string())
    } else {
        CacheError::OperationFailed(err.to_string())
    }
}
