//! Mapping of Redis failures onto [`LockError`].

use tasktrack_core::lock::LockError;

/// Classifies a Redis error raised by a lease command or script.
pub fn map_redis_error(err: redis::RedisError) -> LockError {
    if err.is_io_error()
        || err.is_connection_refusal()
        || err.is_connection_dropped()
        || err.is_timeout()
    {
        LockError::ConnectionFailed(err.to_string())
    } else {
        LockError::OperationFailed(err.to_string())
    }
}
