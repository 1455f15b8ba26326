//! Redis cache backend implementation.
//!
//! Provides a shared cache for multi-instance deployments with TTL,
//! tracked list-prefix deletion and epoch counters.

mod cache;
mod error;

pub use cache::RedisCache;
