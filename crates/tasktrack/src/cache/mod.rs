//! Cache backend implementations.
//!
//! This module provides concrete implementations of the [`Cache`] trait
//! defined in `tasktrack_core::cache`.
//!
//! # Feature Flags
//!
//! - `redis`: shared Redis cache for multi-instance deployments.
//!
//! The in-memory LRU cache is always available; it backs single-process
//! deployments and the test suite.
//!
//! [`Cache`]: tasktrack_core::cache::Cache

pub mod memory;

#[cfg(feature = "redis")]
pub mod redis_impl;

pub use memory::MemoryCache;

#[cfg(feature = "redis")]
pub use redis_impl::RedisCache;
