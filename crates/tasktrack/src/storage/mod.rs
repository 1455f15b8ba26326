//! Durable store implementations and the cached read path.
//!
//! This module provides concrete implementations of the [`DurableStore`]
//! trait defined in `tasktrack_core::storage`. The backend is selected at
//! compile time via feature flags.
//!
//! # Feature Flags
//!
//! - `sqlite` (default): SQLite store using `rusqlite` and `tokio-rusqlite`
//! - without `sqlite`: the in-memory store (always compiled, used by tests)
//!
//! [`DurableStore`]: tasktrack_core::storage::DurableStore

use std::future::Future;
use std::time::Duration;

use tasktrack_core::storage::{RepositoryError, Result};

pub mod cached;
pub mod inmemory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use cached::CachedReader;
pub use inmemory::InMemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

/// Runs a store call under a deadline, surfacing expiry as `RepositoryError::Timeout`.
pub(crate) async fn with_deadline<T>(
    deadline: Duration,
    op: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(deadline, op)
        .await
        .map_err(|_| RepositoryError::Timeout(deadline))?
}
