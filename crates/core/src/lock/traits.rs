use std::time::Duration;

use async_trait::async_trait;

use super::{HolderId, Result};

/// A key-value backend offering atomic "set if absent, with TTL".
///
/// Each method is a single atomic operation at the backend. At most one
/// non-expired lease exists per key.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Creates the lease if no live lease exists. Returns `false` on contention.
    async fn try_acquire(&self, key: &str, holder: &HolderId, ttl: Duration) -> Result<bool>;

    /// Deletes the lease if `holder` owns it. Returns `false` otherwise.
    async fn release(&self, key: &str, holder: &HolderId) -> Result<bool>;

    /// Resets the TTL if `holder` owns a live lease. Returns `false` otherwise.
    async fn renew(&self, key: &str, holder: &HolderId, ttl: Duration) -> Result<bool>;
}
