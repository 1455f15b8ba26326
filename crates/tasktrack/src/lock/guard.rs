use std::time::Duration;

use tokio::time::Instant;

use tasktrack_core::lock::{HolderId, LockLease, ReleaseOutcome, RenewOutcome, Result};

use super::LockCoordinator;

/// A held lease that is released exactly once.
///
/// Call [`release`](Self::release) on every exit path. A guard dropped
/// without being released schedules a best-effort release on the current
/// runtime; the lease TTL bounds the damage if that also fails.
pub struct LeaseGuard {
    coordinator: LockCoordinator,
    lease: LockLease,
    ttl: Duration,
    /// Start of the current lease term (reset on renewal).
    granted_at: Instant,
    released: bool,
}

impl LeaseGuard {
    pub(crate) fn new(coordinator: LockCoordinator, lease: LockLease, ttl: Duration) -> Self {
        Self {
            coordinator,
            lease,
            ttl,
            granted_at: Instant::now(),
            released: false,
        }
    }

    pub fn lease(&self) -> &LockLease {
        &self.lease
    }

    pub fn resource_key(&self) -> &str {
        &self.lease.resource_key
    }

    pub fn holder_id(&self) -> &HolderId {
        &self.lease.holder_id
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Time since the lease was granted or last renewed.
    pub fn elapsed(&self) -> Duration {
        self.granted_at.elapsed()
    }

    /// Returns true once the lease term has run out.
    pub fn has_expired(&self) -> bool {
        self.elapsed() >= self.ttl
    }

    /// Extends the lease by its original TTL.
    pub async fn renew(&mut self) -> Result<RenewOutcome> {
        let outcome = self
            .coordinator
            .renew(&self.lease.resource_key, &self.lease.holder_id, self.ttl)
            .await?;

        if let RenewOutcome::Renewed(lease) = &outcome {
            self.lease = lease.clone();
            self.granted_at = Instant::now();
        }

        Ok(outcome)
    }

    /// Releases the lease.
    pub async fn release(mut self) -> Result<ReleaseOutcome> {
        self.released = true;
        self.coordinator
            .release(&self.lease.resource_key, &self.lease.holder_id)
            .await
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                resource_key = %self.lease.resource_key,
                "Lease guard dropped outside a runtime, lease left to expire"
            );
            return;
        };

        let coordinator = self.coordinator.clone();
        let resource_key = self.lease.resource_key.clone();
        let holder = self.lease.holder_id.clone();
        handle.spawn(async move {
            if let Err(err) = coordinator.release(&resource_key, &holder).await {
                tracing::warn!(%resource_key, error = %err, "Failed to release dropped lease");
            }
        });
    }
}
