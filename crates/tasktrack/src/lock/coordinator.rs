use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use tasktrack_core::lock::{
    AcquireOutcome, BackoffPolicy, HolderId, LeaseStore, LockError, LockLease, ReleaseOutcome,
    RenewOutcome, Result,
};

use super::LeaseGuard;

/// Deadline applied to each call into the lease backend.
const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(1);

fn expires_at(ttl: Duration) -> Result<DateTime<Utc>> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| Utc::now().checked_add_signed(ttl))
        .ok_or(LockError::InvalidTtl(ttl))
}

/// Grants, releases and renews leases on resource keys.
///
/// Acquisition never blocks indefinitely: [`acquire`](Self::acquire) makes a
/// single attempt, [`acquire_with_backoff`](Self::acquire_with_backoff)
/// retries within the configured [`BackoffPolicy`]. Every backend call
/// carries its own deadline.
#[derive(Clone)]
pub struct LockCoordinator {
    store: Arc<dyn LeaseStore>,
    policy: BackoffPolicy,
    op_timeout: Duration,
}

impl LockCoordinator {
    pub fn new(store: Arc<dyn LeaseStore>, policy: BackoffPolicy) -> Self {
        Self {
            store,
            policy,
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }

    pub fn with_op_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    async fn with_deadline<T>(
        &self,
        op: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.op_timeout, op)
            .await
            .map_err(|_| LockError::Timeout(self.op_timeout))?
    }

    /// Makes one atomic "create if absent" attempt.
    pub async fn acquire(
        &self,
        resource_key: &str,
        holder: &HolderId,
        ttl: Duration,
    ) -> Result<AcquireOutcome> {
        let expires_at = expires_at(ttl)?;
        let granted = self
            .with_deadline(self.store.try_acquire(resource_key, holder, ttl))
            .await?;

        if !granted {
            return Ok(AcquireOutcome::AlreadyHeld);
        }

        Ok(AcquireOutcome::Granted(LockLease {
            resource_key: resource_key.to_string(),
            holder_id: holder.clone(),
            expires_at,
        }))
    }

    /// Retries [`acquire`](Self::acquire) with backoff until granted or the
    /// policy's attempt ceiling is reached.
    ///
    /// Contention after the last attempt yields `AlreadyHeld`; a backend
    /// failure on the last attempt is returned as the error.
    pub async fn acquire_with_backoff(
        &self,
        resource_key: &str,
        holder: &HolderId,
        ttl: Duration,
    ) -> Result<AcquireOutcome> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            match self.acquire(resource_key, holder, ttl).await {
                Ok(AcquireOutcome::Granted(lease)) => {
                    tracing::debug!(
                        resource_key,
                        holder_id = %holder,
                        attempts,
                        "Lease granted"
                    );
                    return Ok(AcquireOutcome::Granted(lease));
                }
                Ok(AcquireOutcome::AlreadyHeld) if !self.policy.should_retry(attempts) => {
                    tracing::debug!(resource_key, attempts, "Lease still held, giving up");
                    return Ok(AcquireOutcome::AlreadyHeld);
                }
                Err(err @ LockError::InvalidTtl(_)) => return Err(err),
                Err(err) if !self.policy.should_retry(attempts) => return Err(err),
                Ok(AcquireOutcome::AlreadyHeld) => {
                    tracing::trace!(resource_key, attempts, "Lease held by another holder");
                }
                Err(err) => {
                    tracing::debug!(resource_key, attempts, error = %err, "Lease backend error");
                }
            }

            tokio::time::sleep(self.policy.delay_for(attempts - 1)).await;
        }
    }

    /// Acquires a scoped lease for a fresh holder.
    ///
    /// Returns `None` when the resource stayed busy for the whole policy.
    pub async fn lock(&self, resource_key: &str, ttl: Duration) -> Result<Option<LeaseGuard>> {
        let holder = HolderId::generate();
        match self.acquire_with_backoff(resource_key, &holder, ttl).await? {
            AcquireOutcome::Granted(lease) => Ok(Some(LeaseGuard::new(self.clone(), lease, ttl))),
            AcquireOutcome::AlreadyHeld => Ok(None),
        }
    }

    /// Releases a lease. Only the current holder may release it.
    pub async fn release(&self, resource_key: &str, holder: &HolderId) -> Result<ReleaseOutcome> {
        let released = self
            .with_deadline(self.store.release(resource_key, holder))
            .await?;

        Ok(if released {
            ReleaseOutcome::Released
        } else {
            ReleaseOutcome::NotHeld
        })
    }

    /// Extends a live lease owned by `holder`.
    pub async fn renew(
        &self,
        resource_key: &str,
        holder: &HolderId,
        ttl: Duration,
    ) -> Result<RenewOutcome> {
        let expires_at = expires_at(ttl)?;
        let renewed = self
            .with_deadline(self.store.renew(resource_key, holder, ttl))
            .await?;

        if !renewed {
            return Ok(RenewOutcome::NotHeld);
        }

        Ok(RenewOutcome::Renewed(LockLease {
            resource_key: resource_key.to_string(),
            holder_id: holder.clone(),
            expires_at,
        }))
    }
}
