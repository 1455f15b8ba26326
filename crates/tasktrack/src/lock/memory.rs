//! Process-local lease store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use tasktrack_core::lock::{HolderId, LeaseStore, LockError, Result};

#[derive(Debug, Clone)]
struct Lease {
    holder: HolderId,
    expires_at: Instant,
}

impl Lease {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-memory [`LeaseStore`] for single-process deployments and tests.
///
/// Every operation runs under one mutex, which makes "set if absent" atomic.
/// Expiry follows `tokio::time`, so paused-clock tests can expire leases.
#[derive(Debug, Clone, Default)]
pub struct MemoryLeaseStore {
    leases: Arc<Mutex<HashMap<String, Lease>>>,
}

impl MemoryLeaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current holder of a live lease, if any.
    pub async fn holder(&self, key: &str) -> Option<HolderId> {
        let leases = self.leases.lock().await;
        leases
            .get(key)
            .filter(|lease| lease.is_live(Instant::now()))
            .map(|lease| lease.holder.clone())
    }
}

fn check_ttl(ttl: Duration) -> Result<()> {
    if ttl.is_zero() {
        return Err(LockError::InvalidTtl(ttl));
    }
    Ok(())
}

#[async_trait]
impl LeaseStore for MemoryLeaseStore {
    async fn try_acquire(&self, key: &str, holder: &HolderId, ttl: Duration) -> Result<bool> {
        check_ttl(ttl)?;
        let now = Instant::now();
        let mut leases = self.leases.lock().await;

        if leases.get(key).is_some_and(|lease| lease.is_live(now)) {
            return Ok(false);
        }

        leases.insert(
            key.to_string(),
            Lease {
                holder: holder.clone(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn release(&self, key: &str, holder: &HolderId) -> Result<bool> {
        let now = Instant::now();
        let mut leases = self.leases.lock().await;

        let Some(lease) = leases.get(key) else {
            return Ok(false);
        };
        if &lease.holder != holder {
            return Ok(false);
        }

        // An expired lease is dropped either way but no longer counts as held.
        let was_live = lease.is_live(now);
        leases.remove(key);
        Ok(was_live)
    }

    async fn renew(&self, key: &str, holder: &HolderId, ttl: Duration) -> Result<bool> {
        check_ttl(ttl)?;
        let now = Instant::now();
        let mut leases = self.leases.lock().await;

        match leases.get_mut(key) {
            Some(lease) if &lease.holder == holder && lease.is_live(now) => {
                lease.expires_at = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
