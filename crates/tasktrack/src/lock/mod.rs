//! Lease backends and the lock coordinator.
//!
//! Leases serialize concurrent editors of one record. They are an
//! optimization only: correctness comes from the store's conditional write,
//! so an expired lease taken over by a second holder never causes a lost
//! update.

mod coordinator;
mod guard;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_impl;

pub use coordinator::LockCoordinator;
pub use guard::LeaseGuard;
pub use memory::MemoryLeaseStore;
#[cfg(feature = "redis")]
pub use redis_impl::RedisLeaseStore;
