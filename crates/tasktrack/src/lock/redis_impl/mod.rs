//! Redis lease store.
//!
//! Acquisition is a single `SET key holder NX PX ttl`. Release and renewal
//! compare the stored holder and act in one Lua script, so a holder whose
//! lease expired can never delete or extend a successor's lease.

mod error;
mod store;

pub use store::RedisLeaseStore;
