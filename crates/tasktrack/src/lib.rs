//! Mutation core of a multi-tenant task tracker.
//!
//! Every create, update and delete of a task, project or comment runs
//! through [`pipeline::MutationPipeline`]: a per-record lease, an optimistic
//! version check in the durable store, cache invalidation and an audit
//! append. Reads go through [`storage::CachedReader`].

pub mod cache;
pub mod cli;
pub mod coherency;
pub mod config;
pub mod lock;
pub mod pipeline;
pub mod state;
pub mod storage;
