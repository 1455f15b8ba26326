//! In-memory durable store.
//!
//! Stores records in a `HashMap` wrapped in `Arc<RwLock<_>>`. Every
//! conditional write runs under the write lock, which makes it atomic with
//! respect to all other store operations. Data is lost when the store is
//! dropped; use it for tests and single-process demos.

mod store;

pub use store::InMemoryStore;
