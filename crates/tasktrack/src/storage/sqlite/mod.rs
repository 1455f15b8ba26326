//! SQLite durable store.
//!
//! Uses `rusqlite` for synchronous access and `tokio-rusqlite` to run it on
//! a dedicated thread. Conditional writes execute inside an immediate
//! transaction with a `version = ? AND deleted_at IS NULL` guard.

mod conversions;
mod error;
mod repository;
mod schema;

pub use repository::SqliteStore;
