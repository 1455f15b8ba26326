//! Cache coherency: read-through lookups, stampede protection and
//! invalidation after committed writes.

mod flight;
mod manager;
mod retry;

pub use flight::SingleFlight;
pub use manager::{CacheCoherencyManager, Invalidation};
pub use retry::{InvalidationQueue, InvalidationRetrier};
