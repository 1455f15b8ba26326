//! Cached read path.
//!
//! Reads go through the [`CacheCoherencyManager`](crate::coherency::CacheCoherencyManager)
//! with the durable store as loader:
//!
//! - **Hits**: served only if the entry is not older than its fence (records)
//!   or was loaded in the current namespace epoch (lists)
//! - **Misses**: collapsed per key into a single store read, then cached
//! - **Cache failures**: degrade to direct store reads

mod reader;

pub use reader::CachedReader;
