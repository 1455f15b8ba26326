//! The mutation pipeline.
//!
//! One run per create, update or delete:
//!
//! 1. Acquire the record's lease (bounded backoff, `Busy` when exhausted)
//! 2. Conditional write in the durable store (version compare and bump)
//! 3. Invalidate the point entry and the list namespace
//! 4. Append the audit entry
//! 5. Release the lease, on every exit path
//!
//! Secondary failures after a commit (invalidation, audit, release) are
//! logged and never turn a committed write into a failure.

mod mutation;
mod run;

pub use mutation::{MutationPipeline, PipelineSettings};
