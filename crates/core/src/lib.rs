//! Core types and traits for the tasktrack mutation pipeline.
//!
//! This crate is free of I/O: it defines the record model, the backend
//! traits (`DurableStore`, `Cache`, `LeaseStore`), key derivation, cache
//! envelopes and the typed outcomes the pipeline returns. Concrete backends
//! live in the `tasktrack` crate.

pub mod cache;
pub mod lock;
pub mod mutation;
pub mod record;
pub mod storage;
