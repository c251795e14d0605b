//! Backing key-value abstraction
//!
//! This crate defines the contract the engine expects from the physical
//! store, plus the pieces that live alongside it:
//! - [`KvBackend`]: per-key get/put/delete and a secondary-index query
//!   primitive, with multi-version (sibling) reads
//! - [`MemoryBackend`]: DashMap-based reference implementation
//! - [`retry`]: bounded backoff for transient backend failures
//!
//! The contract is deliberately small: any eventually-consistent store
//! that can return "more than one value for a key" and answer
//! equality/range lookups over named index terms can implement it.

pub mod kv;
pub mod memory;
pub mod retry;

pub use kv::{
    Bucket, IndexEntry, IndexHit, IndexQuery, IndexValue, KvBackend, StoredEntry, VersionSet,
    VersionToken,
};
pub use memory::MemoryBackend;
pub use retry::{with_retry, RetryPolicy};
