//! mdraid Storage
//!
//! This crate holds the state that sits on either side of the I/O engine:
//! - Block caching (ordered LRU table with in-place recency reordering)
//! - An in-memory JBOD array that executes the primitive operation protocol

pub mod cache;
pub mod jbod;

// Re-exports
pub use cache::{BlockCache, CacheStats, InsertOutcome};
pub use jbod::Jbod;
