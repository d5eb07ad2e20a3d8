//! mdraid Block Device
//!
//! This crate turns a JBOD array, reachable only through primitive seek,
//! read-block and write-block operations, into one flat byte-addressed
//! device.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │     Caller      │  read(addr, len) / write(addr, len)
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │     Mdadm       │
//! │  - BlockMapper  │
//! │  - BlockCache   │
//! └────────┬────────┘
//!          │  Op + 256-byte block
//! ┌────────▼────────┐
//! │   BlockArray    │  (in-memory Jbod or JbodClient over TCP)
//! └─────────────────┘
//! ```
//!
//! Multi-block requests are not atomic: when a primitive fails halfway the
//! blocks already written stay written and the cache keeps what it saw.

pub mod mdadm;
pub mod span;
pub mod stats;

pub use mdadm::Mdadm;
pub use span::{BlockMapper, BlockRange};
pub use stats::IoStats;
