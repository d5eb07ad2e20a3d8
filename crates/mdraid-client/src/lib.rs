//! mdraid Client
//!
//! This crate reaches a JBOD array served over TCP. [`JbodClient`]
//! implements [`mdraid_proto::BlockArray`], so the block device engine can
//! drive a remote array exactly like an in-memory one.

pub mod net;

// Re-exports
pub use net::JbodClient;
