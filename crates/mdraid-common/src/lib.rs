//! mdraid Common - Shared types and utilities
//!
//! This crate provides the array geometry, configuration structures and the
//! error taxonomy shared by every mdraid component.

pub mod config;
pub mod error;
pub mod types;

pub use config::{CacheConfig, Config, EvictionPolicy, MAX_CACHE_ENTRIES, MIN_CACHE_ENTRIES};
pub use error::{Error, Result};
pub use types::*;
