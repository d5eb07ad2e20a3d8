//! Configuration types for mdraid
//!
//! Both binaries read an optional TOML file into [`Config`] and then apply
//! command line overrides on top of it.

use crate::error::{Error, Result};
use crate::types::Geometry;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Smallest cache the engine accepts
pub const MIN_CACHE_ENTRIES: usize = 2;

/// Largest cache the engine accepts
pub const MAX_CACHE_ENTRIES: usize = 4096;

/// Root configuration for mdraid
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Array layout
    pub geometry: Geometry,
    /// Block cache configuration
    pub cache: CacheConfig,
    /// Network configuration
    pub network: NetworkConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| Error::Configuration(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file, falling back to defaults when it does not exist
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Check geometry and cache bounds
    pub fn validate(&self) -> Result<()> {
        self.geometry.validate()?;
        if self.cache.enabled
            && !(MIN_CACHE_ENTRIES..=MAX_CACHE_ENTRIES).contains(&self.cache.capacity)
        {
            return Err(Error::InvalidCapacity {
                capacity: self.cache.capacity,
                min: MIN_CACHE_ENTRIES,
                max: MAX_CACHE_ENTRIES,
            });
        }
        Ok(())
    }
}

/// Which entry gives way when the cache is full or shrinks
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Evict the least recently used entry; shrinking keeps the most recent
    #[default]
    Lru,
    /// Overwrite the most recently used slot when full; shrinking truncates
    /// the most recent entries
    Legacy,
}

/// Block cache configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Create the cache at startup
    pub enabled: bool,
    /// Number of cache entries
    pub capacity: usize,
    /// Replacement policy
    pub policy: EvictionPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 1024,
            policy: EvictionPolicy::Lru,
        }
    }
}

/// Network configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the array server listens on
    pub listen: String,
    /// Address clients connect to
    pub server: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:3333".to_string(),
            server: "127.0.0.1:3333".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
