//! Block cache for the array
//!
//! Every array primitive is a network round trip, so recently touched
//! blocks are kept in a fixed-size table in front of the array.
//!
//! The table is a single `Vec` ordered by recency: index 0 holds the least
//! recently used valid entry, valid entries are contiguous, and the highest
//! valid index holds the most recently used one. Unused slots trail the
//! valid region. Touching an entry rotates it to the end of the valid
//! region in place, so no operation allocates after `create`.

use mdraid_common::config::{CacheConfig, EvictionPolicy, MAX_CACHE_ENTRIES, MIN_CACHE_ENTRIES};
use mdraid_common::{BLOCK_SIZE, Block, BlockKey, Error, Geometry, Result};
use tracing::{debug, trace};

/// One slot of the cache table
#[derive(Clone)]
struct CacheEntry {
    valid: bool,
    key: BlockKey,
    content: Block,
    /// Clock value of the last access
    last_used: u64,
}

impl CacheEntry {
    const fn empty() -> Self {
        Self {
            valid: false,
            key: BlockKey::new(0, 0),
            content: [0; BLOCK_SIZE],
            last_used: 0,
        }
    }
}

/// Result of [`BlockCache::insert`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new entry was placed
    Inserted,
    /// An existing entry received new content
    Updated,
    /// The entry already held identical content; recency is untouched
    Unchanged,
}

/// Cache statistics for diagnostics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of lookups
    pub queries: u64,
    /// Number of lookups that found their block
    pub hits: u64,
    /// Number of valid entries overwritten to make room
    pub evictions: u64,
}

impl CacheStats {
    /// Number of lookups that missed
    #[must_use]
    pub const fn misses(&self) -> u64 {
        self.queries - self.hits
    }

    /// Calculate hit ratio (0.0 to 1.0)
    #[must_use]
    pub fn hit_ratio(&self) -> f64 {
        if self.queries == 0 {
            return 0.0;
        }
        self.hits as f64 / self.queries as f64
    }
}

/// LRU block cache keyed by (disk, block)
pub struct BlockCache {
    /// Ordered table, `None` while no cache is active
    entries: Option<Vec<CacheEntry>>,
    /// Array layout used to validate keys
    geometry: Geometry,
    /// Replacement policy for full inserts and shrinking
    policy: EvictionPolicy,
    /// Logical clock for recency stamps
    clock: u64,
    /// Cache statistics
    stats: CacheStats,
}

impl BlockCache {
    /// Create an inactive cache for the given array layout
    #[must_use]
    pub fn new(geometry: Geometry) -> Self {
        Self::with_policy(geometry, EvictionPolicy::default())
    }

    /// Create an inactive cache with a specific eviction policy
    #[must_use]
    pub const fn with_policy(geometry: Geometry, policy: EvictionPolicy) -> Self {
        Self {
            entries: None,
            geometry,
            policy,
            clock: 0,
            stats: CacheStats {
                queries: 0,
                hits: 0,
                evictions: 0,
            },
        }
    }

    /// Build a cache from configuration, activating it when enabled
    pub fn from_config(geometry: Geometry, config: &CacheConfig) -> Result<Self> {
        let mut cache = Self::with_policy(geometry, config.policy);
        if config.enabled {
            cache.create(config.capacity)?;
        }
        Ok(cache)
    }

    /// Activate the cache with `capacity` empty entries
    pub fn create(&mut self, capacity: usize) -> Result<()> {
        if self.entries.is_some() {
            return Err(Error::already_exists("block cache"));
        }
        check_capacity(capacity)?;

        self.entries = Some(vec![CacheEntry::empty(); capacity]);
        debug!(capacity, policy = ?self.policy, "block cache created");
        Ok(())
    }

    /// Release all entries and reset the counters
    pub fn destroy(&mut self) -> Result<()> {
        if self.entries.take().is_none() {
            return Err(Error::not_found("block cache"));
        }
        self.clock = 0;
        self.stats = CacheStats::default();
        debug!("block cache destroyed");
        Ok(())
    }

    /// Whether a cache is active
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.entries.is_some()
    }

    /// Number of slots, zero while inactive
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.as_ref().map_or(0, Vec::len)
    }

    /// Number of valid entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.as_deref().map_or(0, valid_len)
    }

    /// Check if the cache holds no valid entry
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the eviction policy
    #[must_use]
    pub const fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    /// Get cache statistics
    #[must_use]
    pub const fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Cached keys from least to most recently used
    #[must_use]
    pub fn keys(&self) -> Vec<BlockKey> {
        self.entries
            .as_deref()
            .map(|entries| entries[..valid_len(entries)].iter().map(|e| e.key).collect())
            .unwrap_or_default()
    }

    /// Key of the most recently used entry
    #[must_use]
    pub fn most_recent(&self) -> Option<BlockKey> {
        let entries = self.entries.as_deref()?;
        valid_len(entries)
            .checked_sub(1)
            .map(|last| entries[last].key)
    }

    /// Copy a cached block into `out` and mark it most recently used
    ///
    /// # Errors
    ///
    /// `NotFound` when no cache is active or the block is not cached.
    pub fn lookup(&mut self, key: BlockKey, out: &mut Block) -> Result<()> {
        self.clock += 1;
        let clock = self.clock;
        let entries = self
            .entries
            .as_mut()
            .ok_or_else(|| Error::not_found("block cache"))?;

        self.stats.queries += 1;
        let index = position(entries, key).ok_or_else(|| Error::not_found(key.to_string()))?;
        self.stats.hits += 1;

        out.copy_from_slice(&entries[index].content);
        entries[index].last_used = clock;
        promote(entries, index);
        trace!(%key, "cache hit");
        Ok(())
    }

    /// Overwrite a cached block and mark it most recently used
    ///
    /// Does nothing when no cache is active or the block is not cached.
    pub fn update(&mut self, key: BlockKey, buf: &Block) {
        self.clock += 1;
        let clock = self.clock;
        let Some(entries) = self.entries.as_mut() else {
            return;
        };
        if let Some(index) = position(entries, key) {
            overwrite(entries, index, buf, clock);
        }
    }

    /// Insert or refresh a block
    ///
    /// A new key takes the first unused slot; when the table is full the
    /// victim is chosen by the eviction policy. Either way the entry ends up
    /// most recently used.
    ///
    /// # Errors
    ///
    /// `InvalidKey` when the key lies outside the array or no cache is
    /// active.
    pub fn insert(&mut self, key: BlockKey, buf: &Block) -> Result<InsertOutcome> {
        let invalid = Error::InvalidKey {
            disk: key.disk,
            block: key.block,
        };
        if !self.geometry.contains(key) {
            return Err(invalid);
        }
        let Some(entries) = self.entries.as_mut() else {
            return Err(invalid);
        };
        self.clock += 1;
        let clock = self.clock;

        if let Some(index) = position(entries, key) {
            if entries[index].content == *buf {
                return Ok(InsertOutcome::Unchanged);
            }
            overwrite(entries, index, buf, clock);
            return Ok(InsertOutcome::Updated);
        }

        let valid = valid_len(entries);
        let slot = if valid < entries.len() {
            valid
        } else {
            let victim = match self.policy {
                EvictionPolicy::Lru => 0,
                EvictionPolicy::Legacy => entries.len() - 1,
            };
            trace!(evicted = %entries[victim].key, %key, "cache eviction");
            self.stats.evictions += 1;
            victim
        };

        entries[slot] = CacheEntry {
            valid: true,
            key,
            content: *buf,
            last_used: clock,
        };
        promote(entries, slot);
        Ok(InsertOutcome::Inserted)
    }

    /// Change the number of slots
    ///
    /// Growing appends unused slots. Shrinking drops unused slots first;
    /// valid entries beyond the new capacity are then discarded from the
    /// least recent end (`Lru`) or the most recent end (`Legacy`).
    pub fn resize(&mut self, capacity: usize) -> Result<()> {
        let entries = self
            .entries
            .as_mut()
            .ok_or_else(|| Error::not_found("block cache"))?;
        check_capacity(capacity)?;

        let old = entries.len();
        let valid = valid_len(entries);
        if capacity >= old {
            entries.resize(capacity, CacheEntry::empty());
        } else if capacity >= valid || self.policy == EvictionPolicy::Legacy {
            entries.truncate(capacity);
        } else {
            entries.drain(..valid - capacity);
            entries.truncate(capacity);
        }
        debug!(from = old, to = capacity, "block cache resized");
        Ok(())
    }

    /// One-line hit rate summary
    #[must_use]
    pub fn hit_rate_report(&self) -> String {
        format!(
            "num_hits: {}, num_queries: {}, hit rate: {:5.1}%",
            self.stats.hits,
            self.stats.queries,
            self.stats.hit_ratio() * 100.0
        )
    }
}

fn check_capacity(capacity: usize) -> Result<()> {
    if (MIN_CACHE_ENTRIES..=MAX_CACHE_ENTRIES).contains(&capacity) {
        Ok(())
    } else {
        Err(Error::InvalidCapacity {
            capacity,
            min: MIN_CACHE_ENTRIES,
            max: MAX_CACHE_ENTRIES,
        })
    }
}

/// Length of the valid prefix
fn valid_len(entries: &[CacheEntry]) -> usize {
    entries.iter().position(|e| !e.valid).unwrap_or(entries.len())
}

fn position(entries: &[CacheEntry], key: BlockKey) -> Option<usize> {
    entries.iter().take_while(|e| e.valid).position(|e| e.key == key)
}

fn overwrite(entries: &mut [CacheEntry], index: usize, buf: &Block, clock: u64) {
    entries[index].content.copy_from_slice(buf);
    entries[index].last_used = clock;
    promote(entries, index);
}

/// Move the entry at `index` to the end of the valid region, shifting the
/// entries after it one slot towards the front.
fn promote(entries: &mut [CacheEntry], index: usize) {
    let end = valid_len(entries);
    debug_assert!(index < end);
    entries[index..end].rotate_left(1);
}
