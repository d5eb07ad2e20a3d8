//! The byte-addressed device engine
//!
//! [`Mdadm`] owns the array handle, the block cache and the session flags.
//! Each request is validated up front, split into per-block ranges, and
//! then executed as a strictly ordered sequence of primitives.

use crate::span::BlockMapper;
use crate::stats::IoStats;
use mdraid_common::{BLOCK_SIZE, Block, BlockKey, Config, Error, Geometry, MAX_IO_SIZE, Result};
use mdraid_proto::{BlockArray, Op};
use mdraid_storage::BlockCache;
use tracing::{debug, info, trace};

/// Block device session over a JBOD array
pub struct Mdadm<A: BlockArray> {
    /// Array transport
    array: A,
    /// Block cache, inactive until created
    cache: BlockCache,
    /// Address translation
    mapper: BlockMapper,
    /// Array mounted
    mounted: bool,
    /// Write permission granted
    writable: bool,
    /// I/O statistics
    stats: IoStats,
}

impl<A: BlockArray> Mdadm<A> {
    /// Create a session with an inactive cache
    pub fn new(array: A, geometry: Geometry) -> Self {
        Self::with_cache(array, geometry, BlockCache::new(geometry))
    }

    /// Create a session around an existing cache
    pub fn with_cache(array: A, geometry: Geometry, cache: BlockCache) -> Self {
        Self {
            array,
            cache,
            mapper: BlockMapper::new(geometry),
            mounted: false,
            writable: false,
            stats: IoStats::default(),
        }
    }

    /// Create a session from configuration
    pub fn from_config(array: A, config: &Config) -> Result<Self> {
        config.validate()?;
        let cache = BlockCache::from_config(config.geometry, &config.cache)?;
        Ok(Self::with_cache(array, config.geometry, cache))
    }

    /// Get the array layout
    pub const fn geometry(&self) -> Geometry {
        self.mapper.geometry()
    }

    pub const fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub const fn is_writable(&self) -> bool {
        self.writable
    }

    /// Get the block cache
    pub const fn cache(&self) -> &BlockCache {
        &self.cache
    }

    /// Get the block cache for create, destroy and resize
    pub const fn cache_mut(&mut self) -> &mut BlockCache {
        &mut self.cache
    }

    /// Get I/O statistics
    pub const fn stats(&self) -> &IoStats {
        &self.stats
    }

    /// Get the array transport
    pub const fn array(&self) -> &A {
        &self.array
    }

    /// Get the array transport mutably
    pub const fn array_mut(&mut self) -> &mut A {
        &mut self.array
    }

    /// Give the array transport back
    pub fn into_array(self) -> A {
        self.array
    }

    /// Mount the array
    pub fn mount(&mut self) -> Result<()> {
        if self.mounted {
            return Err(Error::already_exists("mounted array"));
        }
        self.issue(Op::Mount, None)?;
        self.mounted = true;
        info!(geometry = ?self.geometry(), "array mounted");
        Ok(())
    }

    /// Unmount the array
    pub fn unmount(&mut self) -> Result<()> {
        if !self.mounted {
            return Err(Error::NotMounted);
        }
        self.issue(Op::Unmount, None)?;
        self.mounted = false;
        info!("array unmounted");
        Ok(())
    }

    /// Grant write permission. Granting twice is allowed.
    pub fn grant_write(&mut self) -> Result<()> {
        self.issue(Op::GrantWrite, None)?;
        self.writable = true;
        debug!("write permission granted");
        Ok(())
    }

    /// Revoke write permission
    pub fn revoke_write(&mut self) -> Result<()> {
        if !self.writable {
            return Err(Error::not_found("write permission"));
        }
        self.issue(Op::RevokeWrite, None)?;
        self.writable = false;
        debug!("write permission revoked");
        Ok(())
    }

    /// Read `len` bytes at `addr` into the front of `buf`
    ///
    /// Cached blocks are served without touching the array; every other
    /// block is fetched and cached.
    ///
    /// # Errors
    ///
    /// Validation errors are returned before any primitive is issued. A
    /// failed primitive aborts the read with `TransportFailure`.
    pub fn read(&mut self, addr: u32, len: u32, buf: &mut [u8]) -> Result<u32> {
        if !self.mounted {
            return Err(Error::NotMounted);
        }
        self.validate(addr, len, buf.len())?;

        let ranges = self
            .mapper
            .byte_range_to_blocks(u64::from(addr), u64::from(len));
        let mut current_disk = ranges.first().map(|r| r.key.disk);
        let mut block = [0u8; BLOCK_SIZE];

        for range in &ranges {
            if current_disk != Some(range.key.disk) {
                // Crossed onto the next disk
                self.seek(BlockKey::new(range.key.disk, 0))?;
                current_disk = Some(range.key.disk);
            }

            if self.cache.is_enabled() && self.cache.lookup(range.key, &mut block).is_ok() {
                self.stats.cache_hits += 1;
            } else {
                self.stats.cache_misses += 1;
                self.seek(range.key)?;
                self.issue(Op::ReadBlock, Some(&mut block))?;
                if self.cache.is_enabled() {
                    self.cache.insert(range.key, &block)?;
                }
            }

            let src = &block[range.offset_in_block..range.offset_in_block + range.length];
            buf[range.buf_offset..range.buf_offset + range.length].copy_from_slice(src);
        }

        self.stats.record_read(u64::from(len));
        trace!(addr, len, blocks = ranges.len(), "read complete");
        Ok(len)
    }

    /// Write the first `len` bytes of `buf` at `addr`
    ///
    /// Every touched block is read from the array, patched and written
    /// back, then cached with its new content.
    ///
    /// # Errors
    ///
    /// Validation errors are returned before any primitive is issued. A
    /// failed primitive aborts the write with `TransportFailure`; blocks
    /// written before the failure keep their new content.
    pub fn write(&mut self, addr: u32, len: u32, buf: &[u8]) -> Result<u32> {
        if !self.mounted {
            return Err(Error::NotMounted);
        }
        if !self.writable {
            return Err(Error::NoWritePermission);
        }
        self.validate(addr, len, buf.len())?;

        let ranges = self
            .mapper
            .byte_range_to_blocks(u64::from(addr), u64::from(len));
        let mut block = [0u8; BLOCK_SIZE];

        for range in &ranges {
            self.seek(range.key)?;
            self.issue(Op::ReadBlock, Some(&mut block))?;

            block[range.offset_in_block..range.offset_in_block + range.length]
                .copy_from_slice(&buf[range.buf_offset..range.buf_offset + range.length]);

            self.seek(range.key)?;
            self.issue(Op::WriteBlock, Some(&mut block))?;
            if self.cache.is_enabled() {
                self.cache.insert(range.key, &block)?;
            }
        }

        self.stats.record_write(u64::from(len));
        trace!(addr, len, blocks = ranges.len(), "write complete");
        Ok(len)
    }

    /// Length, range and buffer checks shared by read and write
    fn validate(&self, addr: u32, len: u32, buf_len: usize) -> Result<()> {
        if len > MAX_IO_SIZE {
            return Err(Error::LengthTooLarge {
                len,
                max: MAX_IO_SIZE,
            });
        }
        let capacity = self.geometry().capacity();
        if u64::from(addr) + u64::from(len) > capacity {
            return Err(Error::OutOfRange {
                addr,
                len,
                capacity,
            });
        }
        let required = len as usize;
        if buf_len < required {
            return Err(Error::InvalidBuffer {
                required,
                actual: buf_len,
            });
        }
        Ok(())
    }

    fn seek(&mut self, key: BlockKey) -> Result<()> {
        self.issue(Op::seek_to_disk(key.disk)?, None)?;
        self.issue(Op::seek_to_block(key.block)?, None)
    }

    /// Send one primitive, reporting any failure as a transport failure
    fn issue(&mut self, op: Op, block: Option<&mut Block>) -> Result<()> {
        self.stats.primitives += 1;
        self.array.perform(op, block).map_err(|e| match e {
            Error::TransportFailure(_) => e,
            other => Error::transport(format!("{op} failed: {other}")),
        })
    }
}
