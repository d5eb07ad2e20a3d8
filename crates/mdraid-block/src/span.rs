//! Address translation
//!
//! Maps byte addresses in the flat device onto (disk, block) pairs.

use mdraid_common::{BLOCK_SIZE, BlockKey, Geometry};

/// The part of a request that falls within one block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRange {
    /// Block holding these bytes
    pub key: BlockKey,
    /// Byte offset within the block
    pub offset_in_block: usize,
    /// Number of bytes in this range
    pub length: usize,
    /// Byte offset within the caller's buffer
    pub buf_offset: usize,
}

/// Maps byte addresses to blocks
///
/// Disks are laid end to end, so a span that runs off the last block of a
/// disk continues at block 0 of the next disk.
///
/// ```text
/// addr ──► disk  = addr / disk_size
///          block = (addr % disk_size) / 256
///          offset_in_block = addr % 256
/// ```
#[derive(Debug, Clone, Copy)]
pub struct BlockMapper {
    geometry: Geometry,
}

impl BlockMapper {
    /// Create a mapper for the given array layout
    #[must_use]
    pub const fn new(geometry: Geometry) -> Self {
        Self { geometry }
    }

    /// Get the array layout
    #[must_use]
    pub const fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Block containing a byte address
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn locate(&self, addr: u64) -> BlockKey {
        let disk_size = self.geometry.disk_size();
        BlockKey::new(
            (addr / disk_size) as u32,
            ((addr % disk_size) / BLOCK_SIZE as u64) as u32,
        )
    }

    /// Index of a block when all disks are laid end to end
    #[must_use]
    pub const fn global_block(&self, key: BlockKey) -> u64 {
        key.disk as u64 * self.geometry.blocks_per_disk() as u64 + key.block as u64
    }

    /// Number of blocks touched by `[addr, addr + len)`
    #[must_use]
    pub const fn span_len(&self, addr: u64, len: u64) -> u64 {
        if len == 0 {
            return 0;
        }
        let first = self.global_block(self.locate(addr));
        let last = self.global_block(self.locate(addr + len - 1));
        last - first + 1
    }

    /// Split a byte range into per-block ranges, in ascending block order
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn byte_range_to_blocks(&self, addr: u64, len: u64) -> Vec<BlockRange> {
        let block_size = BLOCK_SIZE as u64;
        let mut ranges = Vec::with_capacity(self.span_len(addr, len) as usize);

        let end = addr + len;
        let mut cursor = addr;
        while cursor < end {
            let offset_in_block = cursor % block_size;
            let length = (block_size - offset_in_block).min(end - cursor);

            ranges.push(BlockRange {
                key: self.locate(cursor),
                offset_in_block: offset_in_block as usize,
                length: length as usize,
                buf_offset: (cursor - addr) as usize,
            });
            cursor += length;
        }

        ranges
    }
}
