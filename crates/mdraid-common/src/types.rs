//! Core type definitions for mdraid
//!
//! Array geometry, block identifiers and the fixed block buffer type.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of one block in bytes. Fixed by the wire format.
pub const BLOCK_SIZE: usize = 256;

/// Largest byte count a single read or write may request
pub const MAX_IO_SIZE: u32 = 1024;

/// Disk ids travel in an 8-bit field of the operation word
pub const MAX_DISKS: u32 = 256;

/// Block ids travel in an 8-bit field of the operation word
pub const MAX_BLOCKS_PER_DISK: u32 = 256;

/// Content of one block
pub type Block = [u8; BLOCK_SIZE];

/// Disk index within the array
pub type DiskId = u32;

/// Block index within a disk
pub type BlockId = u32;

/// Identifies one block across the whole array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockKey {
    pub disk: DiskId,
    pub block: BlockId,
}

impl BlockKey {
    #[must_use]
    pub const fn new(disk: DiskId, block: BlockId) -> Self {
        Self { disk, block }
    }
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "disk{}/block{}", self.disk, self.block)
    }
}

/// Physical layout of the disk array
///
/// ```text
/// Array (disks × blocks_per_disk × 256 bytes)
/// ├── Disk 0:  bytes 0 .. disk_size
/// │   ├── Block 0:  bytes 0 .. 256
/// │   └── ...
/// ├── Disk 1:  bytes disk_size .. 2 * disk_size
/// │   ...
/// └── Disk D-1
/// ```
///
/// Fields are private so every value has passed [`Geometry::validate`],
/// whether built with [`Geometry::new`] or deserialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "GeometryFields")]
pub struct Geometry {
    /// Number of disks in the array
    disks: u32,
    /// Number of blocks on every disk
    blocks_per_disk: u32,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            disks: 16,
            blocks_per_disk: 256,
        }
    }
}

/// Unchecked geometry as it appears in a config file
#[derive(Deserialize)]
#[serde(default)]
struct GeometryFields {
    disks: u32,
    blocks_per_disk: u32,
}

impl Default for GeometryFields {
    fn default() -> Self {
        let geometry = Geometry::default();
        Self {
            disks: geometry.disks,
            blocks_per_disk: geometry.blocks_per_disk,
        }
    }
}

impl TryFrom<GeometryFields> for Geometry {
    type Error = Error;

    fn try_from(fields: GeometryFields) -> Result<Self> {
        Self::new(fields.disks, fields.blocks_per_disk)
    }
}

impl Geometry {
    /// Create a validated geometry
    pub fn new(disks: u32, blocks_per_disk: u32) -> Result<Self> {
        let geometry = Self {
            disks,
            blocks_per_disk,
        };
        geometry.validate()?;
        Ok(geometry)
    }

    /// Check that disk and block ids fit the operation word fields
    pub fn validate(&self) -> Result<()> {
        if self.disks == 0 || self.disks > MAX_DISKS {
            return Err(Error::Configuration(format!(
                "disk count {} must be within 1..={MAX_DISKS}",
                self.disks
            )));
        }
        if self.blocks_per_disk == 0 || self.blocks_per_disk > MAX_BLOCKS_PER_DISK {
            return Err(Error::Configuration(format!(
                "blocks per disk {} must be within 1..={MAX_BLOCKS_PER_DISK}",
                self.blocks_per_disk
            )));
        }
        Ok(())
    }

    /// Number of disks in the array
    #[must_use]
    pub const fn disks(&self) -> u32 {
        self.disks
    }

    /// Number of blocks on every disk
    #[must_use]
    pub const fn blocks_per_disk(&self) -> u32 {
        self.blocks_per_disk
    }

    /// Block size in bytes
    #[must_use]
    pub const fn block_size(&self) -> u64 {
        BLOCK_SIZE as u64
    }

    /// Size of one disk in bytes
    #[must_use]
    pub const fn disk_size(&self) -> u64 {
        self.blocks_per_disk as u64 * BLOCK_SIZE as u64
    }

    /// Total addressable bytes
    #[must_use]
    pub const fn capacity(&self) -> u64 {
        self.disks as u64 * self.disk_size()
    }

    /// Total number of blocks in the array
    #[must_use]
    pub const fn total_blocks(&self) -> u64 {
        self.disks as u64 * self.blocks_per_disk as u64
    }

    /// Check whether a key addresses a block inside the array
    #[must_use]
    pub const fn contains(&self, key: BlockKey) -> bool {
        key.disk < self.disks && key.block < self.blocks_per_disk
    }
}
