//! In-memory JBOD array
//!
//! Executes the primitive operation protocol against blocks held in memory.
//! The server binary exposes it over TCP and the engine tests drive it
//! directly.
//!
//! Device semantics:
//! - every operation except `MOUNT` fails while unmounted
//! - `SEEK_TO_DISK` moves the cursor to block 0 of that disk
//! - `READ_BLOCK`/`WRITE_BLOCK` act on the cursor and advance it one block
//! - `WRITE_BLOCK` fails until write permission is granted

use mdraid_common::{BLOCK_SIZE, Block, BlockKey, Error, Geometry, Result};
use mdraid_proto::{BlockArray, Command, Op, Packet};
use tracing::{debug, trace, warn};

/// An array of in-memory disks
pub struct Jbod {
    geometry: Geometry,
    /// Block contents, disk-major
    blocks: Vec<Block>,
    mounted: bool,
    writable: bool,
    cursor: BlockKey,
    /// Operations received, indexed by command code
    counts: [u64; Command::ALL.len()],
}

impl Jbod {
    /// Create a zero-filled array
    #[must_use]
    pub fn new(geometry: Geometry) -> Self {
        let total = usize::try_from(geometry.total_blocks()).unwrap_or(usize::MAX);
        Self {
            geometry,
            blocks: vec![[0; BLOCK_SIZE]; total],
            mounted: false,
            writable: false,
            cursor: BlockKey::new(0, 0),
            counts: [0; Command::ALL.len()],
        }
    }

    /// Get the array layout
    #[must_use]
    pub const fn geometry(&self) -> Geometry {
        self.geometry
    }

    #[must_use]
    pub const fn is_mounted(&self) -> bool {
        self.mounted
    }

    #[must_use]
    pub const fn is_writable(&self) -> bool {
        self.writable
    }

    /// Current I/O position
    #[must_use]
    pub const fn cursor(&self) -> BlockKey {
        self.cursor
    }

    /// Number of operations received for one command
    #[must_use]
    pub const fn count(&self, command: Command) -> u64 {
        self.counts[command as usize]
    }

    /// Number of operations received in total
    #[must_use]
    pub fn ops_issued(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Forget the operation counters
    pub fn reset_counts(&mut self) {
        self.counts = [0; Command::ALL.len()];
    }

    /// Inspect a block without going through the protocol
    #[must_use]
    pub fn block(&self, key: BlockKey) -> Option<&Block> {
        self.index(key).map(|index| &self.blocks[index])
    }

    /// Execute one request packet and build the response
    ///
    /// Failures are reported in the response, never as an error, so that a
    /// misbehaving client cannot tear down the server loop.
    pub fn handle_packet(&mut self, request: &Packet) -> Packet {
        let op = match Op::decode(request.op) {
            Ok(op) => op,
            Err(e) => {
                warn!(word = request.op, "rejecting packet: {e}");
                return Packet::response(request.op, false, None);
            }
        };

        // A write without a payload reaches execute with no block and fails there
        let mut block = request.payload.as_deref().copied();
        let mut scratch = [0; BLOCK_SIZE];
        let exchange = if op == Op::WriteBlock {
            block.as_mut()
        } else {
            op.needs_block().then_some(&mut scratch)
        };
        match self.perform(op, exchange) {
            Ok(()) => {
                let payload = matches!(op, Op::ReadBlock).then_some(&scratch);
                Packet::response(request.op, true, payload)
            }
            Err(e) => {
                debug!(%op, "operation failed: {e}");
                Packet::response(request.op, false, None)
            }
        }
    }

    fn index(&self, key: BlockKey) -> Option<usize> {
        self.geometry.contains(key).then(|| {
            (key.disk as usize) * (self.geometry.blocks_per_disk() as usize) + key.block as usize
        })
    }

    /// Index of the block under the cursor, advancing the cursor past it
    fn take_cursor(&mut self) -> Result<usize> {
        let key = self.cursor;
        let index = self.index(key).ok_or(Error::InvalidKey {
            disk: key.disk,
            block: key.block,
        })?;
        self.cursor.block += 1;
        Ok(index)
    }

    fn execute(&mut self, op: Op, block: Option<&mut Block>) -> Result<()> {
        if !self.mounted && op != Op::Mount {
            return Err(Error::NotMounted);
        }

        match op {
            Op::Mount => {
                if self.mounted {
                    return Err(Error::already_exists("mounted array"));
                }
                self.mounted = true;
            }
            Op::Unmount => self.mounted = false,
            Op::GrantWrite => self.writable = true,
            Op::RevokeWrite => self.writable = false,
            Op::SeekToDisk(disk) => {
                let disk = u32::from(disk);
                if disk >= self.geometry.disks() {
                    return Err(Error::InvalidKey { disk, block: 0 });
                }
                self.cursor = BlockKey::new(disk, 0);
            }
            Op::SeekToBlock(block) => {
                let block = u32::from(block);
                if block >= self.geometry.blocks_per_disk() {
                    return Err(Error::InvalidKey {
                        disk: self.cursor.disk,
                        block,
                    });
                }
                self.cursor.block = block;
            }
            Op::ReadBlock => {
                let buf = block.ok_or(Error::InvalidBuffer {
                    required: BLOCK_SIZE,
                    actual: 0,
                })?;
                let index = self.take_cursor()?;
                buf.copy_from_slice(&self.blocks[index]);
            }
            Op::WriteBlock => {
                if !self.writable {
                    return Err(Error::NoWritePermission);
                }
                let buf = block.ok_or(Error::InvalidBuffer {
                    required: BLOCK_SIZE,
                    actual: 0,
                })?;
                let index = self.take_cursor()?;
                self.blocks[index].copy_from_slice(buf);
            }
        }
        Ok(())
    }
}

impl BlockArray for Jbod {
    fn perform(&mut self, op: Op, block: Option<&mut Block>) -> Result<()> {
        self.counts[op.command() as usize] += 1;
        trace!(%op, cursor = %self.cursor, "jbod op");
        self.execute(op, block)
    }
}
