//! Operation word encoding
//!
//! Every primitive sent to the array is packed into one 32-bit word:
//!
//! ```text
//!  31        20 19      12 11       4
//! ┌────────────┬──────────┬──────────┐
//! │  reserved  │ command  │ block id │
//! └────────────┴──────────┴────┬─────┘
//!                         7    │    0
//!                        ┌─────┴────┐
//!                        │ disk id  │
//!                        └──────────┘
//! ```
//!
//! The disk field (bits 0-7) and block field (bits 4-11) overlap. Only seek
//! operations carry an id and each carries exactly one, so a word stays
//! unambiguous once the command is known.

use mdraid_common::{BlockId, DiskId, Error, Result};
use std::fmt;

const DISK_SHIFT: u32 = 0;
const BLOCK_SHIFT: u32 = 4;
const COMMAND_SHIFT: u32 = 12;
const FIELD_MASK: u32 = 0xff;

/// Array command codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Command {
    Mount = 0,
    Unmount = 1,
    SeekToDisk = 2,
    SeekToBlock = 3,
    ReadBlock = 4,
    WriteBlock = 5,
    GrantWrite = 6,
    RevokeWrite = 7,
}

impl Command {
    /// All commands in code order
    pub const ALL: [Self; 8] = [
        Self::Mount,
        Self::Unmount,
        Self::SeekToDisk,
        Self::SeekToBlock,
        Self::ReadBlock,
        Self::WriteBlock,
        Self::GrantWrite,
        Self::RevokeWrite,
    ];

    /// Wire code
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Name used in logs and trace files
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Mount => "MOUNT",
            Self::Unmount => "UNMOUNT",
            Self::SeekToDisk => "SEEK_TO_DISK",
            Self::SeekToBlock => "SEEK_TO_BLOCK",
            Self::ReadBlock => "READ_BLOCK",
            Self::WriteBlock => "WRITE_BLOCK",
            Self::GrantWrite => "WRITE_PERMISSION",
            Self::RevokeWrite => "REVOKE_WRITE_PERMISSION",
        }
    }
}

impl TryFrom<u8> for Command {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self> {
        Self::ALL
            .get(usize::from(code))
            .copied()
            .ok_or_else(|| Error::protocol(format!("unknown command code {code}")))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One primitive array operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Mount,
    Unmount,
    GrantWrite,
    RevokeWrite,
    SeekToDisk(u8),
    SeekToBlock(u8),
    ReadBlock,
    WriteBlock,
}

impl Op {
    /// Seek to a disk, checking that the id fits the wire field
    pub fn seek_to_disk(disk: DiskId) -> Result<Self> {
        u8::try_from(disk)
            .map(Self::SeekToDisk)
            .map_err(|_| Error::InvalidKey { disk, block: 0 })
    }

    /// Seek to a block, checking that the id fits the wire field
    pub fn seek_to_block(block: BlockId) -> Result<Self> {
        u8::try_from(block)
            .map(Self::SeekToBlock)
            .map_err(|_| Error::InvalidKey { disk: 0, block })
    }

    /// Command code of this operation
    #[must_use]
    pub const fn command(self) -> Command {
        match self {
            Self::Mount => Command::Mount,
            Self::Unmount => Command::Unmount,
            Self::GrantWrite => Command::GrantWrite,
            Self::RevokeWrite => Command::RevokeWrite,
            Self::SeekToDisk(_) => Command::SeekToDisk,
            Self::SeekToBlock(_) => Command::SeekToBlock,
            Self::ReadBlock => Command::ReadBlock,
            Self::WriteBlock => Command::WriteBlock,
        }
    }

    /// Whether the operation exchanges a block buffer with the array
    #[must_use]
    pub const fn needs_block(self) -> bool {
        matches!(self, Self::ReadBlock | Self::WriteBlock)
    }

    /// Pack into the 32-bit wire word
    #[must_use]
    pub const fn encode(self) -> u32 {
        let (disk, block) = match self {
            Self::SeekToDisk(disk) => (disk as u32, 0),
            Self::SeekToBlock(block) => (0, block as u32),
            _ => (0, 0),
        };
        ((disk & FIELD_MASK) << DISK_SHIFT)
            | ((block & FIELD_MASK) << BLOCK_SHIFT)
            | ((self.command().code() as u32 & FIELD_MASK) << COMMAND_SHIFT)
    }

    /// Unpack a wire word
    pub fn decode(word: u32) -> Result<Self> {
        #[allow(clippy::cast_possible_truncation)]
        let field = |shift: u32| ((word >> shift) & FIELD_MASK) as u8;

        let op = match Command::try_from(field(COMMAND_SHIFT))? {
            Command::Mount => Self::Mount,
            Command::Unmount => Self::Unmount,
            Command::GrantWrite => Self::GrantWrite,
            Command::RevokeWrite => Self::RevokeWrite,
            Command::SeekToDisk => Self::SeekToDisk(field(DISK_SHIFT)),
            Command::SeekToBlock => Self::SeekToBlock(field(BLOCK_SHIFT)),
            Command::ReadBlock => Self::ReadBlock,
            Command::WriteBlock => Self::WriteBlock,
        };
        Ok(op)
    }
}

impl From<Op> for u32 {
    fn from(op: Op) -> Self {
        op.encode()
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SeekToDisk(disk) => write!(f, "{}({disk})", self.command()),
            Self::SeekToBlock(block) => write!(f, "{}({block})", self.command()),
            _ => write!(f, "{}", self.command()),
        }
    }
}
