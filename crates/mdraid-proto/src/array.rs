//! The block array seam
//!
//! The I/O engine only ever talks to an array through [`BlockArray`]; whether
//! the array lives in memory or behind a socket is the implementor's concern.

use crate::op::Op;
use mdraid_common::{Block, Result};

/// A JBOD that executes one primitive operation at a time
pub trait BlockArray {
    /// Execute `op`, exchanging `block` for read and write operations.
    ///
    /// # Errors
    ///
    /// Any failure of the primitive is reported as an error; the caller
    /// decides whether to retry.
    fn perform(&mut self, op: Op, block: Option<&mut Block>) -> Result<()>;
}

impl<T: BlockArray + ?Sized> BlockArray for Box<T> {
    fn perform(&mut self, op: Op, block: Option<&mut Block>) -> Result<()> {
        (**self).perform(op, block)
    }
}

impl<T: BlockArray + ?Sized> BlockArray for &mut T {
    fn perform(&mut self, op: Op, block: Option<&mut Block>) -> Result<()> {
        (**self).perform(op, block)
    }
}
