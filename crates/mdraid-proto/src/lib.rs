//! mdraid Protocol
//!
//! The narrow operation protocol spoken to a JBOD array: the 32-bit
//! operation word, the packet framing used on the wire, and the
//! [`BlockArray`] trait every array backend implements.

pub mod array;
pub mod op;
pub mod packet;

pub use array::BlockArray;
pub use op::{Command, Op};
pub use packet::{HEADER_LEN, Header, Packet};
