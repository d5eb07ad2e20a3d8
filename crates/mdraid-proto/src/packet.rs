//! Packet framing
//!
//! Each primitive travels as one packet in each direction:
//!
//! ```text
//! ┌──────────────────┬──────────┬─────────────────────────┐
//! │ op word (u32 BE) │ info (1) │ block (256, optional)   │
//! └──────────────────┴──────────┴─────────────────────────┘
//! ```
//!
//! Info bit 0 marks a failed operation (responses only), bit 1 marks that a
//! block payload follows the header.

use bytes::{Buf, BufMut, BytesMut};
use mdraid_common::{BLOCK_SIZE, Block, Error, Result};

/// Length of the fixed packet header
pub const HEADER_LEN: usize = 5;

/// Length of the largest packet
pub const MAX_PACKET_LEN: usize = HEADER_LEN + BLOCK_SIZE;

/// Info bit: operation failed
pub const INFO_FAILED: u8 = 0x01;

/// Info bit: a block payload follows
pub const INFO_PAYLOAD: u8 = 0x02;

const INFO_KNOWN: u8 = INFO_FAILED | INFO_PAYLOAD;

/// Decoded packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub op: u32,
    pub info: u8,
}

impl Header {
    /// Parse a header, rejecting unknown info bits
    pub fn parse(buf: &[u8; HEADER_LEN]) -> Result<Self> {
        let op = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let info = buf[4];
        if info & !INFO_KNOWN != 0 {
            return Err(Error::protocol(format!("unknown info bits {info:#04x}")));
        }
        Ok(Self { op, info })
    }

    /// Whether a block payload follows
    #[must_use]
    pub const fn has_payload(&self) -> bool {
        self.info & INFO_PAYLOAD != 0
    }

    /// Whether the peer reported failure
    #[must_use]
    pub const fn failed(&self) -> bool {
        self.info & INFO_FAILED != 0
    }
}

/// One framed request or response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Raw operation word
    pub op: u32,
    /// Failure flag, only meaningful in responses
    pub failed: bool,
    /// Block payload
    pub payload: Option<Box<Block>>,
}

impl Packet {
    /// Build a request packet
    #[must_use]
    pub fn request(op: u32, payload: Option<&Block>) -> Self {
        Self {
            op,
            failed: false,
            payload: payload.map(|block| Box::new(*block)),
        }
    }

    /// Build a response packet echoing the request's op word
    #[must_use]
    pub fn response(op: u32, ok: bool, payload: Option<&Block>) -> Self {
        Self {
            op,
            failed: !ok,
            payload: payload.map(|block| Box::new(*block)),
        }
    }

    /// Assemble a packet from a parsed header and its payload bytes
    pub fn from_parts(header: Header, payload: Option<&[u8]>) -> Result<Self> {
        let payload = match (header.has_payload(), payload) {
            (false, _) => None,
            (true, Some(bytes)) => {
                let block: Block = bytes.try_into().map_err(|_| {
                    Error::protocol(format!(
                        "payload is {} bytes, expected {BLOCK_SIZE}",
                        bytes.len()
                    ))
                })?;
                Some(Box::new(block))
            }
            (true, None) => return Err(Error::protocol("payload flag set without payload")),
        };
        Ok(Self {
            op: header.op,
            failed: header.failed(),
            payload,
        })
    }

    /// Info byte for this packet
    #[must_use]
    pub const fn info(&self) -> u8 {
        let mut info = 0;
        if self.failed {
            info |= INFO_FAILED;
        }
        if self.payload.is_some() {
            info |= INFO_PAYLOAD;
        }
        info
    }

    /// Number of bytes this packet occupies on the wire
    #[must_use]
    pub const fn encoded_len(&self) -> usize {
        if self.payload.is_some() {
            MAX_PACKET_LEN
        } else {
            HEADER_LEN
        }
    }

    /// Append the wire form to `dst`
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(self.encoded_len());
        dst.put_u32(self.op);
        dst.put_u8(self.info());
        if let Some(block) = &self.payload {
            dst.put_slice(&block[..]);
        }
    }

    /// Wire form as an owned buffer
    #[must_use]
    pub fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf);
        buf
    }

    /// Decode one packet from the front of `src`
    ///
    /// Returns `Ok(None)` and leaves `src` untouched while the frame is
    /// still incomplete.
    pub fn decode(src: &mut BytesMut) -> Result<Option<Self>> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }
        let mut raw = [0u8; HEADER_LEN];
        raw.copy_from_slice(&src[..HEADER_LEN]);
        let header = Header::parse(&raw)?;

        let frame_len = if header.has_payload() {
            MAX_PACKET_LEN
        } else {
            HEADER_LEN
        };
        if src.len() < frame_len {
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let payload = header
            .has_payload()
            .then(|| src.split_to(BLOCK_SIZE));
        Self::from_parts(header, payload.as_deref()).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::Op;

    #[test]
    fn test_header_layout() {
        let packet = Packet::request(Op::SeekToDisk(3).encode(), None);
        let bytes = packet.to_bytes();
        assert_eq!(&bytes[..], &[0x00, 0x00, 0x20, 0x03, 0x00]);
    }

    #[test]
    fn test_payload_flag() {
        let block = [0x5a; BLOCK_SIZE];
        let packet = Packet::request(Op::WriteBlock.encode(), Some(&block));
        let bytes = packet.to_bytes();
        assert_eq!(bytes.len(), MAX_PACKET_LEN);
        assert_eq!(bytes[4], INFO_PAYLOAD);
        assert!(bytes[HEADER_LEN..].iter().all(|&b| b == 0x5a));
    }

    #[test]
    fn test_failed_response_info() {
        let packet = Packet::response(Op::ReadBlock.encode(), false, None);
        assert_eq!(packet.info(), INFO_FAILED);
        assert_eq!(packet.encoded_len(), HEADER_LEN);
    }

    #[test]
    fn test_decode_incomplete_frames() {
        let block = [7u8; BLOCK_SIZE];
        let full = Packet::response(Op::ReadBlock.encode(), true, Some(&block)).to_bytes();

        let mut partial = BytesMut::from(&full[..3]);
        assert!(Packet::decode(&mut partial).unwrap().is_none());
        assert_eq!(partial.len(), 3);

        let mut partial = BytesMut::from(&full[..HEADER_LEN + 10]);
        assert!(Packet::decode(&mut partial).unwrap().is_none());
        assert_eq!(partial.len(), HEADER_LEN + 10);
    }

    #[test]
    fn test_decode_back_to_back() {
        let block = [9u8; BLOCK_SIZE];
        let mut buf = BytesMut::new();
        Packet::request(Op::Mount.encode(), None).encode(&mut buf);
        Packet::request(Op::WriteBlock.encode(), Some(&block)).encode(&mut buf);

        let first = Packet::decode(&mut buf).unwrap().unwrap();
        assert_eq!(Op::decode(first.op).unwrap(), Op::Mount);
        assert!(first.payload.is_none());

        let second = Packet::decode(&mut buf).unwrap().unwrap();
        assert_eq!(Op::decode(second.op).unwrap(), Op::WriteBlock);
        assert_eq!(second.payload.as_deref(), Some(&block));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_unknown_info_bits() {
        let mut buf = BytesMut::from(&[0u8, 0, 0, 0, 0x80][..]);
        assert!(matches!(Packet::decode(&mut buf), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_from_parts_short_payload() {
        let header = Header {
            op: Op::WriteBlock.encode(),
            info: INFO_PAYLOAD,
        };
        assert!(Packet::from_parts(header, Some(&[0u8; 10])).is_err());
        assert!(Packet::from_parts(header, None).is_err());
    }
}
