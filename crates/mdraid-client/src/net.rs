//! Blocking TCP transport for a remote JBOD array
//!
//! Each primitive is one request packet followed by one response packet.
//! The caller blocks until the response arrives, so operations on one
//! client never overlap.

use mdraid_common::{BLOCK_SIZE, Block, Error, Result};
use mdraid_proto::{BlockArray, HEADER_LEN, Header, Op, Packet};
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use tracing::{debug, info, trace, warn};

/// Connection to a JBOD server
#[derive(Debug, Default)]
pub struct JbodClient {
    stream: Option<TcpStream>,
}

impl JbodClient {
    /// Create a disconnected client
    #[must_use]
    pub const fn new() -> Self {
        Self { stream: None }
    }

    /// Create a client connected to `addr`
    pub fn connected(addr: impl ToSocketAddrs) -> Result<Self> {
        let mut client = Self::new();
        client.connect(addr)?;
        Ok(client)
    }

    /// Open the connection
    ///
    /// # Errors
    ///
    /// `AlreadyExists` when a connection is open, `TransportFailure` when
    /// the server cannot be reached.
    pub fn connect(&mut self, addr: impl ToSocketAddrs) -> Result<()> {
        if self.stream.is_some() {
            return Err(Error::already_exists("jbod connection"));
        }
        let stream = TcpStream::connect(addr)
            .map_err(|e| Error::transport(format!("connect failed: {e}")))?;
        stream
            .set_nodelay(true)
            .map_err(|e| Error::transport(format!("set_nodelay failed: {e}")))?;
        info!(peer = ?stream.peer_addr().ok(), "connected to jbod server");
        self.stream = Some(stream);
        Ok(())
    }

    /// Close the connection if one is open
    pub fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            // The peer may already be gone
            let _ = stream.shutdown(Shutdown::Both);
            debug!("disconnected from jbod server");
        }
    }

    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Address of the connected server
    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.as_ref().and_then(|s| s.peer_addr().ok())
    }

    /// Send one request and wait for its response
    fn exchange(&mut self, request: &Packet) -> Result<Packet> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| Error::transport("not connected"))?;

        let result = send_packet(stream, request).and_then(|()| recv_packet(stream));
        if let Err(e) = &result {
            // The stream position is unknown after a broken exchange
            warn!("dropping jbod connection: {e}");
            self.disconnect();
        }
        result
    }
}

impl Drop for JbodClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl BlockArray for JbodClient {
    fn perform(&mut self, op: Op, block: Option<&mut Block>) -> Result<()> {
        let word = op.encode();
        let outgoing = match (&op, block.as_deref()) {
            (Op::WriteBlock, Some(data)) => Some(data),
            (Op::WriteBlock, None) => {
                return Err(Error::InvalidBuffer {
                    required: BLOCK_SIZE,
                    actual: 0,
                });
            }
            _ => None,
        };

        let response = self.exchange(&Packet::request(word, outgoing))?;
        trace!(%op, failed = response.failed, "jbod response");

        if response.op != word {
            return Err(Error::transport(format!(
                "response op {:#010x} does not match request {word:#010x}",
                response.op
            )));
        }
        if response.failed {
            return Err(Error::transport(format!("{op} rejected by array")));
        }

        if op == Op::ReadBlock {
            let payload = response
                .payload
                .ok_or_else(|| Error::transport("read response carried no block"))?;
            if let Some(buf) = block {
                buf.copy_from_slice(&payload[..]);
            }
        }
        Ok(())
    }
}

fn send_packet(stream: &mut TcpStream, packet: &Packet) -> Result<()> {
    stream
        .write_all(&packet.to_bytes())
        .map_err(|e| Error::transport(format!("send failed: {e}")))
}

fn recv_packet(stream: &mut TcpStream) -> Result<Packet> {
    let mut raw = [0u8; HEADER_LEN];
    stream
        .read_exact(&mut raw)
        .map_err(|e| Error::transport(format!("receive failed: {e}")))?;
    let header = Header::parse(&raw).map_err(|e| Error::transport(e.to_string()))?;

    if !header.has_payload() {
        return Packet::from_parts(header, None);
    }
    let mut payload = [0u8; BLOCK_SIZE];
    stream
        .read_exact(&mut payload)
        .map_err(|e| Error::transport(format!("receive failed: {e}")))?;
    Packet::from_parts(header, Some(&payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_not_connected() {
        let mut client = JbodClient::new();
        assert!(!client.is_connected());
        assert!(matches!(
            client.perform(Op::Mount, None),
            Err(Error::TransportFailure(_))
        ));
        client.disconnect();
    }

    #[test]
    fn test_connect_twice() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let mut client = JbodClient::connected(addr).unwrap();
        assert!(matches!(client.connect(addr), Err(Error::AlreadyExists(_))));
        assert_eq!(client.peer_addr(), Some(addr));
        client.disconnect();
        assert!(!client.is_connected());
    }

    #[test]
    fn test_connect_refused() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let mut client = JbodClient::new();
        assert!(matches!(client.connect(addr), Err(Error::TransportFailure(_))));
    }

    #[test]
    fn test_server_hangup_disconnects() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            drop(stream);
        });

        let mut client = JbodClient::connected(addr).unwrap();
        server.join().unwrap();
        let err = client.perform(Op::Mount, None).unwrap_err();
        assert!(err.is_retryable());
        assert!(!client.is_connected());
    }
}
