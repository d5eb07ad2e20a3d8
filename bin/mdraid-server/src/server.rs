//! Packet server for the in-memory array
//!
//! One TCP listener, one task per client. Every request packet is executed
//! under the array lock, so primitives from different clients interleave
//! but never overlap.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use mdraid_proto::Packet;
use mdraid_proto::packet::MAX_PACKET_LEN;
use mdraid_storage::Jbod;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

/// Serves one shared array to any number of clients
pub struct JbodServer {
    jbod: Arc<Mutex<Jbod>>,
}

impl JbodServer {
    pub fn new(jbod: Jbod) -> Self {
        Self {
            jbod: Arc::new(Mutex::new(jbod)),
        }
    }

    /// Shared handle to the served array
    pub fn jbod(&self) -> Arc<Mutex<Jbod>> {
        Arc::clone(&self.jbod)
    }

    /// Accept clients until the task is dropped
    pub async fn serve(self: Arc<Self>, listener: TcpListener) {
        if let Ok(addr) = listener.local_addr() {
            info!("jbod server listening on {addr}");
        }

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let server = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = server.handle_client(stream, peer).await {
                            warn!("client {peer} error: {e}");
                        }
                    });
                }
                Err(e) => {
                    error!("accept error: {e}");
                    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                }
            }
        }
    }

    async fn handle_client(&self, mut stream: TcpStream, peer: SocketAddr) -> anyhow::Result<()> {
        info!("client {peer} connected");
        stream.set_nodelay(true)?;

        let mut buf = BytesMut::with_capacity(MAX_PACKET_LEN * 8);
        let mut handled = 0u64;
        loop {
            while let Some(request) = Packet::decode(&mut buf)? {
                let response = self.jbod.lock().handle_packet(&request);
                stream.write_all(&response.to_bytes()).await?;
                handled += 1;
            }

            if stream.read_buf(&mut buf).await? == 0 {
                if !buf.is_empty() {
                    anyhow::bail!("connection closed with {} bytes of a partial packet", buf.len());
                }
                debug!(peer = %peer, packets = handled, "client finished");
                info!("client {peer} disconnected");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdraid_common::{BLOCK_SIZE, BlockKey, Geometry};
    use mdraid_proto::{HEADER_LEN, Op};

    async fn start() -> (Arc<Mutex<Jbod>>, SocketAddr) {
        let server = Arc::new(JbodServer::new(Jbod::new(Geometry::new(2, 4).unwrap())));
        let jbod = server.jbod();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(server.serve(listener));
        (jbod, addr)
    }

    async fn roundtrip(stream: &mut TcpStream, request: Packet) -> Packet {
        stream.write_all(&request.to_bytes()).await.unwrap();
        let mut buf = BytesMut::new();
        loop {
            if let Some(packet) = Packet::decode(&mut buf).unwrap() {
                return packet;
            }
            assert!(stream.read_buf(&mut buf).await.unwrap() > 0);
        }
    }

    #[tokio::test]
    async fn test_serves_packets() {
        let (jbod, addr) = start().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        let mount = roundtrip(&mut stream, Packet::request(Op::Mount.encode(), None)).await;
        assert!(!mount.failed);
        assert_eq!(mount.op, Op::Mount.encode());

        roundtrip(&mut stream, Packet::request(Op::GrantWrite.encode(), None)).await;
        roundtrip(&mut stream, Packet::request(Op::SeekToDisk(1).encode(), None)).await;
        let block = [9u8; BLOCK_SIZE];
        let write = roundtrip(
            &mut stream,
            Packet::request(Op::WriteBlock.encode(), Some(&block)),
        )
        .await;
        assert!(!write.failed);
        assert_eq!(jbod.lock().block(BlockKey::new(1, 0)), Some(&block));

        roundtrip(&mut stream, Packet::request(Op::SeekToBlock(0).encode(), None)).await;
        let read = roundtrip(&mut stream, Packet::request(Op::ReadBlock.encode(), None)).await;
        assert_eq!(read.payload.as_deref(), Some(&block));
    }

    #[tokio::test]
    async fn test_failure_is_reported_in_band() {
        let (_jbod, addr) = start().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        let response = roundtrip(&mut stream, Packet::request(Op::ReadBlock.encode(), None)).await;
        assert!(response.failed);
        assert!(response.payload.is_none());

        // The connection survives the failure
        let mount = roundtrip(&mut stream, Packet::request(Op::Mount.encode(), None)).await;
        assert!(!mount.failed);
    }

    #[tokio::test]
    async fn test_split_writes_are_reassembled() {
        let (_jbod, addr) = start().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        let bytes = Packet::request(Op::Mount.encode(), None).to_bytes();
        stream.write_all(&bytes[..2]).await.unwrap();
        stream.flush().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        stream.write_all(&bytes[2..]).await.unwrap();

        let mut header = [0u8; HEADER_LEN];
        stream.read_exact(&mut header).await.unwrap();
        assert_eq!(header[4], 0);
    }
}
