//! Drives the block device engine over TCP against an in-process array

use bytes::BytesMut;
use mdraid_block::Mdadm;
use mdraid_client::JbodClient;
use mdraid_common::{BLOCK_SIZE, BlockKey, Error, Geometry};
use mdraid_proto::{BlockArray, Command, Op, Packet};
use mdraid_storage::Jbod;
use parking_lot::Mutex;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

/// Serve `jbod` to every incoming connection until the test ends
fn spawn_server(jbod: Arc<Mutex<Jbod>>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { break };
            let jbod = Arc::clone(&jbod);
            thread::spawn(move || serve(stream, &jbod));
        }
    });
    addr
}

fn serve(mut stream: TcpStream, jbod: &Mutex<Jbod>) {
    let mut buf = BytesMut::with_capacity(4096);
    let mut chunk = [0u8; 1024];
    loop {
        while let Ok(Some(request)) = Packet::decode(&mut buf) {
            let response = jbod.lock().handle_packet(&request);
            if stream.write_all(&response.to_bytes()).is_err() {
                return;
            }
        }
        match stream.read(&mut chunk) {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
}

fn remote(geometry: Geometry) -> (Arc<Mutex<Jbod>>, JbodClient) {
    let jbod = Arc::new(Mutex::new(Jbod::new(geometry)));
    let addr = spawn_server(Arc::clone(&jbod));
    (jbod, JbodClient::connected(addr).unwrap())
}

#[test]
fn test_primitives_over_tcp() {
    let (jbod, mut client) = remote(Geometry::new(4, 8).unwrap());

    client.perform(Op::Mount, None).unwrap();
    client.perform(Op::GrantWrite, None).unwrap();
    client.perform(Op::SeekToDisk(2), None).unwrap();
    client.perform(Op::SeekToBlock(5), None).unwrap();
    let mut block = [0x42u8; BLOCK_SIZE];
    client.perform(Op::WriteBlock, Some(&mut block)).unwrap();

    client.perform(Op::SeekToBlock(5), None).unwrap();
    let mut read_back = [0u8; BLOCK_SIZE];
    client.perform(Op::ReadBlock, Some(&mut read_back)).unwrap();
    assert_eq!(read_back, block);

    let jbod = jbod.lock();
    assert_eq!(jbod.block(BlockKey::new(2, 5)), Some(&block));
    assert_eq!(jbod.count(Command::SeekToBlock), 2);
}

#[test]
fn test_array_failure_is_transport_failure() {
    let (_jbod, mut client) = remote(Geometry::new(4, 8).unwrap());

    // Not mounted yet
    let err = client.perform(Op::SeekToDisk(0), None).unwrap_err();
    assert!(matches!(err, Error::TransportFailure(_)));
    assert!(client.is_connected());

    client.perform(Op::Mount, None).unwrap();
    assert!(client.perform(Op::SeekToDisk(9), None).is_err());
}

#[test]
fn test_engine_round_trip_over_tcp() {
    let geometry = Geometry::new(4, 8).unwrap();
    let (jbod, client) = remote(geometry);
    let mut mdadm = Mdadm::new(client, geometry);
    mdadm.cache_mut().create(4).unwrap();
    mdadm.mount().unwrap();
    mdadm.grant_write().unwrap();

    let disk_size = u32::try_from(geometry.disk_size()).unwrap();
    let data: Vec<u8> = (0..=255u8).cycle().take(700).collect();
    mdadm.write(disk_size - 100, 700, &data).unwrap();

    let mut buf = vec![0u8; 700];
    mdadm.read(disk_size - 100, 700, &mut buf).unwrap();
    assert_eq!(buf, data);

    mdadm.unmount().unwrap();
    assert!(!jbod.lock().is_mounted());

    let mut client = mdadm.into_array();
    client.disconnect();
    assert!(!client.is_connected());
}

#[test]
fn test_two_clients_share_array() {
    let geometry = Geometry::new(2, 4).unwrap();
    let jbod = Arc::new(Mutex::new(Jbod::new(geometry)));
    let addr = spawn_server(Arc::clone(&jbod));

    let mut writer = Mdadm::new(JbodClient::connected(addr).unwrap(), geometry);
    writer.mount().unwrap();
    writer.grant_write().unwrap();
    writer.write(10, 5, b"share").unwrap();

    // The array is already mounted by the first session
    let mut reader = Mdadm::new(JbodClient::connected(addr).unwrap(), geometry);
    assert!(matches!(reader.mount(), Err(Error::TransportFailure(_))));
    assert_eq!(&jbod.lock().block(BlockKey::new(0, 0)).unwrap()[10..15], b"share");
}
