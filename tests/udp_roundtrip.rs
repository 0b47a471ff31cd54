//! End-to-end UDP traffic driven through the real reactor and `UdpEntity`,
//! covering both the default-destination send variant and explicit
//! per-datagram destinations.

use std::net::SocketAddr;
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::time::Duration;

use spark_io::endpoint::UdpEndpoint;
use spark_io::entity::{UdpEntity, UdpEntityConfig};
use spark_io::handler::udp::UdpStartIo;
use spark_io::reactor::{Reactor, ReactorConfig};
use spark_io::SharedBuffer;

fn start_reactor() -> Arc<Reactor> {
    Arc::new(
        Reactor::start(ReactorConfig {
            worker_threads: 2,
            events_capacity: 64,
        })
        .expect("reactor starts"),
    )
}

#[test]
fn explicit_destination_round_trip() {
    let reactor = start_reactor();

    let (recv_tx, recv_rx) = channel();
    let receiver = UdpEntity::bind(
        "127.0.0.1:0".parse::<SocketAddr>().unwrap(),
        UdpEntityConfig::default(),
        reactor.clone(),
        move |handle, result| {
            if result.is_ok() {
                let recv_tx = recv_tx.clone();
                handle
                    .start_io(UdpStartIo::Fixed { max_size: 1500 }, move |bytes, _output, from| {
                        let _ = recv_tx.send((bytes, from));
                        true
                    })
                    .unwrap();
            }
        },
    )
    .expect("receiver binds");
    let receiver_addr = receiver.local_addr().expect("receiver exposes its bound address");

    let sender = UdpEntity::bind(
        "127.0.0.1:0".parse::<SocketAddr>().unwrap(),
        UdpEntityConfig::default(),
        reactor.clone(),
        |handle, result| {
            if result.is_ok() {
                handle.start_io(UdpStartIo::NoReader, |_bytes, _output, _from| true).unwrap();
            }
        },
    )
    .expect("sender binds");

    let sent = SharedBuffer::copy_from_slice(b"ping");
    assert!(sender
        .handle()
        .send(sent.clone(), Some(UdpEndpoint(receiver_addr)))
        .unwrap());

    let (received, _from) = recv_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("datagram arrives at the receiver");
    assert_eq!(received, sent.as_slice());
}

#[test]
fn default_destination_allows_send_without_explicit_endpoint() {
    let reactor = start_reactor();

    let (recv_tx, recv_rx) = channel();
    let receiver = UdpEntity::bind(
        "127.0.0.1:0".parse::<SocketAddr>().unwrap(),
        UdpEntityConfig::default(),
        reactor.clone(),
        move |handle, result| {
            if result.is_ok() {
                let recv_tx = recv_tx.clone();
                handle
                    .start_io(UdpStartIo::Fixed { max_size: 1500 }, move |bytes, _output, _from| {
                        let _ = recv_tx.send(bytes);
                        true
                    })
                    .unwrap();
            }
        },
    )
    .expect("receiver binds");
    let receiver_addr = receiver.local_addr().expect("receiver exposes its bound address");

    let sender = UdpEntity::bind(
        "127.0.0.1:0".parse::<SocketAddr>().unwrap(),
        UdpEntityConfig::default(),
        reactor.clone(),
        move |handle, result| {
            if result.is_ok() {
                handle
                    .start_io(
                        UdpStartIo::NoReaderWithDefault {
                            default_endpoint: UdpEndpoint(receiver_addr),
                        },
                        |_bytes, _output, _from| true,
                    )
                    .unwrap();
            }
        },
    )
    .expect("sender binds");

    assert!(sender
        .handle()
        .send(SharedBuffer::copy_from_slice(b"pong"), None)
        .unwrap());

    let received = recv_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("datagram arrives via the sender's default destination");
    assert_eq!(received, b"pong");
}
