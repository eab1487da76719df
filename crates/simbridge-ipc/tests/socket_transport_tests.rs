//! Loopback tests for the socket transport
//!
//! A thread plays the simulator: it connects to the listener and follows a
//! scripted half-duplex exchange.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::io::{Read, Write};
use std::net::TcpStream;
use std::thread;
use std::time::{Duration, Instant};

use simbridge_ipc::{
    Channel, LOOPBACK_HOST, Listener, MAX_FRAME_SIZE, SocketTransport, TransportError,
    TransportResult,
};

fn connect_pair<F>(peer: F) -> (SocketTransport, thread::JoinHandle<()>)
where
    F: FnOnce(TcpStream) + Send + 'static,
{
    let listener = Listener::bind(0).unwrap();
    let port = listener.port();

    let handle = thread::spawn(move || {
        let stream = TcpStream::connect((LOOPBACK_HOST, port)).unwrap();
        peer(stream);
    });

    let stream: TcpStream = listener
        .accept_within(Duration::from_secs(5), || TransportResult::Ok(()))
        .unwrap();
    (SocketTransport::from_stream(stream).unwrap(), handle)
}

fn read_exactly(stream: &mut TcpStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).unwrap();
    buf
}

#[test]
fn test_half_duplex_exchange_roundtrip() {
    let (mut transport, peer) = connect_pair(|mut stream| {
        stream.write_all(br#"{"env_name":"Test"}"#).unwrap();
        assert_eq!(read_exactly(&mut stream, 1), b".");
        assert_eq!(read_exactly(&mut stream, 5), b"RESET");
    });

    let handshake = transport.recv().unwrap();
    assert_eq!(handshake, br#"{"env_name":"Test"}"#);

    transport.send(b".").unwrap();
    transport.send(b"RESET").unwrap();

    peer.join().unwrap();
}

#[test]
fn test_peer_disconnect_is_connection_closed() {
    let (mut transport, peer) = connect_pair(drop);
    peer.join().unwrap();

    assert_eq!(transport.recv(), Err(TransportError::ConnectionClosed));
}

#[test]
fn test_receive_timeout_fires() {
    let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
    let (mut transport, peer) = connect_pair(move |_stream| {
        // Hold the stream open without writing until the test is done.
        let _ = release_rx.recv();
    });

    transport
        .set_receive_timeout(Some(Duration::from_millis(80)))
        .unwrap();

    let started = Instant::now();
    let result = transport.recv();

    assert!(matches!(result, Err(TransportError::Timeout { waited }) if waited == Duration::from_millis(80)));
    assert!(started.elapsed() >= Duration::from_millis(60));

    release_tx.send(()).unwrap();
    peer.join().unwrap();
}

#[test]
fn test_cancel_from_other_thread_unblocks_receive() {
    let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
    let (mut transport, peer) = connect_pair(move |_stream| {
        let _ = release_rx.recv();
    });

    let cancel = transport.cancel_handle().unwrap();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        cancel.cancel();
    });

    assert_eq!(transport.recv(), Err(TransportError::ConnectionClosed));

    canceller.join().unwrap();
    release_tx.send(()).unwrap();
    peer.join().unwrap();
}

#[test]
fn test_close_reaches_peer_as_eof() {
    let (mut transport, peer) = connect_pair(|mut stream| {
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"EXIT");
    });

    transport.send(b"EXIT").unwrap();
    transport.close();

    peer.join().unwrap();
    assert_eq!(transport.send(b"STEP"), Err(TransportError::ConnectionClosed));
}

#[test]
fn test_default_ceiling_matches_protocol() {
    let (transport, peer) = connect_pair(drop);
    peer.join().unwrap();

    assert_eq!(transport.max_frame_size(), MAX_FRAME_SIZE);
    assert_eq!(MAX_FRAME_SIZE, 120_000);
}
