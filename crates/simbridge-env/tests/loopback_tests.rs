//! Full sessions over a real loopback socket
//!
//! A thread plays the simulator, following the protocol byte for byte.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(clippy::indexing_slicing)]

use std::io::{Cursor, Read, Write};
use std::net::TcpStream;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use image::{ImageFormat, Rgb, RgbImage};
use simbridge_env::{Error, PixelDecoder, Session, SessionState};
use simbridge_ipc::{Channel, LOOPBACK_HOST, Listener, SocketTransport, TransportResult};

const HANDSHAKE: &[u8] = br#"{"state_size":2,"observation_size":1,"action_size":3,"action_descriptions":["noop","left","right"],"env_name":"Loopback","action_space_type":"discrete","state_space_type":"continuous","num_agents":1}"#;

fn connect_simulator<F>(script: F) -> (SocketTransport, thread::JoinHandle<()>)
where
    F: FnOnce(TcpStream) + Send + 'static,
{
    let listener = Listener::bind(0).unwrap();
    let port = listener.port();

    let handle = thread::spawn(move || {
        let stream = TcpStream::connect((LOOPBACK_HOST, port)).unwrap();
        script(stream);
    });

    let stream = listener
        .accept_within(Duration::from_secs(5), || TransportResult::Ok(()))
        .unwrap();
    (SocketTransport::from_stream(stream).unwrap(), handle)
}

fn expect(stream: &mut TcpStream, expected: &[u8]) {
    let mut buf = vec![0u8; expected.len()];
    stream.read_exact(&mut buf).unwrap();
    assert_eq!(buf, expected, "simulator read {:?}", String::from_utf8_lossy(&buf));
}

fn png(color: [u8; 3]) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    RgbImage::from_pixel(16, 16, Rgb(color))
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

fn send_tick(stream: &mut TcpStream, color: [u8; 3], state: &str) {
    stream.write_all(&png(color)).unwrap();
    expect(stream, b"RECEIVED");
    stream.write_all(state.as_bytes()).unwrap();
}

#[test]
fn test_full_episode_over_socket() {
    let (transport, simulator) = connect_simulator(|mut stream| {
        stream.write_all(HANDSHAKE).unwrap();
        expect(&mut stream, b".");

        expect(&mut stream, b"RESET");
        send_tick(
            &mut stream,
            [255, 255, 255],
            r#"{"state":[0.0,1.0],"reward":0,"done":"False"}"#,
        );

        expect(&mut stream, b"STEP");
        stream.write_all(b"GO").unwrap();
        expect(&mut stream, br#"{"action":[2],"value":[0.25]}"#);
        send_tick(
            &mut stream,
            [0, 0, 0],
            r#"{"state":[1.0,0.0],"reward":2.5,"done":"True"}"#,
        );

        expect(&mut stream, b"EXIT");
        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).unwrap();
        assert!(rest.is_empty());
    });

    let mut session = Session::connect(transport, Box::new(PixelDecoder::new(4, false))).unwrap();
    assert_eq!(
        session.descriptor().unwrap().environment_name(),
        "Loopback"
    );

    let first = session.reset().unwrap();
    assert_eq!(first.observations.len(), 1);
    assert_eq!(first.observations[0].shape(), [4, 4, 3]);
    assert!((first.observations[0].get(1, 1, 0).unwrap() - 1.0).abs() < 1e-2);
    assert!(!first.done);

    let last = session.step(2_i64, 0.25_f64).unwrap();
    assert!(last.observations[0].as_slice().iter().all(|v| v.abs() < 1e-2));
    assert_eq!(last.state, vec![1.0, 0.0]);
    assert!((last.reward - 2.5).abs() < f64::EPSILON);
    assert!(session.done());
    assert!(matches!(
        session.step(2_i64, 0.25_f64),
        Err(Error::EpisodeComplete)
    ));

    session.close().unwrap();
    simulator.join().unwrap();
}

#[test]
fn test_cancel_unblocks_pending_reset() {
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let (transport, simulator) = connect_simulator(move |mut stream| {
        stream.write_all(HANDSHAKE).unwrap();
        expect(&mut stream, b".");
        expect(&mut stream, b"RESET");
        // Never answer.
        let _ = release_rx.recv();
    });
    let cancel = transport.cancel_handle().unwrap();
    let mut session = Session::connect(transport, Box::new(PixelDecoder::default())).unwrap();

    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        cancel.cancel();
    });

    let err = session.reset().unwrap_err();

    assert!(matches!(err, Error::ConnectionClosed));
    assert_eq!(session.state(), SessionState::Failed);

    canceller.join().unwrap();
    session.close().unwrap();
    release_tx.send(()).unwrap();
    simulator.join().unwrap();
}

#[test]
fn test_silent_simulator_hits_receive_timeout() {
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let (mut transport, simulator) = connect_simulator(move |mut stream| {
        stream.write_all(HANDSHAKE).unwrap();
        expect(&mut stream, b".");
        expect(&mut stream, b"RESET");
        let _ = release_rx.recv();
    });
    transport
        .set_receive_timeout(Some(Duration::from_millis(100)))
        .unwrap();
    let mut session = Session::connect(transport, Box::new(PixelDecoder::default())).unwrap();

    let err = session.reset().unwrap_err();

    assert!(matches!(err, Error::ReceiveTimeout { timeout_ms: 100 }));
    assert_eq!(session.state(), SessionState::Failed);

    drop(session);
    release_tx.send(()).unwrap();
    simulator.join().unwrap();
}

#[test]
fn test_simulator_hanging_up_during_handshake_is_launch_failure() {
    let (transport, simulator) = connect_simulator(drop);
    simulator.join().unwrap();

    let mut session = Session::new(transport);
    let err = session.handshake().unwrap_err();

    assert!(err.is_launch_failure());
    assert_eq!(session.state(), SessionState::Failed);
    assert!(session.channel().is_closed());
}
