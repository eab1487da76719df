//! Simbridge IPC - raw frame transport for simulator processes.
//!
//! The simulator is launched as a separate process and connects *back* to the
//! client, so from the client's side this crate plays the server role: it
//! binds a local [`Listener`], accepts exactly one connection, and then
//! exchanges opaque frames over the accepted stream.
//!
//! # Protocol
//!
//! Frames carry no length prefix. The peer writes one message per exchange
//! and the client reads it with a single receive call:
//!
//! ```text
//! +------------------------------------------+
//! | Bytes 0..N   (N <= MAX_FRAME_SIZE)       |
//! |------------------------------------------|
//! | ASCII command | UTF-8 JSON | image bytes |
//! +------------------------------------------+
//! ```
//!
//! The exchange is strictly half-duplex: one side writes, the other reads,
//! and nothing is pipelined. Framing therefore relies on the peer waiting
//! for an answer before writing again.
//!
//! # Constraints
//!
//! - Maximum frame size: 120,000 bytes
//! - A receive that returns zero bytes means the peer closed the stream
//! - A receive that fills past the ceiling is rejected as too large
//!
//! # Example
//!
//! ```rust
//! use simbridge_ipc::{Channel, FrameTransport};
//! use std::io::Cursor;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut transport = FrameTransport::new(Cursor::new(b"RESET".to_vec()), Vec::new());
//!
//! let frame = transport.recv()?;
//! assert_eq!(frame, b"RESET");
//!
//! transport.send(b"RECEIVED")?;
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

mod error;
mod listener;
mod transport;

pub use error::{TransportError, TransportResult};
pub use listener::Listener;
pub use transport::{CancelHandle, Channel, FrameTransport, SocketTransport};

/// Maximum accepted frame size in bytes.
pub const MAX_FRAME_SIZE: usize = 120_000;

/// Loopback host the listener binds to.
pub const LOOPBACK_HOST: &str = "127.0.0.1";
