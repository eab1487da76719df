//! Transport layer for unframed, half-duplex byte exchanges
//!
//! # Type Parameters
//! - `R`: Reader type (implements std::io::Read)
//! - `W`: Writer type (implements std::io::Write)
//!
//! # Thread Safety
//! - The transport itself must be externally synchronized (`&mut self`)
//! - [`CancelHandle`] is `Send + Sync` and may be used from any thread

use crate::{MAX_FRAME_SIZE, TransportError, TransportResult};
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A bidirectional frame channel to the simulator.
///
/// This is the seam between the session logic and the socket: the session
/// only ever talks to a `Channel`, so tests can drive it with scripted
/// in-memory peers.
pub trait Channel {
    /// Write one frame and flush it.
    ///
    /// # Errors
    /// Returns [`TransportError::ConnectionClosed`] once the channel is closed,
    /// or [`TransportError::WriteFailed`] if the stream rejects the write.
    fn send(&mut self, frame: &[u8]) -> TransportResult<()>;

    /// Block until one frame arrives.
    ///
    /// # Errors
    /// Returns [`TransportError::ConnectionClosed`] on end of stream,
    /// [`TransportError::Timeout`] when the receive deadline passes and
    /// [`TransportError::FrameTooLarge`] when the frame exceeds the ceiling.
    fn recv(&mut self) -> TransportResult<Vec<u8>>;

    /// Release the underlying stream. Calling this twice is harmless.
    fn close(&mut self);

    /// Whether [`close`](Channel::close) has been called.
    fn is_closed(&self) -> bool;
}

impl<C: Channel + ?Sized> Channel for Box<C> {
    fn send(&mut self, frame: &[u8]) -> TransportResult<()> {
        (**self).send(frame)
    }

    fn recv(&mut self) -> TransportResult<Vec<u8>> {
        (**self).recv()
    }

    fn close(&mut self) {
        (**self).close();
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }
}

/// Shuts a socket down from outside the thread that is blocked on it.
///
/// Cancellation is modelled as closing the stream: a receive blocked in
/// another thread wakes up with [`TransportError::ConnectionClosed`].
#[derive(Debug, Clone)]
pub struct CancelHandle {
    stream: Arc<TcpStream>,
}

impl CancelHandle {
    fn new(stream: TcpStream) -> Self {
        Self {
            stream: Arc::new(stream),
        }
    }

    /// Shut down both directions of the stream.
    pub fn cancel(&self) {
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            // Already shut down by the peer or by an earlier cancel.
            debug!(error = %e, "socket shutdown reported an error");
        }
    }
}

/// Transport that reads and writes whole frames on a byte stream.
///
/// # Example
/// ```rust
/// use simbridge_ipc::{Channel, FrameTransport, TransportError};
/// use std::io::Cursor;
///
/// let mut transport = FrameTransport::new(Cursor::new(Vec::<u8>::new()), Vec::new());
///
/// // An exhausted reader means the peer hung up
/// assert_eq!(transport.recv(), Err(TransportError::ConnectionClosed));
/// ```
pub struct FrameTransport<R, W> {
    reader: R,
    writer: W,
    max_frame_size: usize,
    receive_timeout: Option<Duration>,
    cancel: Option<CancelHandle>,
    closed: bool,
}

/// Transport over an accepted TCP connection.
pub type SocketTransport = FrameTransport<TcpStream, TcpStream>;

impl<R: Read, W: Write> FrameTransport<R, W> {
    /// Create a new transport from reader and writer.
    ///
    /// # Postconditions
    /// - Frame ceiling is [`MAX_FRAME_SIZE`]
    /// - No receive timeout is recorded
    pub const fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            max_frame_size: MAX_FRAME_SIZE,
            receive_timeout: None,
            cancel: None,
            closed: false,
        }
    }

    /// Override the frame ceiling.
    #[must_use]
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Current frame ceiling in bytes.
    pub const fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Split the transport into its reader and writer.
    pub fn split(self) -> (R, W) {
        (self.reader, self.writer)
    }

    /// A handle that can close this transport from another thread, if the
    /// underlying stream supports it.
    pub fn cancel_handle(&self) -> Option<CancelHandle> {
        self.cancel.clone()
    }
}

impl SocketTransport {
    /// Wrap an accepted TCP stream.
    ///
    /// # Errors
    /// Returns [`TransportError::AcceptFailed`] if the stream handle cannot be
    /// duplicated for the reader, writer and cancel handle.
    pub fn from_stream(stream: TcpStream) -> TransportResult<Self> {
        let reader = stream
            .try_clone()
            .map_err(|e| TransportError::accept_failed(&e))?;
        let cancel = stream
            .try_clone()
            .map_err(|e| TransportError::accept_failed(&e))?;

        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "could not disable Nagle on simulator socket");
        }

        let mut transport = Self::new(reader, stream);
        transport.cancel = Some(CancelHandle::new(cancel));
        Ok(transport)
    }

    /// Set (or clear) the deadline for a single receive.
    ///
    /// # Errors
    /// Returns [`TransportError::ReadFailed`] if the OS rejects the timeout
    /// (for example a zero duration).
    pub fn set_receive_timeout(&mut self, timeout: Option<Duration>) -> TransportResult<()> {
        self.reader
            .set_read_timeout(timeout)
            .map_err(|e| TransportError::read_failed(&e))?;
        self.receive_timeout = timeout;
        Ok(())
    }
}

impl<R: Read, W: Write> Channel for FrameTransport<R, W> {
    fn send(&mut self, frame: &[u8]) -> TransportResult<()> {
        if self.closed {
            return Err(TransportError::ConnectionClosed);
        }

        self.writer
            .write_all(frame)
            .map_err(|e| TransportError::write_failed(&e))?;
        self.writer
            .flush()
            .map_err(|e| TransportError::write_failed(&e))?;

        debug!(bytes = frame.len(), "frame sent");
        Ok(())
    }

    fn recv(&mut self) -> TransportResult<Vec<u8>> {
        if self.closed {
            return Err(TransportError::ConnectionClosed);
        }

        // One byte of headroom lets an oversized frame be told apart from
        // one that exactly fills the ceiling.
        let ceiling = self.max_frame_size;
        let mut buffer = vec![0u8; ceiling.saturating_add(1)];

        let received = loop {
            match self.reader.read(&mut buffer) {
                Ok(n) => break n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Err(TransportError::timeout(
                        self.receive_timeout.unwrap_or_default(),
                    ));
                }
                Err(e) => return Err(TransportError::read_failed(&e)),
            }
        };

        if received == 0 {
            return Err(TransportError::ConnectionClosed);
        }

        if received > ceiling {
            return Err(TransportError::frame_too_large(received, ceiling));
        }

        buffer.truncate(received);
        debug!(bytes = received, "frame received");
        Ok(buffer)
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }

        if let Err(e) = self.writer.flush() {
            debug!(error = %e, "flush on close failed");
        }
        if let Some(cancel) = &self.cancel {
            cancel.cancel();
        }
        self.closed = true;
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]
    #![allow(clippy::indexing_slicing)]

    use super::*;
    use std::io::Cursor;

    /// Reader that hands out one scripted chunk per read call.
    struct ChunkedReader {
        chunks: Vec<std::io::Result<Vec<u8>>>,
    }

    impl Read for ChunkedReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.chunks.is_empty() {
                return Ok(0);
            }
            let chunk = self.chunks.remove(0)?;
            let n = chunk.len().min(buf.len());
            buf[..n].copy_from_slice(&chunk[..n]);
            Ok(n)
        }
    }

    #[test]
    fn test_recv_returns_single_read_as_frame() {
        let reader = ChunkedReader {
            chunks: vec![Ok(b"STEP".to_vec()), Ok(b"{\"state\":[]}".to_vec())],
        };
        let mut transport = FrameTransport::new(reader, std::io::sink());

        assert_eq!(transport.recv().unwrap(), b"STEP");
        assert_eq!(transport.recv().unwrap(), b"{\"state\":[]}");
        assert_eq!(transport.recv(), Err(TransportError::ConnectionClosed));
    }

    #[test]
    fn test_short_reads_surface_as_separate_frames() {
        // No length prefix on the wire: a payload split across two reads is
        // two frames, and neither piece trips the ceiling on its own.
        let reader = ChunkedReader {
            chunks: vec![Ok(vec![1u8; 48]), Ok(vec![2u8; 48])],
        };
        let mut transport = FrameTransport::new(reader, std::io::sink()).with_max_frame_size(64);

        assert_eq!(transport.recv().unwrap(), vec![1u8; 48]);
        assert_eq!(transport.recv().unwrap(), vec![2u8; 48]);
        assert_eq!(transport.recv(), Err(TransportError::ConnectionClosed));
    }

    #[test]
    fn test_recv_frame_at_ceiling_succeeds() {
        let frame = vec![7u8; 64];
        let mut transport =
            FrameTransport::new(Cursor::new(frame.clone()), std::io::sink()).with_max_frame_size(64);

        assert_eq!(transport.recv().unwrap(), frame);
    }

    #[test]
    fn test_recv_frame_over_ceiling_fails() {
        let mut transport = FrameTransport::new(Cursor::new(vec![7u8; 65]), std::io::sink())
            .with_max_frame_size(64);

        assert_eq!(
            transport.recv(),
            Err(TransportError::FrameTooLarge {
                received: 65,
                max_size: 64
            })
        );
    }

    #[test]
    fn test_recv_retries_interrupted_reads() {
        let reader = ChunkedReader {
            chunks: vec![
                Err(std::io::Error::new(ErrorKind::Interrupted, "signal")),
                Ok(b"RESET".to_vec()),
            ],
        };
        let mut transport = FrameTransport::new(reader, std::io::sink());

        assert_eq!(transport.recv().unwrap(), b"RESET");
    }

    #[test]
    fn test_recv_would_block_is_timeout() {
        let reader = ChunkedReader {
            chunks: vec![Err(std::io::Error::new(ErrorKind::WouldBlock, "slow"))],
        };
        let mut transport = FrameTransport::new(reader, std::io::sink());

        assert!(matches!(transport.recv(), Err(TransportError::Timeout { .. })));
    }

    #[test]
    fn test_send_writes_exact_bytes() {
        let mut transport = FrameTransport::new(std::io::empty(), Vec::new());

        transport.send(b"RECEIVED").unwrap();
        transport.send(b".").unwrap();

        assert_eq!(transport.writer, b"RECEIVED.");
    }

    #[test]
    fn test_closed_transport_rejects_io() {
        let mut transport = FrameTransport::new(Cursor::new(b"late".to_vec()), Vec::new());

        transport.close();
        transport.close();

        assert!(transport.is_closed());
        assert_eq!(transport.send(b"EXIT"), Err(TransportError::ConnectionClosed));
        assert_eq!(transport.recv(), Err(TransportError::ConnectionClosed));
        assert!(transport.writer.is_empty());
    }

    #[test]
    fn test_boxed_channel_delegates() {
        let mut channel: Box<dyn Channel> =
            Box::new(FrameTransport::new(Cursor::new(b"ok".to_vec()), Vec::new()));

        assert_eq!(channel.recv().unwrap(), b"ok");
        channel.close();
        assert!(channel.is_closed());
    }
}
