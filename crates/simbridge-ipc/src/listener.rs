//! Listening endpoint the simulator connects back to.

use crate::{LOOPBACK_HOST, TransportError, TransportResult};
use std::io::ErrorKind;
use std::net::{TcpListener, TcpStream};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// How often a pending accept re-checks its deadline and liveness check.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A bound loopback listener that accepts exactly one simulator connection.
///
/// Dropping the listener releases the port.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    port: u16,
}

impl Listener {
    /// Bind the loopback listener on `port`. Port 0 picks a free port.
    ///
    /// # Errors
    /// Returns [`TransportError::PortUnavailable`] if the port cannot be bound.
    /// No socket is left open on failure.
    pub fn bind(port: u16) -> TransportResult<Self> {
        let inner = TcpListener::bind((LOOPBACK_HOST, port))
            .map_err(|e| TransportError::port_unavailable(port, &e))?;
        let port = inner
            .local_addr()
            .map_err(|e| TransportError::port_unavailable(port, &e))?
            .port();

        info!(port, "listening for simulator connection");
        Ok(Self { inner, port })
    }

    /// Port actually bound (differs from the requested one when 0 was asked for).
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Wait for the simulator to connect, giving up after `timeout`.
    ///
    /// `still_waiting` is polled between attempts; returning an error from it
    /// aborts the wait (used to notice a simulator that exited before
    /// connecting).
    ///
    /// # Errors
    /// Returns [`TransportError::Timeout`] once `timeout` elapses,
    /// [`TransportError::AcceptFailed`] on a socket failure, or whatever
    /// `still_waiting` returns.
    pub fn accept_within<E, F>(&self, timeout: Duration, mut still_waiting: F) -> Result<TcpStream, E>
    where
        E: From<TransportError>,
        F: FnMut() -> Result<(), E>,
    {
        self.inner
            .set_nonblocking(true)
            .map_err(|e| TransportError::accept_failed(&e))?;

        let started = Instant::now();
        loop {
            match self.inner.accept() {
                Ok((stream, peer)) => {
                    stream
                        .set_nonblocking(false)
                        .map_err(|e| TransportError::accept_failed(&e))?;
                    info!(%peer, port = self.port, "simulator connected");
                    return Ok(stream);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(TransportError::accept_failed(&e).into()),
            }

            still_waiting()?;

            let waited = started.elapsed();
            if waited >= timeout {
                debug!(waited_ms = waited.as_millis(), "accept deadline passed");
                return Err(TransportError::timeout(waited).into());
            }
            std::thread::sleep(ACCEPT_POLL_INTERVAL.min(timeout.saturating_sub(waited)));
        }
    }
}
