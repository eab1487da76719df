//! Transport layer errors
//!
//! Every error carries enough context to tell a wedged simulator apart from
//! a vanished one. None of them are retried by the transport itself.

use std::io::ErrorKind as IoErrorKind;
use std::time::Duration;

/// Transport layer errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The listening port could not be bound.
    ///
    /// Caused by:
    /// - Another environment (or a stale one) still holding the port
    /// - Insufficient permissions for the port
    PortUnavailable {
        /// Port that was requested
        port: u16,
        /// Error kind reported by the OS
        kind: IoErrorKind,
    },

    /// Accepting the inbound connection failed for a reason other than time.
    AcceptFailed {
        /// OS error code
        error_code: Option<i32>,
        /// Error kind
        kind: IoErrorKind,
    },

    /// No connection or no frame arrived within the configured deadline.
    Timeout {
        /// How long the transport waited
        waited: Duration,
    },

    /// The peer closed the stream, or the stream was shut down locally.
    ///
    /// Caused by:
    /// - Simulator process terminated
    /// - [`CancelHandle::cancel`](crate::CancelHandle::cancel) called from another thread
    /// - Transport already closed
    ConnectionClosed,

    /// A received frame exceeded the frame ceiling.
    FrameTooLarge {
        /// Bytes observed before giving up
        received: usize,
        /// Maximum allowed size
        max_size: usize,
    },

    /// Write operation failed.
    ///
    /// Caused by:
    /// - Broken pipe
    /// - Connection reset by the simulator
    WriteFailed {
        /// OS error code
        error_code: Option<i32>,
        /// Error kind
        kind: IoErrorKind,
    },

    /// Read operation failed.
    ReadFailed {
        /// OS error code
        error_code: Option<i32>,
        /// Error kind
        kind: IoErrorKind,
    },
}

impl TransportError {
    /// Create a PortUnavailable error from the bind failure
    pub fn port_unavailable(port: u16, err: &std::io::Error) -> Self {
        Self::PortUnavailable {
            port,
            kind: err.kind(),
        }
    }

    /// Create an AcceptFailed error from std::io::Error
    pub fn accept_failed(err: &std::io::Error) -> Self {
        Self::AcceptFailed {
            error_code: err.raw_os_error(),
            kind: err.kind(),
        }
    }

    /// Create a Timeout error
    pub const fn timeout(waited: Duration) -> Self {
        Self::Timeout { waited }
    }

    /// Create a FrameTooLarge error
    pub const fn frame_too_large(received: usize, max_size: usize) -> Self {
        Self::FrameTooLarge { received, max_size }
    }

    /// Create a WriteFailed error from std::io::Error
    pub fn write_failed(err: &std::io::Error) -> Self {
        match err.kind() {
            IoErrorKind::BrokenPipe
            | IoErrorKind::ConnectionReset
            | IoErrorKind::ConnectionAborted
            | IoErrorKind::NotConnected => Self::ConnectionClosed,
            kind => Self::WriteFailed {
                error_code: err.raw_os_error(),
                kind,
            },
        }
    }

    /// Create a ReadFailed error from std::io::Error
    pub fn read_failed(err: &std::io::Error) -> Self {
        match err.kind() {
            IoErrorKind::ConnectionReset
            | IoErrorKind::ConnectionAborted
            | IoErrorKind::NotConnected
            | IoErrorKind::UnexpectedEof => Self::ConnectionClosed,
            kind => Self::ReadFailed {
                error_code: err.raw_os_error(),
                kind,
            },
        }
    }

    /// Whether the failure means the peer is gone for good.
    pub const fn is_disconnect(&self) -> bool {
        matches!(self, Self::ConnectionClosed)
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PortUnavailable { port, kind } => {
                write!(
                    f,
                    "Port {} unavailable ({:?}); a previously opened environment may still hold it",
                    port, kind
                )
            }
            Self::AcceptFailed { error_code, kind } => {
                write!(
                    f,
                    "Accept failed: {:?} (error code: {:?})",
                    kind, error_code
                )
            }
            Self::Timeout { waited } => {
                write!(f, "Timed out after {} ms", waited.as_millis())
            }
            Self::ConnectionClosed => write!(f, "Connection closed"),
            Self::FrameTooLarge { received, max_size } => {
                write!(
                    f,
                    "Frame too large: more than {} bytes received (max {} bytes)",
                    received, max_size
                )
            }
            Self::WriteFailed { error_code, kind } => {
                write!(
                    f,
                    "Write failed: {:?} (error code: {:?})",
                    kind, error_code
                )
            }
            Self::ReadFailed { error_code, kind } => {
                write!(
                    f,
                    "Read failed: {:?} (error code: {:?})",
                    kind, error_code
                )
            }
        }
    }
}

impl std::error::Error for TransportError {}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;
