//! Error types for the simbridge-env crate.

use std::time::Duration;

use simbridge_ipc::TransportError;
use thiserror::Error;

use crate::descriptor::ActionSpaceType;

/// Result type for environment operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while launching or driving a simulator.
#[derive(Error, Debug)]
pub enum Error {
    /// The listening port is held by someone else.
    #[error(
        "communication port {port} is still in use; a previously opened environment may need to be closed"
    )]
    PortUnavailable { port: u16 },

    /// The simulator could not be started or did not come up.
    #[error("failed to launch environment: {reason}")]
    LaunchFailure { reason: String },

    /// The simulator did not connect and introduce itself in time.
    #[error("simulator did not complete the handshake within {timeout_ms}ms")]
    HandshakeTimeout { timeout_ms: u64 },

    /// The handshake message was not a valid environment description.
    #[error("malformed handshake: {reason}")]
    MalformedHandshake { reason: String },

    /// A received frame exceeded the frame ceiling.
    #[error("frame too large: more than {max_size} bytes received")]
    FrameTooLarge { received: usize, max_size: usize },

    /// A control message could not be decoded.
    #[error("malformed message: {reason}")]
    MalformedMessage { reason: String },

    /// The action does not have the length the environment declared.
    #[error(
        "mismatch between the provided action and the environment's expectation: expected {expected} {space} action value(s), got {actual}"
    )]
    ActionShapeMismatch {
        expected: usize,
        actual: usize,
        space: ActionSpaceType,
    },

    /// An action or value element is NaN or infinite.
    #[error("{field}[{index}] is not a finite number")]
    NonFiniteValue { field: &'static str, index: usize },

    /// No environment is loaded (never connected, failed, or closed).
    #[error("no environment is loaded")]
    NotLoaded,

    /// The episode finished; `reset` must be called before stepping again.
    #[error("the episode is completed; reset the environment before stepping")]
    EpisodeComplete,

    /// The simulator did not answer in time.
    #[error("no response from simulator within {timeout_ms}ms")]
    ReceiveTimeout { timeout_ms: u64 },

    /// The connection was closed by the simulator or cancelled locally.
    #[error("connection to simulator closed")]
    ConnectionClosed,

    /// Any other transport failure.
    #[error("transport error: {0}")]
    Transport(TransportError),

    /// An observation frame could not be turned into pixels.
    #[error("failed to decode observation {index}: {reason}")]
    ObservationDecode { index: usize, reason: String },

    /// Configuration error.
    #[error("configuration error: {reason}")]
    Config { reason: String },
}

impl Error {
    /// Create a launch failure error.
    pub fn launch_failure(reason: impl Into<String>) -> Self {
        Self::LaunchFailure {
            reason: reason.into(),
        }
    }

    /// Create a handshake timeout error.
    pub fn handshake_timeout(waited: Duration) -> Self {
        Self::HandshakeTimeout {
            timeout_ms: millis(waited),
        }
    }

    /// Create a malformed handshake error.
    pub fn malformed_handshake(reason: impl Into<String>) -> Self {
        Self::MalformedHandshake {
            reason: reason.into(),
        }
    }

    /// Create a malformed message error.
    pub fn malformed_message(reason: impl Into<String>) -> Self {
        Self::MalformedMessage {
            reason: reason.into(),
        }
    }

    /// Create an action shape mismatch error.
    pub const fn action_shape_mismatch(
        expected: usize,
        actual: usize,
        space: ActionSpaceType,
    ) -> Self {
        Self::ActionShapeMismatch {
            expected,
            actual,
            space,
        }
    }

    /// Create a non-finite value error.
    pub const fn non_finite_value(field: &'static str, index: usize) -> Self {
        Self::NonFiniteValue { field, index }
    }

    /// Create an observation decode error.
    pub fn observation_decode(index: usize, reason: impl Into<String>) -> Self {
        Self::ObservationDecode {
            index,
            reason: reason.into(),
        }
    }

    /// Create a config error.
    pub fn config_error(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Whether the call was rejected before any bytes were exchanged.
    ///
    /// Validation failures leave the session exactly as it was.
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::ActionShapeMismatch { .. }
                | Self::NonFiniteValue { .. }
                | Self::NotLoaded
                | Self::EpisodeComplete
        )
    }

    /// Whether the failure happened while bringing the environment up.
    pub const fn is_launch_failure(&self) -> bool {
        matches!(
            self,
            Self::PortUnavailable { .. }
                | Self::LaunchFailure { .. }
                | Self::HandshakeTimeout { .. }
                | Self::MalformedHandshake { .. }
        )
    }

    /// Reinterpret an error raised during the handshake exchange.
    pub(crate) fn during_handshake(self) -> Self {
        match self {
            Self::ReceiveTimeout { timeout_ms } => Self::HandshakeTimeout { timeout_ms },
            Self::MalformedMessage { reason } => Self::MalformedHandshake { reason },
            Self::ConnectionClosed => {
                Self::launch_failure("simulator closed the connection during the handshake")
            }
            Self::Transport(e) => Self::launch_failure(e.to_string()),
            other => other,
        }
    }
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::PortUnavailable { port, .. } => Self::PortUnavailable { port },
            TransportError::Timeout { waited } => Self::ReceiveTimeout {
                timeout_ms: millis(waited),
            },
            TransportError::ConnectionClosed => Self::ConnectionClosed,
            TransportError::FrameTooLarge { received, max_size } => {
                Self::FrameTooLarge { received, max_size }
            }
            other => Self::Transport(other),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
