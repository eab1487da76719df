//! Session lifecycle states and the guards that enforce call ordering.
//!
//! ```text
//!                 handshake ok              reset
//! Uninitialized ─────────────▶ Ready ───────────────▶ AwaitingStep ◀─┐
//!       │                        │                      │    │  step │
//!       │ handshake fails        │                      │    └───────┘
//!       ▼                        │              done    ▼
//!     Failed ◀── any I/O error ──┴──────────────────── Done ── reset ─▶ AwaitingStep
//!       │
//!       └──────── close ───────▶ Closed ◀── close ── Ready / AwaitingStep / Done
//! ```
//!
//! Guards run before any I/O, so a rejected call never touches the channel.

use std::fmt;

use crate::error::{Error, Result};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Channel open, handshake not yet performed.
    Uninitialized,
    /// Handshake done, no episode started.
    Ready,
    /// An episode is running and accepts `step`.
    AwaitingStep,
    /// The last tick reported the end of the episode.
    Done,
    /// An exchange broke mid-way; the channel is out of sync.
    Failed,
    /// `close` has run. Terminal.
    Closed,
}

/// What `close` has to do from the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CloseMode {
    /// Tell the simulator to exit, then release the channel.
    Graceful,
    /// The channel cannot be trusted; release it without talking.
    Teardown,
}

impl SessionState {
    /// Whether an environment is loaded and usable.
    pub const fn is_loaded(self) -> bool {
        matches!(self, Self::Ready | Self::AwaitingStep | Self::Done)
    }

    /// Read-only projection of the episode's `done` flag.
    pub const fn is_done(self) -> bool {
        matches!(self, Self::Done)
    }

    /// State after a tick whose `done` flag was `done`.
    pub(crate) const fn after_tick(done: bool) -> Self {
        if done { Self::Done } else { Self::AwaitingStep }
    }

    pub(crate) fn check_handshake(self) -> Result<()> {
        match self {
            Self::Uninitialized => Ok(()),
            _ => Err(Error::NotLoaded),
        }
    }

    pub(crate) fn check_reset(self) -> Result<()> {
        if self.is_loaded() {
            Ok(())
        } else {
            Err(Error::NotLoaded)
        }
    }

    pub(crate) fn check_step(self) -> Result<()> {
        match self {
            Self::AwaitingStep => Ok(()),
            Self::Done => Err(Error::EpisodeComplete),
            Self::Uninitialized | Self::Ready | Self::Failed | Self::Closed => {
                Err(Error::NotLoaded)
            }
        }
    }

    pub(crate) fn check_close(self) -> Result<CloseMode> {
        match self {
            Self::Ready | Self::AwaitingStep | Self::Done => Ok(CloseMode::Graceful),
            Self::Failed => Ok(CloseMode::Teardown),
            Self::Uninitialized | Self::Closed => Err(Error::NotLoaded),
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Ready => "ready",
            Self::AwaitingStep => "awaiting-step",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}
