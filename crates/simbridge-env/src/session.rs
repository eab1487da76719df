//! The session: handshake, reset, step and close over one channel.
//!
//! A [`Session`] owns its channel exclusively. Every public operation is a
//! blocking round trip and takes `&mut self`, so two calls can never overlap
//! on one connection. Callers that share a session between threads wrap it in
//! a mutex.

use std::fmt;

use simbridge_ipc::Channel;
use tracing::{debug, info, warn};

use crate::action::{ActionInput, ValueInput};
use crate::assembly::{self, RawTick, StepResult};
use crate::codec::{self, ActionMessage, EXIT, HANDSHAKE_ACK, RESET, STEP};
use crate::descriptor::EnvironmentDescriptor;
use crate::error::{Error, Result};
use crate::pixels::{FrameDecoder, PixelDecoder};
use crate::state::{CloseMode, SessionState};

/// Client side of the simulator protocol.
pub struct Session<C: Channel> {
    channel: C,
    descriptor: Option<EnvironmentDescriptor>,
    state: SessionState,
    decoder: Box<dyn FrameDecoder>,
}

impl<C: Channel> Session<C> {
    /// Wrap a freshly connected channel. No bytes are exchanged yet.
    pub fn new(channel: C) -> Self {
        Self::with_decoder(channel, Box::new(PixelDecoder::default()))
    }

    /// Like [`Session::new`], with a custom observation decoder.
    pub fn with_decoder(channel: C, decoder: Box<dyn FrameDecoder>) -> Self {
        Self {
            channel,
            descriptor: None,
            state: SessionState::Uninitialized,
            decoder,
        }
    }

    /// Wrap a channel and perform the handshake.
    ///
    /// # Errors
    /// Any handshake failure; the channel is closed before returning.
    pub fn connect(channel: C, decoder: Box<dyn FrameDecoder>) -> Result<Self> {
        let mut session = Self::with_decoder(channel, decoder);
        session.handshake()?;
        Ok(session)
    }

    /// Read the simulator's handshake and acknowledge it.
    ///
    /// # Errors
    /// - [`Error::NotLoaded`] if the handshake already ran
    /// - [`Error::HandshakeTimeout`] if nothing arrived in time
    /// - [`Error::MalformedHandshake`] if the message is not a valid descriptor
    /// - [`Error::LaunchFailure`] if the connection broke
    ///
    /// On failure the session becomes [`SessionState::Failed`] and the
    /// channel is closed.
    pub fn handshake(&mut self) -> Result<&EnvironmentDescriptor> {
        self.state.check_handshake()?;

        match read_handshake(&mut self.channel) {
            Ok(descriptor) => {
                info!(
                    env = descriptor.environment_name(),
                    agents = descriptor.agent_count(),
                    observations = descriptor.observation_count(),
                    action_space = %descriptor.action_space_type(),
                    "handshake complete"
                );
                self.state = SessionState::Ready;
                Ok(self.descriptor.insert(descriptor))
            }
            Err(e) => {
                let e = e.during_handshake();
                warn!(error = %e, "handshake failed");
                self.state = SessionState::Failed;
                self.channel.close();
                Err(e)
            }
        }
    }

    /// Start a new episode.
    ///
    /// # Errors
    /// [`Error::NotLoaded`] unless an environment is loaded; any transport or
    /// protocol error (the session then becomes [`SessionState::Failed`]);
    /// [`Error::ObservationDecode`] if an image could not be decoded.
    pub fn reset(&mut self) -> Result<StepResult> {
        self.state.check_reset()?;
        let observation_count = self.loaded()?.observation_count();

        let raw = self.exchange("reset", |channel| {
            channel.send(RESET)?;
            assembly::receive_tick(channel, observation_count)
        })?;
        self.finish_tick(raw)
    }

    /// Advance the simulation by one tick.
    ///
    /// The action length is checked against the descriptor before anything is
    /// sent: `agent_count` elements for a discrete space,
    /// `action_space_size * agent_count` for a continuous one.
    ///
    /// # Errors
    /// - [`Error::EpisodeComplete`] if the last tick ended the episode
    /// - [`Error::NotLoaded`] if no episode is running
    /// - [`Error::ActionShapeMismatch`] on a wrong action length
    /// - [`Error::NonFiniteValue`] on a NaN or infinite action or value element
    /// - any transport or protocol error, after which the session is failed
    pub fn step(
        &mut self,
        action: impl Into<ActionInput>,
        value: impl Into<ValueInput>,
    ) -> Result<StepResult> {
        self.state.check_step()?;
        let descriptor = self.loaded()?;

        let action = action.into();
        descriptor.validate_action_len(action.len())?;
        let observation_count = descriptor.observation_count();

        let payload = codec::encode_action(&ActionMessage {
            action: action.into_values(),
            value: value.into().into_values(),
        })?;

        let raw = self.exchange("step", |channel| {
            channel.send(STEP)?;
            // The simulator answers STEP with a go-ahead before reading the action.
            channel.recv()?;
            channel.send(&payload)?;
            assembly::receive_tick(channel, observation_count)
        })?;
        self.finish_tick(raw)
    }

    /// Tell the simulator to exit and release the channel.
    ///
    /// From [`SessionState::Failed`] nothing is sent; the channel is only
    /// torn down. A failure to deliver `EXIT` is logged, not returned: the
    /// session is closed either way.
    ///
    /// # Errors
    /// [`Error::NotLoaded`] if the session was never loaded or is already
    /// closed.
    pub fn close(&mut self) -> Result<()> {
        match self.state.check_close()? {
            CloseMode::Graceful => {
                if let Err(e) = self.channel.send(EXIT) {
                    warn!(error = %e, "could not deliver EXIT to simulator");
                }
                info!("environment closed");
            }
            CloseMode::Teardown => warn!("tearing down failed session"),
        }

        if !self.channel.is_closed() {
            self.channel.close();
        }
        self.state = SessionState::Closed;
        Ok(())
    }

    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the most recent tick ended the episode.
    pub const fn done(&self) -> bool {
        self.state.is_done()
    }

    /// The environment description, once the handshake has run.
    pub const fn descriptor(&self) -> Option<&EnvironmentDescriptor> {
        self.descriptor.as_ref()
    }

    pub const fn channel(&self) -> &C {
        &self.channel
    }

    pub(crate) const fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    fn loaded(&self) -> Result<&EnvironmentDescriptor> {
        self.descriptor.as_ref().ok_or(Error::NotLoaded)
    }

    /// Run one request/response exchange. Any failure leaves the channel out
    /// of step with the simulator, so the session is marked failed.
    fn exchange<T>(
        &mut self,
        operation: &'static str,
        run: impl FnOnce(&mut C) -> Result<T>,
    ) -> Result<T> {
        run(&mut self.channel).inspect_err(|e| {
            warn!(operation, error = %e, "exchange failed; session is no longer usable");
            self.state = SessionState::Failed;
        })
    }

    fn finish_tick(&mut self, raw: RawTick) -> Result<StepResult> {
        self.state = SessionState::after_tick(raw.state.done);
        debug!(state = %self.state, "tick complete");
        raw.decode(self.decoder.as_ref())
    }
}

fn read_handshake<C: Channel + ?Sized>(channel: &mut C) -> Result<EnvironmentDescriptor> {
    let descriptor = codec::decode_handshake(&channel.recv()?)?;
    channel.send(HANDSHAKE_ACK)?;
    Ok(descriptor)
}

impl<C: Channel> fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field(
                "environment",
                &self.descriptor.as_ref().map(EnvironmentDescriptor::environment_name),
            )
            .finish_non_exhaustive()
    }
}

impl<C: Channel> Drop for Session<C> {
    fn drop(&mut self) {
        if self.state.check_close().is_ok() {
            debug!(state = %self.state, "session dropped without close");
            if let Err(e) = self.close() {
                warn!(error = %e, "close on drop failed");
            }
        } else if !self.channel.is_closed() {
            self.channel.close();
        }
    }
}
