//! Observation assembly for one tick.
//!
//! A tick is `observation_count` image payloads, each acknowledged before the
//! simulator sends the next, followed by one state message. The whole tick is
//! received before anything is decoded, so the channel stays in step even if
//! a payload later turns out not to be a readable image.

use simbridge_ipc::Channel;
use tracing::debug;

use crate::codec::{self, FRAME_ACK, TickState};
use crate::error::{Error, Result};
use crate::pixels::{FrameDecoder, ImageArray};

/// Result of a `reset` or `step`.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    /// One array per declared observation, in wire order.
    pub observations: Vec<ImageArray>,
    pub state: Vec<f64>,
    pub reward: f64,
    pub done: bool,
}

/// A fully received but not yet decoded tick.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RawTick {
    pub frames: Vec<Vec<u8>>,
    pub state: TickState,
}

impl RawTick {
    /// Decode every frame. Fails on the first unreadable one.
    pub(crate) fn decode(self, decoder: &dyn FrameDecoder) -> Result<StepResult> {
        let observations = self
            .frames
            .iter()
            .enumerate()
            .map(|(index, frame)| {
                decoder
                    .decode(frame)
                    .map_err(|e| Error::observation_decode(index, e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(StepResult {
            observations,
            state: self.state.state,
            reward: self.state.reward,
            done: self.state.done,
        })
    }
}

/// Receive one tick from the channel.
///
/// # Errors
/// Any receive or send failure aborts the tick; partial results are dropped.
pub(crate) fn receive_tick<C: Channel + ?Sized>(
    channel: &mut C,
    observation_count: usize,
) -> Result<RawTick> {
    let mut frames = Vec::with_capacity(observation_count);
    for index in 0..observation_count {
        let frame = channel.recv()?;
        channel.send(FRAME_ACK)?;
        debug!(index, bytes = frame.len(), "observation received");
        frames.push(frame);
    }

    let state = codec::decode_state(&channel.recv()?)?;
    debug!(reward = state.reward, done = state.done, "tick state received");

    Ok(RawTick { frames, state })
}
