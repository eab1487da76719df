//! A launched simulator: process, socket and session under one owner.

use std::time::Duration;

use simbridge_ipc::{CancelHandle, Listener, SocketTransport};
use tracing::{info, warn};

use crate::action::{ActionInput, ValueInput};
use crate::assembly::StepResult;
use crate::config::EnvConfig;
use crate::descriptor::EnvironmentDescriptor;
use crate::error::{Error, Result};
use crate::launcher::{self, SimulatorProcess};
use crate::session::Session;
use crate::state::SessionState;

/// A running environment.
///
/// Dropping it without calling [`Environment::close`] still sends a
/// best-effort `EXIT`, closes the socket and reaps the simulator process.
#[derive(Debug)]
pub struct Environment {
    // Dropped before `process`.
    session: Session<SocketTransport>,
    descriptor: EnvironmentDescriptor,
    process: Option<SimulatorProcess>,
    cancel: CancelHandle,
    port: u16,
    shutdown_grace: Duration,
}

impl Environment {
    /// Launch the simulator described by `config` and complete the handshake.
    ///
    /// # Errors
    /// - [`Error::Config`] for an invalid config
    /// - [`Error::PortUnavailable`] if the port is taken
    /// - [`Error::LaunchFailure`] if the binary is missing, cannot be started,
    ///   or exits before connecting
    /// - [`Error::HandshakeTimeout`] if it does not connect and introduce
    ///   itself within `handshake_timeout`
    /// - [`Error::MalformedHandshake`] if its first message is invalid
    ///
    /// Nothing is left running on failure: the listener is dropped and the
    /// child killed and reaped.
    pub fn launch(config: &EnvConfig) -> Result<Self> {
        config.validate()?;
        let listener = Listener::bind(config.port()?)?;
        let port = listener.port();

        let binary = launcher::resolve_binary(config.directory(), &config.file_name)?;
        let args = launcher::launch_arguments(
            port,
            config.train_mode,
            config.headless,
            &config.extra_flags,
        );
        let mut process = SimulatorProcess::spawn(&binary, &args)?;

        let stream = listener
            .accept_within(config.handshake_timeout, || process.ensure_running())
            .map_err(|e: Error| match e {
                Error::ReceiveTimeout { .. } => Error::handshake_timeout(config.handshake_timeout),
                other => other,
            })?;
        drop(listener);

        let mut transport = SocketTransport::from_stream(stream)?;
        transport.set_receive_timeout(Some(config.handshake_timeout))?;
        let cancel = transport
            .cancel_handle()
            .ok_or_else(|| Error::launch_failure("socket transport has no cancel handle"))?;

        let mut session = Session::connect(transport, Box::new(config.pixel_decoder()))?;
        session
            .channel_mut()
            .set_receive_timeout(Some(config.receive_timeout))?;

        let descriptor = session
            .descriptor()
            .cloned()
            .ok_or(Error::NotLoaded)?;
        info!(env = descriptor.environment_name(), port, pid = process.id(), "environment ready");

        Ok(Self {
            session,
            descriptor,
            process: Some(process),
            cancel,
            port,
            shutdown_grace: config.shutdown_grace,
        })
    }

    /// Start a new episode. See [`Session::reset`].
    ///
    /// # Errors
    /// See [`Session::reset`].
    pub fn reset(&mut self) -> Result<StepResult> {
        self.session.reset()
    }

    /// Advance one tick. See [`Session::step`].
    ///
    /// # Errors
    /// See [`Session::step`].
    pub fn step(
        &mut self,
        action: impl Into<ActionInput>,
        value: impl Into<ValueInput>,
    ) -> Result<StepResult> {
        self.session.step(action, value)
    }

    /// Send `EXIT`, close the socket and wait for the simulator to exit.
    ///
    /// # Errors
    /// [`Error::NotLoaded`] if already closed.
    pub fn close(&mut self) -> Result<()> {
        self.session.close()?;
        if let Some(process) = self.process.take() {
            process.shutdown(self.shutdown_grace);
        }
        Ok(())
    }

    /// Whether the last tick ended the episode.
    pub const fn done(&self) -> bool {
        self.session.done()
    }

    pub const fn state(&self) -> SessionState {
        self.session.state()
    }

    pub const fn descriptor(&self) -> &EnvironmentDescriptor {
        &self.descriptor
    }

    /// Port the simulator connected to.
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// A handle that aborts a blocked `reset` or `step` from another thread.
    /// The aborted call fails with [`Error::ConnectionClosed`].
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }
}

impl Drop for Environment {
    fn drop(&mut self) {
        if self.session.state() != SessionState::Closed {
            if let Err(e) = self.close() {
                warn!(error = %e, "close on drop failed");
            }
        }
    }
}
