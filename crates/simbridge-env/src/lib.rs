//! Simbridge Env - client driver for socket-connected simulators.
//!
//! A simulator runs as a separate process. The client binds a port, launches
//! the simulator with that port on its command line, and waits for it to
//! connect back. From then on the two sides talk in strict turns:
//!
//! ```text
//! client                                   simulator
//!   |  <──────────── handshake JSON ─────────  |
//!   |  ──────────── "." ───────────────────>   |
//!   |  ──────────── RESET | STEP | EXIT ───>   |
//!   |  <──────────── go-ahead (STEP only) ───  |
//!   |  ──────────── action JSON (STEP) ────>   |
//!   |  <──────────── image 0 ────────────────  |
//!   |  ──────────── RECEIVED ──────────────>   |
//!   |        ... one image per observation     |
//!   |  <──────────── state JSON ─────────────  |
//! ```
//!
//! [`Session`] enforces the call order over any [`simbridge_ipc::Channel`];
//! [`Environment`] adds the process launch and socket on top.
//!
//! # Example
//!
//! ```rust,no_run
//! use simbridge_env::{EnvConfig, Environment};
//!
//! # fn main() -> simbridge_env::Result<()> {
//! let config = EnvConfig::new("Walker").working_dir("builds").headless(true);
//! let mut env = Environment::launch(&config)?;
//! println!("{}", env.descriptor());
//!
//! let mut result = env.reset()?;
//! while !result.done {
//!     result = env.step([0_i64], 0.0_f64)?;
//! }
//! env.close()?;
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

mod action;
mod assembly;
pub mod codec;
mod config;
mod descriptor;
mod environment;
mod error;
pub mod launcher;
pub mod pixels;
mod session;
mod state;

pub use action::{ActionInput, ActionValue, ValueInput};
pub use assembly::StepResult;
pub use config::{ENV_PREFIX, EnvConfig};
pub use descriptor::{ActionSpaceType, EnvironmentDescriptor, StateSpaceType};
pub use environment::Environment;
pub use error::{Error, Result};
pub use pixels::{FrameDecoder, ImageArray, PixelDecoder};
pub use session::Session;
pub use state::SessionState;
