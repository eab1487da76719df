//! Launching the simulator binary.
//!
//! The simulator connects back to the port it is given on the command line.
//! [`SimulatorProcess`] owns the child for the lifetime of the environment
//! and kills and reaps it when dropped, so a failed launch never leaves a
//! stray process behind.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::{Error, Result};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Path of the simulator binary for the given target OS.
///
/// `os` uses the values of [`std::env::consts::OS`].
///
/// # Errors
/// Returns [`Error::LaunchFailure`] for an OS with no known binary layout.
pub fn resolve_binary_for(os: &str, directory: &Path, file_name: &str) -> Result<PathBuf> {
    match os {
        "linux" => Ok(directory.join(format!("{file_name}.x86_64"))),
        "macos" => Ok(directory
            .join(format!("{file_name}.app"))
            .join("Contents")
            .join("MacOS")
            .join(file_name)),
        "windows" => Ok(directory.join(format!("{file_name}.exe"))),
        other => Err(Error::launch_failure(format!(
            "no known simulator binary layout for platform '{other}'"
        ))),
    }
}

/// Path of the simulator binary for the running platform.
///
/// # Errors
/// See [`resolve_binary_for`].
pub fn resolve_binary(directory: &Path, file_name: &str) -> Result<PathBuf> {
    resolve_binary_for(std::env::consts::OS, directory, file_name)
}

/// Command-line arguments for the simulator.
///
/// `--port <port> --train <True|False>`, then `-batchmode` when headless,
/// then each extra flag as a `key value` pair in key order.
pub fn launch_arguments(
    port: u16,
    train_mode: bool,
    headless: bool,
    extra_flags: &BTreeMap<String, String>,
) -> Vec<String> {
    let mut args = vec![
        "--port".to_string(),
        port.to_string(),
        "--train".to_string(),
        wire_bool(train_mode).to_string(),
    ];
    if headless {
        args.push("-batchmode".to_string());
    }
    for (key, value) in extra_flags {
        args.push(key.clone());
        args.push(value.clone());
    }
    args
}

const fn wire_bool(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}

/// A running simulator process.
#[derive(Debug)]
pub struct SimulatorProcess {
    child: Child,
    binary: PathBuf,
}

impl SimulatorProcess {
    /// Start the simulator.
    ///
    /// # Errors
    /// Returns [`Error::LaunchFailure`] if the binary does not exist or cannot
    /// be executed.
    pub fn spawn(binary: &Path, args: &[String]) -> Result<Self> {
        if !binary.is_file() {
            return Err(Error::launch_failure(format!(
                "simulator binary not found at {}",
                binary.display()
            )));
        }

        let mut command = Command::new(binary);
        command.args(args).stdin(Stdio::null());
        if let Some(dir) = binary.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            command.current_dir(dir);
        }

        let child = command.spawn().map_err(|e| {
            Error::launch_failure(format!("failed to start {}: {e}", binary.display()))
        })?;

        info!(pid = child.id(), binary = %binary.display(), ?args, "simulator started");
        Ok(Self {
            child,
            binary: binary.to_path_buf(),
        })
    }

    /// OS process id.
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Fail if the simulator has already exited.
    ///
    /// # Errors
    /// Returns [`Error::LaunchFailure`] naming the exit status, or if the
    /// status cannot be queried.
    pub fn ensure_running(&mut self) -> Result<()> {
        match self.child.try_wait() {
            Ok(None) => Ok(()),
            Ok(Some(status)) => Err(Error::launch_failure(format!(
                "simulator exited before connecting ({status})"
            ))),
            Err(e) => Err(Error::launch_failure(format!(
                "failed to check simulator status: {e}"
            ))),
        }
    }

    /// Wait up to `grace` for the simulator to exit on its own, then kill it.
    pub fn shutdown(mut self, grace: Duration) {
        self.reap(grace);
    }

    fn reap(&mut self, grace: Duration) {
        let started = Instant::now();
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    debug!(pid = self.child.id(), %status, "simulator exited");
                    return;
                }
                Ok(None) if started.elapsed() < grace => {
                    std::thread::sleep(EXIT_POLL_INTERVAL);
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(pid = self.child.id(), error = %e, "failed to poll simulator");
                    break;
                }
            }
        }

        warn!(pid = self.child.id(), "simulator still running; killing it");
        if let Err(e) = self.child.kill() {
            warn!(pid = self.child.id(), error = %e, "kill failed");
        }
        if let Err(e) = self.child.wait() {
            warn!(pid = self.child.id(), error = %e, "wait after kill failed");
        }
    }
}

impl Drop for SimulatorProcess {
    fn drop(&mut self) {
        if matches!(self.child.try_wait(), Ok(None)) {
            self.reap(Duration::ZERO);
        }
    }
}
