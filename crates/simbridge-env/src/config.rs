//! Configuration for launching and driving an environment.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::pixels::PixelDecoder;

/// Prefix of the environment variables read by [`EnvConfig::from_env`].
pub const ENV_PREFIX: &str = "SIMBRIDGE_";

/// Everything needed to launch a simulator and talk to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvConfig {
    /// Simulator binary name, without the platform suffix.
    pub file_name: String,

    /// Directory the binary lives in. Defaults to the current directory.
    #[serde(default)]
    pub working_directory: Option<PathBuf>,

    /// Base of the listening port.
    #[serde(default = "default_base_port")]
    pub base_port: u16,

    /// Added to `base_port`, so several workers can run side by side.
    #[serde(default)]
    pub worker_id: u16,

    /// Run the simulator in training mode.
    #[serde(default = "default_true")]
    pub train_mode: bool,

    /// Run the simulator without a window.
    #[serde(default)]
    pub headless: bool,

    /// Extra `key value` pairs appended to the simulator's command line.
    #[serde(default)]
    pub extra_flags: BTreeMap<String, String>,

    /// Deadline for the simulator to connect and send its handshake.
    #[serde(with = "duration_secs", default = "default_handshake_timeout")]
    pub handshake_timeout: Duration,

    /// Deadline for any single receive after the handshake.
    #[serde(with = "duration_secs", default = "default_receive_timeout")]
    pub receive_timeout: Duration,

    /// How long to wait for the simulator to exit after `EXIT`.
    #[serde(with = "duration_millis", default = "default_shutdown_grace")]
    pub shutdown_grace: Duration,

    /// Edge length of decoded observations.
    #[serde(default = "default_resolution")]
    pub resolution: u32,

    /// Collapse observations to a single channel.
    #[serde(default)]
    pub grayscale: bool,
}

impl EnvConfig {
    /// Config for the given binary with every other field at its default.
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            working_directory: None,
            base_port: default_base_port(),
            worker_id: 0,
            train_mode: true,
            headless: false,
            extra_flags: BTreeMap::new(),
            handshake_timeout: default_handshake_timeout(),
            receive_timeout: default_receive_timeout(),
            shutdown_grace: default_shutdown_grace(),
            resolution: default_resolution(),
            grayscale: false,
        }
    }

    /// Set the directory holding the binary.
    #[must_use]
    pub fn working_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(path.into());
        self
    }

    #[must_use]
    pub const fn base_port(mut self, port: u16) -> Self {
        self.base_port = port;
        self
    }

    #[must_use]
    pub const fn worker_id(mut self, worker_id: u16) -> Self {
        self.worker_id = worker_id;
        self
    }

    #[must_use]
    pub const fn train_mode(mut self, train_mode: bool) -> Self {
        self.train_mode = train_mode;
        self
    }

    #[must_use]
    pub const fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Add one extra command-line flag.
    #[must_use]
    pub fn flag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_flags.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub const fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    #[must_use]
    pub const fn resolution(mut self, resolution: u32) -> Self {
        self.resolution = resolution;
        self
    }

    #[must_use]
    pub const fn grayscale(mut self, grayscale: bool) -> Self {
        self.grayscale = grayscale;
        self
    }

    /// The port the simulator is told to connect to.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if `base_port + worker_id` overflows.
    pub fn port(&self) -> Result<u16> {
        self.base_port.checked_add(self.worker_id).ok_or_else(|| {
            Error::config_error(format!(
                "base_port {} + worker_id {} exceeds the port range",
                self.base_port, self.worker_id
            ))
        })
    }

    /// Directory the binary is resolved against.
    pub fn directory(&self) -> &Path {
        self.working_directory
            .as_deref()
            .unwrap_or_else(|| Path::new("."))
    }

    /// Observation decoder matching this config.
    pub const fn pixel_decoder(&self) -> PixelDecoder {
        PixelDecoder::new(self.resolution, self.grayscale)
    }

    /// Check that the config can be used to launch an environment.
    ///
    /// # Errors
    /// Returns [`Error::Config`] naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.file_name.trim().is_empty() {
            return Err(Error::config_error("file_name must not be empty"));
        }
        if self.handshake_timeout.is_zero() {
            return Err(Error::config_error("handshake_timeout must be positive"));
        }
        if self.receive_timeout.is_zero() {
            return Err(Error::config_error("receive_timeout must be positive"));
        }
        if self.resolution == 0 || self.resolution > PixelDecoder::MAX_RESOLUTION {
            return Err(Error::config_error(format!(
                "resolution must be between 1 and {}",
                PixelDecoder::MAX_RESOLUTION
            )));
        }
        self.port().map(|_| ())
    }

    /// Load configuration from a file: JSON for `.json`, TOML otherwise.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config_error(format!("failed to read {}: {e}", path.display()))
        })?;

        if path.extension().is_some_and(|e| e == "json") {
            serde_json::from_str(&content)
                .map_err(|e| Error::config_error(format!("failed to parse config: {e}")))
        } else {
            toml::from_str(&content)
                .map_err(|e| Error::config_error(format!("failed to parse config: {e}")))
        }
    }

    /// Load configuration from the process environment.
    ///
    /// `SIMBRIDGE_FILE_NAME` is required; see [`EnvConfig::overlay`] for the
    /// other variables.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if a variable is missing or unparsable.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`EnvConfig::from_env`], reading variables through `lookup`.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if a variable is missing or unparsable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let file_name = lookup(&var("FILE_NAME"))
            .ok_or_else(|| Error::config_error(format!("{} is not set", var("FILE_NAME"))))?;
        Self::new(file_name).overlay(lookup)
    }

    /// Override fields from `SIMBRIDGE_*` variables found through `lookup`.
    ///
    /// Recognised suffixes: `FILE_NAME`, `WORKING_DIRECTORY`, `BASE_PORT`,
    /// `WORKER_ID`, `TRAIN_MODE`, `HEADLESS`, `HANDSHAKE_TIMEOUT` (seconds),
    /// `RECEIVE_TIMEOUT` (seconds), `SHUTDOWN_GRACE_MS`, `RESOLUTION`,
    /// `GRAYSCALE`.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if a variable cannot be parsed.
    pub fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |suffix: &str| lookup(&var(suffix));

        if let Some(name) = get("FILE_NAME") {
            self.file_name = name;
        }
        if let Some(dir) = get("WORKING_DIRECTORY") {
            self.working_directory = Some(PathBuf::from(dir));
        }
        if let Some(port) = get("BASE_PORT") {
            self.base_port = parse_var("BASE_PORT", &port)?;
        }
        if let Some(id) = get("WORKER_ID") {
            self.worker_id = parse_var("WORKER_ID", &id)?;
        }
        if let Some(flag) = get("TRAIN_MODE") {
            self.train_mode = parse_switch("TRAIN_MODE", &flag)?;
        }
        if let Some(flag) = get("HEADLESS") {
            self.headless = parse_switch("HEADLESS", &flag)?;
        }
        if let Some(secs) = get("HANDSHAKE_TIMEOUT") {
            self.handshake_timeout = Duration::from_secs(parse_var("HANDSHAKE_TIMEOUT", &secs)?);
        }
        if let Some(secs) = get("RECEIVE_TIMEOUT") {
            self.receive_timeout = Duration::from_secs(parse_var("RECEIVE_TIMEOUT", &secs)?);
        }
        if let Some(ms) = get("SHUTDOWN_GRACE_MS") {
            self.shutdown_grace = Duration::from_millis(parse_var("SHUTDOWN_GRACE_MS", &ms)?);
        }
        if let Some(resolution) = get("RESOLUTION") {
            self.resolution = parse_var("RESOLUTION", &resolution)?;
        }
        if let Some(flag) = get("GRAYSCALE") {
            self.grayscale = parse_switch("GRAYSCALE", &flag)?;
        }

        Ok(self)
    }
}

fn var(suffix: &str) -> String {
    format!("{ENV_PREFIX}{suffix}")
}

fn parse_var<T>(suffix: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| Error::config_error(format!("{}='{raw}': {e}", var(suffix))))
}

fn parse_switch(suffix: &str, raw: &str) -> Result<bool> {
    match raw.trim() {
        "1" | "true" | "True" | "yes" => Ok(true),
        "0" | "false" | "False" | "no" => Ok(false),
        _ => Err(Error::config_error(format!(
            "{}='{raw}': expected true or false",
            var(suffix)
        ))),
    }
}

const fn default_base_port() -> u16 {
    5005
}

const fn default_true() -> bool {
    true
}

const fn default_handshake_timeout() -> Duration {
    Duration::from_secs(60)
}

const fn default_receive_timeout() -> Duration {
    Duration::from_secs(30)
}

const fn default_shutdown_grace() -> Duration {
    Duration::from_millis(2000)
}

const fn default_resolution() -> u32 {
    PixelDecoder::DEFAULT_RESOLUTION
}

/// Serialization helper for Duration as seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Serialization helper for Duration as milliseconds.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
