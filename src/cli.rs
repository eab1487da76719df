//! CLI command definitions using clap.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use simbridge_env::EnvConfig;

/// simbridge - drive a socket-connected simulator from the command line
#[derive(Parser, Debug)]
#[command(name = "simbridge")]
#[command(version)]
#[command(about = "Launch a simulator binary, inspect it, or run random rollouts against it")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Launch the environment, print its description and close it
    Inspect {
        #[command(flatten)]
        launch: LaunchArgs,
    },

    /// Run episodes with uniformly random actions
    Rollout {
        #[command(flatten)]
        launch: LaunchArgs,

        /// Number of episodes
        #[arg(short, long, default_value_t = 1)]
        episodes: u32,

        /// Step limit per episode
        #[arg(long, default_value_t = 1000)]
        max_steps: u32,

        /// Seed for the action sampler
        #[arg(long)]
        seed: Option<u64>,
    },
}

/// Options shared by every command that launches a simulator.
#[derive(Args, Debug, Clone)]
pub struct LaunchArgs {
    /// Simulator binary name, without the platform suffix
    pub file_name: Option<String>,

    /// Directory holding the binary
    #[arg(short, long)]
    pub dir: Option<PathBuf>,

    /// Added to the base port
    #[arg(short, long)]
    pub worker_id: Option<u16>,

    /// Listening port base
    #[arg(long)]
    pub base_port: Option<u16>,

    /// Run without a window
    #[arg(long, default_value_t = false)]
    pub headless: bool,

    /// Run the simulator in inference mode instead of training mode
    #[arg(long, default_value_t = false)]
    pub inference: bool,

    /// Extra simulator flag as KEY=VALUE (repeatable)
    #[arg(long = "flag", value_parser = parse_flag, allow_hyphen_values = true)]
    pub flags: Vec<(String, String)>,

    /// Configuration file (TOML, or JSON with a .json extension)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

impl LaunchArgs {
    /// Build the environment config.
    ///
    /// Precedence, lowest first: config file, `SIMBRIDGE_*` variables,
    /// command-line options.
    ///
    /// # Errors
    /// Fails if the file cannot be loaded, a variable is invalid, or no
    /// binary name is given anywhere.
    pub fn to_config(&self) -> Result<EnvConfig> {
        self.to_config_with(|key| std::env::var(key).ok())
    }

    /// Like [`LaunchArgs::to_config`], reading variables through `lookup`.
    ///
    /// # Errors
    /// Same as [`LaunchArgs::to_config`].
    pub fn to_config_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Result<EnvConfig> {
        let base = match (&self.config, &self.file_name) {
            (Some(path), _) => EnvConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            (None, Some(name)) => EnvConfig::new(name.clone()),
            (None, None) => EnvConfig::new(String::new()),
        };
        let mut config = base
            .overlay(lookup)
            .context("reading SIMBRIDGE_* environment variables")?;

        if let Some(name) = &self.file_name {
            config.file_name.clone_from(name);
        }
        if config.file_name.trim().is_empty() {
            bail!("no simulator binary given: pass FILE_NAME or set it in --config");
        }
        if let Some(dir) = &self.dir {
            config = config.working_dir(dir);
        }
        if let Some(worker_id) = self.worker_id {
            config = config.worker_id(worker_id);
        }
        if let Some(port) = self.base_port {
            config = config.base_port(port);
        }
        if self.headless {
            config = config.headless(true);
        }
        if self.inference {
            config = config.train_mode(false);
        }
        for (key, value) in &self.flags {
            config = config.flag(key, value);
        }

        Ok(config)
    }
}

fn parse_flag(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))
}
