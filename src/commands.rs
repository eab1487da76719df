//! CLI command handlers.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use simbridge_env::{ActionInput, ActionSpaceType, EnvironmentDescriptor, Environment};
use tracing::info;

use crate::cli::{Commands, LaunchArgs};

/// Execute a CLI command.
pub fn execute_command(command: Commands) -> Result<()> {
    match command {
        Commands::Inspect { launch } => cmd_inspect(&launch),
        Commands::Rollout {
            launch,
            episodes,
            max_steps,
            seed,
        } => cmd_rollout(&launch, episodes, max_steps, seed),
    }
}

fn launch(args: &LaunchArgs) -> Result<Environment> {
    let config = args.to_config()?;
    Environment::launch(&config)
        .with_context(|| format!("launching '{}'", config.file_name))
}

fn cmd_inspect(args: &LaunchArgs) -> Result<()> {
    let mut env = launch(args)?;
    println!("{}", env.descriptor());
    env.close().context("closing environment")
}

fn cmd_rollout(args: &LaunchArgs, episodes: u32, max_steps: u32, seed: Option<u64>) -> Result<()> {
    let mut rng = seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
    let mut env = launch(args)?;

    for episode in 0..episodes {
        let mut result = env.reset().context("reset")?;
        let mut total_reward = result.reward;
        let mut steps = 0;

        while !result.done && steps < max_steps {
            let action = random_action(env.descriptor(), &mut rng);
            result = env
                .step(action, Vec::<f64>::new())
                .with_context(|| format!("step {steps} of episode {episode}"))?;
            total_reward += result.reward;
            steps += 1;
        }

        info!(episode, steps, total_reward, done = result.done, "episode finished");
        println!("episode {episode}: {steps} steps, return {total_reward:.3}");
    }

    env.close().context("closing environment")
}

/// Uniform random action of the right shape: one branch index per agent for
/// discrete spaces, values in `[-1, 1)` for continuous ones.
fn random_action<R: Rng>(descriptor: &EnvironmentDescriptor, rng: &mut R) -> ActionInput {
    let len = descriptor.expected_action_len();
    match descriptor.action_space_type() {
        ActionSpaceType::Discrete => {
            let branches = i64::try_from(descriptor.action_space_size())
                .unwrap_or(i64::MAX)
                .max(1);
            ActionInput::from(
                (0..len)
                    .map(|_| rng.gen_range(0..branches))
                    .collect::<Vec<i64>>(),
            )
        }
        ActionSpaceType::Continuous => ActionInput::from(
            (0..len)
                .map(|_| rng.gen_range(-1.0..1.0))
                .collect::<Vec<f64>>(),
        ),
    }
}
