//! Environment metadata learned once, at handshake.
//!
//! An [`EnvironmentDescriptor`] is the single authoritative snapshot of the
//! environment's shape. It has no mutation paths: the session builds it from
//! the handshake and hands out shared references afterwards.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How actions are interpreted by the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionSpaceType {
    /// One integer choice per agent.
    Discrete,
    /// `action_space_size` real values per agent.
    Continuous,
}

impl fmt::Display for ActionSpaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discrete => write!(f, "discrete"),
            Self::Continuous => write!(f, "continuous"),
        }
    }
}

impl FromStr for ActionSpaceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "discrete" => Ok(Self::Discrete),
            "continuous" => Ok(Self::Continuous),
            other => Err(Error::malformed_handshake(format!(
                "unknown action_space_type '{other}' (expected \"discrete\" or \"continuous\")"
            ))),
        }
    }
}

/// How the environment describes its state vector.
///
/// Simulators report free-form names here, so unknown names are kept
/// verbatim rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StateSpaceType {
    Discrete,
    Continuous,
    Other(String),
}

impl StateSpaceType {
    /// Wire name of the state space type.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Discrete => "discrete",
            Self::Continuous => "continuous",
            Self::Other(name) => name,
        }
    }
}

impl From<&str> for StateSpaceType {
    fn from(name: &str) -> Self {
        match name {
            "discrete" => Self::Discrete,
            "continuous" => Self::Continuous,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for StateSpaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable description of a connected environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentDescriptor {
    state_space_size: usize,
    observation_count: usize,
    action_space_size: usize,
    action_descriptions: Vec<String>,
    environment_name: String,
    action_space_type: ActionSpaceType,
    state_space_type: StateSpaceType,
    agent_count: usize,
}

/// Field bundle used by the codec to assemble a descriptor.
pub(crate) struct DescriptorParts {
    pub state_space_size: usize,
    pub observation_count: usize,
    pub action_space_size: usize,
    pub action_descriptions: Vec<String>,
    pub environment_name: String,
    pub action_space_type: ActionSpaceType,
    pub state_space_type: StateSpaceType,
    pub agent_count: usize,
}

impl EnvironmentDescriptor {
    pub(crate) fn from_parts(parts: DescriptorParts) -> Self {
        Self {
            state_space_size: parts.state_space_size,
            observation_count: parts.observation_count,
            action_space_size: parts.action_space_size,
            action_descriptions: parts.action_descriptions,
            environment_name: parts.environment_name,
            action_space_type: parts.action_space_type,
            state_space_type: parts.state_space_type,
            agent_count: parts.agent_count,
        }
    }

    /// Size of the state vector per agent.
    pub const fn state_space_size(&self) -> usize {
        self.state_space_size
    }

    /// Number of image observations delivered every tick.
    pub const fn observation_count(&self) -> usize {
        self.observation_count
    }

    /// Size of the action space per agent.
    pub const fn action_space_size(&self) -> usize {
        self.action_space_size
    }

    /// Human-readable names of the actions, in wire order.
    pub fn action_descriptions(&self) -> &[String] {
        &self.action_descriptions
    }

    pub fn environment_name(&self) -> &str {
        &self.environment_name
    }

    pub const fn action_space_type(&self) -> ActionSpaceType {
        self.action_space_type
    }

    pub const fn state_space_type(&self) -> &StateSpaceType {
        &self.state_space_type
    }

    pub const fn agent_count(&self) -> usize {
        self.agent_count
    }

    /// Number of action values a `step` must carry.
    ///
    /// One per agent for discrete spaces, `action_space_size` per agent for
    /// continuous ones.
    pub const fn expected_action_len(&self) -> usize {
        match self.action_space_type {
            ActionSpaceType::Discrete => self.agent_count,
            ActionSpaceType::Continuous => self.action_space_size.saturating_mul(self.agent_count),
        }
    }

    /// Check an action length against the declared shape.
    ///
    /// # Errors
    /// Returns [`Error::ActionShapeMismatch`] when the lengths differ.
    pub fn validate_action_len(&self, actual: usize) -> Result<()> {
        let expected = self.expected_action_len();
        if actual == expected {
            Ok(())
        } else {
            Err(Error::action_shape_mismatch(
                expected,
                actual,
                self.action_space_type,
            ))
        }
    }
}

impl fmt::Display for EnvironmentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Environment name: {}", self.environment_name)?;
        writeln!(f, "  Number of agents: {}", self.agent_count)?;
        writeln!(
            f,
            "  Number of observations (per agent): {}",
            self.observation_count
        )?;
        writeln!(f, "  State space type: {}", self.state_space_type)?;
        writeln!(
            f,
            "  State space size (per agent): {}",
            self.state_space_size
        )?;
        writeln!(f, "  Action space type: {}", self.action_space_type)?;
        writeln!(
            f,
            "  Action space size (per agent): {}",
            self.action_space_size
        )?;
        write!(
            f,
            "  Action descriptions: {}",
            self.action_descriptions.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn descriptor(space: ActionSpaceType, action_size: usize, agents: usize) -> EnvironmentDescriptor {
        EnvironmentDescriptor::from_parts(DescriptorParts {
            state_space_size: 4,
            observation_count: 1,
            action_space_size: action_size,
            action_descriptions: vec!["left".into(), "right".into()],
            environment_name: "Test".into(),
            action_space_type: space,
            state_space_type: StateSpaceType::from("vector"),
            agent_count: agents,
        })
    }

    #[test]
    fn test_discrete_expects_one_value_per_agent() {
        let d = descriptor(ActionSpaceType::Discrete, 2, 3);
        assert_eq!(d.expected_action_len(), 3);
        assert!(d.validate_action_len(3).is_ok());
        assert!(matches!(
            d.validate_action_len(2),
            Err(Error::ActionShapeMismatch {
                expected: 3,
                actual: 2,
                space: ActionSpaceType::Discrete
            })
        ));
    }

    #[test]
    fn test_continuous_expects_size_times_agents() {
        let d = descriptor(ActionSpaceType::Continuous, 2, 3);
        assert_eq!(d.expected_action_len(), 6);
        assert!(d.validate_action_len(6).is_ok());
        assert!(d.validate_action_len(3).is_err());
    }

    #[test]
    fn test_action_space_type_parsing_is_exact() {
        assert_eq!(
            "discrete".parse::<ActionSpaceType>().unwrap(),
            ActionSpaceType::Discrete
        );
        assert!("Discrete".parse::<ActionSpaceType>().is_err());
        assert!("".parse::<ActionSpaceType>().is_err());
    }

    #[test]
    fn test_state_space_type_keeps_unknown_names() {
        assert_eq!(StateSpaceType::from("continuous"), StateSpaceType::Continuous);
        assert_eq!(StateSpaceType::from("vector").as_str(), "vector");
    }

    #[test]
    fn test_summary_lists_shape() {
        let summary = descriptor(ActionSpaceType::Discrete, 2, 1).to_string();
        assert!(summary.starts_with("Environment name: Test"));
        assert!(summary.contains("Action space type: discrete"));
        assert!(summary.contains("Action descriptions: left, right"));
    }
}
