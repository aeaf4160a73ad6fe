//! Concrete learned policies for gridlife agents.
//!
//! Each policy implements [`gridlife_core::Policy`] and is attached to agents
//! through factories installed into a [`PolicyRegistry`].

use gridlife_core::{Policy, PolicyRegistry};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

pub mod actor_critic;
pub mod qlearning;

pub use actor_critic::{ActorCriticConfig, ActorCriticPolicy};
pub use qlearning::{QLearningConfig, QLearningPolicy, StateEncoding};

/// Policy families available to the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// Softmax actor-critic with a food-seeking heuristic bias.
    #[default]
    ActorCritic,
    /// Tabular Q-learning over the basic state encoding.
    #[serde(rename = "qlearning")]
    QLearning,
    /// Tabular Q-learning over the physiological encoding with adaptive exploration.
    #[serde(rename = "qlearning.extended")]
    QLearningExtended,
}

impl PolicyKind {
    pub const ALL: [Self; 3] = [Self::ActorCritic, Self::QLearning, Self::QLearningExtended];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ActorCritic => ActorCriticPolicy::KIND,
            Self::QLearning => QLearningPolicy::KIND_BASIC,
            Self::QLearningExtended => QLearningPolicy::KIND_EXTENDED,
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown policy name.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown policy kind `{0}` (expected actor_critic, qlearning or qlearning.extended)")]
pub struct UnknownPolicyKind(pub String);

impl FromStr for PolicyKind {
    type Err = UnknownPolicyKind;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "actor_critic" | "ac" => Ok(Self::ActorCritic),
            "qlearning" | "q_learning" | "q" => Ok(Self::QLearning),
            "qlearning.extended" | "qlearning_extended" | "q_learning_extended" => {
                Ok(Self::QLearningExtended)
            }
            _ => Err(UnknownPolicyKind(value.to_string())),
        }
    }
}

/// Register a factory for `kind` and return its registry key.
pub fn install(registry: &mut PolicyRegistry, kind: PolicyKind) -> u64 {
    let key = match kind {
        PolicyKind::ActorCritic => {
            let config = ActorCriticConfig::default();
            registry.register(kind.as_str(), move |rng: &mut dyn RngCore| {
                Box::new(ActorCriticPolicy::random(config, rng)) as Box<dyn Policy>
            })
        }
        PolicyKind::QLearning => {
            let config = QLearningConfig::basic();
            registry.register(kind.as_str(), move |_rng: &mut dyn RngCore| {
                Box::new(QLearningPolicy::new(config)) as Box<dyn Policy>
            })
        }
        PolicyKind::QLearningExtended => {
            let config = QLearningConfig::extended();
            registry.register(kind.as_str(), move |_rng: &mut dyn RngCore| {
                Box::new(QLearningPolicy::new(config)) as Box<dyn Policy>
            })
        }
    };
    debug!(%kind, key, "installed policy factory");
    key
}
