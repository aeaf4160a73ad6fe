//! Linear softmax actor-critic with a food-seeking heuristic bias.

use gridlife_core::{Action, FEATURE_COUNT, Percept, Policy, gaussian};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::any::Any;

/// Hyper-parameters of the actor-critic policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActorCriticConfig {
    /// Policy-gradient step size. Zero freezes the actor weights.
    pub learning_rate: f64,
    /// Step size of the critic. Independent of `learning_rate`.
    pub critic_learning_rate: f64,
    pub gamma: f64,
    /// Weight of the entropy-bonus gradient.
    pub entropy_beta: f64,
    /// Symmetric bound applied to the TD error.
    pub td_clip: f64,
    /// Decay of the running reward mean/variance estimate.
    pub reward_alpha: f64,
    pub reward_eps: f64,
    /// Logit bonus per unit of food distance an action would close.
    pub heuristic_scale: f64,
    /// Standard deviation of the initial weights.
    pub init_sigma: f64,
    /// Noise added when blending parents into a child.
    pub blend_noise: f64,
}

impl Default for ActorCriticConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.03,
            critic_learning_rate: 0.06,
            gamma: 0.98,
            entropy_beta: 0.01,
            td_clip: 6.0,
            reward_alpha: 0.01,
            reward_eps: 1e-8,
            heuristic_scale: 3.0,
            init_sigma: 0.1,
            blend_noise: 0.02,
        }
    }
}

type Weights = [[f64; FEATURE_COUNT]; Action::COUNT];

/// Actor-critic learner: `W[action][feature]` policy weights and a linear critic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorCriticPolicy {
    config: ActorCriticConfig,
    weights: Weights,
    critic: [f64; FEATURE_COUNT],
    reward_mean: f64,
    reward_var: f64,
}

impl ActorCriticPolicy {
    pub const KIND: &'static str = "actor_critic";

    /// Policy with zero weights; behaviour is driven purely by the heuristic bias.
    #[must_use]
    pub fn new(config: ActorCriticConfig) -> Self {
        Self {
            config,
            weights: [[0.0; FEATURE_COUNT]; Action::COUNT],
            critic: [0.0; FEATURE_COUNT],
            reward_mean: 0.0,
            reward_var: 0.0,
        }
    }

    /// Policy with Gaussian-initialised weights.
    pub fn random(config: ActorCriticConfig, rng: &mut dyn RngCore) -> Self {
        let mut policy = Self::new(config);
        for row in &mut policy.weights {
            for weight in row.iter_mut() {
                *weight = gaussian(rng) * config.init_sigma;
            }
        }
        policy
    }

    #[must_use]
    pub const fn config(&self) -> &ActorCriticConfig {
        &self.config
    }

    #[must_use]
    pub const fn weights(&self) -> &Weights {
        &self.weights
    }

    #[must_use]
    pub const fn critic(&self) -> &[f64; FEATURE_COUNT] {
        &self.critic
    }

    /// Softmax action distribution for a percept.
    #[must_use]
    pub fn probabilities(&self, percept: &Percept) -> [f64; Action::COUNT] {
        let mut logits = [0.0; Action::COUNT];
        for (idx, logit) in logits.iter_mut().enumerate() {
            let linear: f64 = self.weights[idx]
                .iter()
                .zip(&percept.features)
                .map(|(w, f)| w * f)
                .sum();
            let heuristic =
                (percept.food_distance - percept.food_distance_after[idx]) * self.config.heuristic_scale;
            *logit = linear + heuristic;
        }
        let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mut probs = logits.map(|logit| (logit - max).exp());
        let sum: f64 = probs.iter().sum();
        if sum.is_finite() && sum > 0.0 {
            for p in &mut probs {
                *p /= sum;
            }
        } else {
            probs = [1.0 / Action::COUNT as f64; Action::COUNT];
        }
        probs
    }

    fn value(&self, features: &[f64; FEATURE_COUNT]) -> f64 {
        self.critic.iter().zip(features).map(|(c, f)| c * f).sum()
    }

    /// Fold `reward` into the running statistics and return its z-score.
    fn normalize_reward(&mut self, reward: f64) -> f64 {
        let alpha = if self.config.reward_alpha > 0.0 {
            self.config.reward_alpha
        } else {
            0.01
        };
        self.reward_mean = (1.0 - alpha) * self.reward_mean + alpha * reward;
        let diff = reward - self.reward_mean;
        self.reward_var = (1.0 - alpha) * self.reward_var + alpha * diff * diff;
        diff / (self.reward_var.sqrt() + self.config.reward_eps)
    }

    fn blend(&mut self, other: &Self, own_weight: f64, other_weight: f64) {
        for (row, other_row) in self.weights.iter_mut().zip(&other.weights) {
            for (w, o) in row.iter_mut().zip(other_row) {
                *w = *w * own_weight + o * other_weight;
            }
        }
        for (c, o) in self.critic.iter_mut().zip(&other.critic) {
            *c = *c * own_weight + o * other_weight;
        }
    }
}

impl Policy for ActorCriticPolicy {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn choose_action(&mut self, percept: &Percept, rng: &mut dyn RngCore) -> Action {
        let probs = self.probabilities(percept);
        let draw = rng.random::<f64>();
        let mut cumulative = 0.0;
        for (idx, p) in probs.iter().enumerate() {
            cumulative += p;
            if draw <= cumulative {
                return Action::new(idx).unwrap_or(Action::STAY);
            }
        }
        // Rounding left the cumulative sum just short of the draw.
        Action::new(Action::COUNT - 1).unwrap_or(Action::STAY)
    }

    fn update(
        &mut self,
        percept: &Percept,
        action: Action,
        reward: f64,
        next: &Percept,
        _rng: &mut dyn RngCore,
    ) {
        let probs = self.probabilities(percept);
        let normalized = self.normalize_reward(reward);
        let features = &percept.features;
        let clip = self.config.td_clip;
        let delta = (normalized + self.config.gamma * self.value(&next.features)
            - self.value(features))
        .clamp(-clip, clip);

        let lr = self.config.learning_rate;
        let critic_lr = self.config.critic_learning_rate;
        for (c, f) in self.critic.iter_mut().zip(features) {
            *c += critic_lr * delta * f;
        }

        let beta = self.config.entropy_beta;
        for (idx, row) in self.weights.iter_mut().enumerate() {
            let p = probs[idx];
            let indicator = if idx == action.index() { 1.0 } else { 0.0 };
            let entropy = if p > 0.0 { -(p.ln() + 1.0) * p } else { 0.0 };
            let step = delta * (indicator - p) + beta * entropy;
            for (w, f) in row.iter_mut().zip(features) {
                *w += lr * step * f;
            }
        }
    }

    fn offspring(&self, partner: &dyn Policy, rng: &mut dyn RngCore) -> Option<Box<dyn Policy>> {
        let partner = partner.as_any().downcast_ref::<Self>()?;
        let mut child = Self::new(self.config);
        child.config.learning_rate = (self.config.learning_rate + partner.config.learning_rate) / 2.0;
        let noise = self.config.blend_noise;
        for (idx, row) in child.weights.iter_mut().enumerate() {
            for (jdx, w) in row.iter_mut().enumerate() {
                let mean = (self.weights[idx][jdx] + partner.weights[idx][jdx]) / 2.0;
                *w = mean + gaussian(rng) * noise;
            }
        }
        for (idx, c) in child.critic.iter_mut().enumerate() {
            *c = (self.critic[idx] + partner.critic[idx]) / 2.0;
        }
        Some(Box::new(child))
    }

    fn absorb(&mut self, other: &dyn Policy, own_weight: f64, other_weight: f64) -> bool {
        match other.as_any().downcast_ref::<Self>() {
            Some(other) => {
                self.blend(other, own_weight, other_weight);
                true
            }
            None => false,
        }
    }

    fn clone_box(&self) -> Box<dyn Policy> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }

    fn as_any_mut(&mut self) -> &mut (dyn Any + Send + Sync) {
        self
    }
}
