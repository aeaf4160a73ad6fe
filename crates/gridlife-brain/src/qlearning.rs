//! Tabular Q-learning over discretized state keys.

use gridlife_core::{Action, Percept, Policy, StateKey, gaussian};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;

/// Which discretization of the percept keys the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateEncoding {
    /// Sign-based food direction, Manhattan buckets, crowding counts.
    Basic,
    /// Angle-based direction, Euclidean buckets and vital-stat levels.
    Extended,
}

impl StateEncoding {
    fn key(self, percept: &Percept) -> StateKey {
        match self {
            Self::Basic => percept.basic_key,
            Self::Extended => percept.extended_key,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QLearningConfig {
    pub encoding: StateEncoding,
    /// Initial exploration rate.
    pub epsilon: f64,
    pub epsilon_floor: f64,
    /// Multiplicative decay applied after every update (basic schedule).
    pub epsilon_decay: f64,
    /// Initial learning rate. Zero freezes the table.
    pub alpha: f64,
    pub gamma: f64,
    /// Unseen rows start uniformly in `[-init_spread, init_spread)`.
    pub init_spread: f64,
    /// Noise added when blending parents into a child.
    pub blend_noise: f64,
    /// Adapt exploration and learning rate to age, energy, experience and reward.
    pub adaptive: bool,
}

impl QLearningConfig {
    #[must_use]
    pub const fn basic() -> Self {
        Self {
            encoding: StateEncoding::Basic,
            epsilon: 0.3,
            epsilon_floor: 0.01,
            epsilon_decay: 0.9995,
            alpha: 0.1,
            gamma: 0.95,
            init_spread: 0.05,
            blend_noise: 0.02,
            adaptive: false,
        }
    }

    #[must_use]
    pub const fn extended() -> Self {
        Self {
            encoding: StateEncoding::Extended,
            epsilon: 0.1,
            alpha: 0.1,
            gamma: 0.9,
            adaptive: true,
            ..Self::basic()
        }
    }
}

impl Default for QLearningConfig {
    fn default() -> Self {
        Self::basic()
    }
}

type Row = [f64; Action::COUNT];

/// Epsilon-greedy tabular learner. Rows are keyed by [`StateKey`] and created lazily.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QLearningPolicy {
    config: QLearningConfig,
    epsilon: f64,
    alpha: f64,
    gamma: f64,
    table: BTreeMap<StateKey, Row>,
}

impl QLearningPolicy {
    pub const KIND_BASIC: &'static str = "qlearning";
    pub const KIND_EXTENDED: &'static str = "qlearning.extended";

    #[must_use]
    pub fn new(config: QLearningConfig) -> Self {
        Self {
            config,
            epsilon: config.epsilon,
            alpha: config.alpha,
            gamma: config.gamma,
            table: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn epsilon(&self) -> f64 {
        self.epsilon
    }

    #[must_use]
    pub const fn alpha(&self) -> f64 {
        self.alpha
    }

    #[must_use]
    pub fn value(&self, key: &StateKey, action: Action) -> Option<f64> {
        self.table.get(key).map(|row| row[action.index()])
    }

    #[must_use]
    pub fn state_count(&self) -> usize {
        self.table.len()
    }

    /// Insert a row, replacing any existing values.
    pub fn set_row(&mut self, key: StateKey, row: Row) {
        self.table.insert(key, row);
    }

    fn row_mut(&mut self, key: StateKey, rng: &mut dyn RngCore) -> &mut Row {
        let spread = self.config.init_spread;
        self.table.entry(key).or_insert_with(|| {
            if spread > 0.0 {
                std::array::from_fn(|_| rng.random_range(-spread..spread))
            } else {
                [0.0; Action::COUNT]
            }
        })
    }

    /// Highest-valued action; ties resolve to the lowest index.
    fn greedy(row: &Row) -> Action {
        let mut best = 0;
        for (idx, value) in row.iter().enumerate().skip(1) {
            if *value > row[best] {
                best = idx;
            }
        }
        Action::new(best).unwrap_or(Action::STAY)
    }

    fn adapt_to(&mut self, percept: &Percept) {
        if percept.age < 50 {
            self.epsilon = 0.3;
        } else if percept.age > 200 {
            self.epsilon = 0.05;
        }
        if percept.energy < 30.0 {
            self.epsilon = 0.1;
        }
        if percept.experience > 10 {
            self.alpha = 0.15;
        }
    }

    fn adapt_after(&mut self, reward: f64) {
        let decay = if reward > 0.5 { 0.995 } else { 0.999 };
        self.epsilon = (self.epsilon * decay).max(self.config.epsilon_floor);
        self.alpha = if reward > 0.3 { 0.15 } else { 0.05 };
    }

    fn kind_for(encoding: StateEncoding) -> &'static str {
        match encoding {
            StateEncoding::Basic => Self::KIND_BASIC,
            StateEncoding::Extended => Self::KIND_EXTENDED,
        }
    }
}

impl Policy for QLearningPolicy {
    fn kind(&self) -> &'static str {
        Self::kind_for(self.config.encoding)
    }

    fn choose_action(&mut self, percept: &Percept, rng: &mut dyn RngCore) -> Action {
        if self.config.adaptive {
            self.adapt_to(percept);
        }
        let key = self.config.encoding.key(percept);
        let explore = rng.random::<f64>() < self.epsilon;
        let row = *self.row_mut(key, rng);
        if explore {
            return Action::new(rng.random_range(0..Action::COUNT)).unwrap_or(Action::STAY);
        }
        Self::greedy(&row)
    }

    fn update(
        &mut self,
        percept: &Percept,
        action: Action,
        reward: f64,
        next: &Percept,
        rng: &mut dyn RngCore,
    ) {
        let encoding = self.config.encoding;
        let next_best = self
            .row_mut(encoding.key(next), rng)
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        let (alpha, gamma) = (self.alpha, self.gamma);
        let slot = &mut self.row_mut(encoding.key(percept), rng)[action.index()];
        *slot += alpha * (reward + gamma * next_best - *slot);

        if self.config.adaptive {
            self.adapt_after(reward);
        } else {
            self.epsilon = (self.epsilon * self.config.epsilon_decay).max(self.config.epsilon_floor);
        }
    }

    fn offspring(&self, partner: &dyn Policy, rng: &mut dyn RngCore) -> Option<Box<dyn Policy>> {
        let partner = partner.as_any().downcast_ref::<Self>()?;
        if partner.config.encoding != self.config.encoding {
            return None;
        }
        let noise = self.config.blend_noise;
        let mut child = Self::new(self.config);
        child.epsilon = (self.epsilon + partner.epsilon) / 2.0;
        child.alpha = (self.alpha + partner.alpha) / 2.0;
        child.gamma = (self.gamma + partner.gamma) / 2.0;
        for (key, row) in &self.table {
            let blended: Row = match partner.table.get(key) {
                Some(other) => std::array::from_fn(|idx| (row[idx] + other[idx]) / 2.0),
                None => *row,
            };
            child
                .table
                .insert(*key, blended.map(|value| value + gaussian(rng) * noise));
        }
        for (key, row) in &partner.table {
            if !child.table.contains_key(key) {
                child
                    .table
                    .insert(*key, row.map(|value| value + gaussian(rng) * noise));
            }
        }
        Some(Box::new(child))
    }

    fn absorb(&mut self, other: &dyn Policy, own_weight: f64, other_weight: f64) -> bool {
        let Some(other) = other.as_any().downcast_ref::<Self>() else {
            return false;
        };
        if other.config.encoding != self.config.encoding {
            return false;
        }
        for (key, theirs) in &other.table {
            match self.table.get_mut(key) {
                Some(own) => {
                    for (value, other_value) in own.iter_mut().zip(theirs) {
                        *value = *value * own_weight + other_value * other_weight;
                    }
                }
                None => {
                    self.table.insert(*key, *theirs);
                }
            }
        }
        self.epsilon = self.epsilon * own_weight + other.epsilon * other_weight;
        self.alpha = self.alpha * own_weight + other.alpha * other_weight;
        self.gamma = self.gamma * own_weight + other.gamma * other_weight;
        true
    }

    fn share_with(&mut self, other: &mut dyn Policy, discount: f64) {
        let Some(other) = other.as_any_mut().downcast_mut::<Self>() else {
            return;
        };
        if other.config.encoding != self.config.encoding {
            return;
        }
        let to_other: Vec<(StateKey, Row)> = self
            .table
            .iter()
            .filter(|(key, _)| !other.table.contains_key(key))
            .map(|(key, row)| (*key, row.map(|value| value * discount)))
            .collect();
        let to_self: Vec<(StateKey, Row)> = other
            .table
            .iter()
            .filter(|(key, _)| !self.table.contains_key(key))
            .map(|(key, row)| (*key, row.map(|value| value * discount)))
            .collect();
        other.table.extend(to_other);
        self.table.extend(to_self);
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
