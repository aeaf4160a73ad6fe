//! Movement action space and the swappable learned-policy contract.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

use crate::Percept;

/// One of the nine moves `{-1,0,+1} x {-1,0,+1}`, encoded as `(dy+1)*3 + (dx+1)`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Action(u8);

impl Action {
    /// Size of the action space.
    pub const COUNT: usize = 9;
    /// The null move `(0, 0)`.
    pub const STAY: Self = Self(4);

    /// Build an action from its index; `None` when out of range.
    #[must_use]
    pub fn new(index: usize) -> Option<Self> {
        u8::try_from(index)
            .ok()
            .filter(|&idx| usize::from(idx) < Self::COUNT)
            .map(Self)
    }

    /// Build an action from a relative offset; both components must be in `-1..=1`.
    #[must_use]
    pub fn from_offset(dx: i32, dy: i32) -> Option<Self> {
        if !(-1..=1).contains(&dx) || !(-1..=1).contains(&dy) {
            return None;
        }
        Self::new(((dy + 1) * 3 + (dx + 1)) as usize)
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Relative `(dx, dy)` displacement of this move.
    #[must_use]
    pub const fn offset(self) -> (i32, i32) {
        let idx = self.0 as i32;
        (idx % 3 - 1, idx / 3 - 1)
    }

    /// All actions in ascending index order.
    pub fn all() -> impl Iterator<Item = Self> {
        (0..Self::COUNT as u8).map(Self)
    }
}

/// Learned movement behaviour: maps a percept to an action and learns from reward.
pub trait Policy: Send + Sync {
    /// Static identifier of the policy implementation.
    fn kind(&self) -> &'static str;

    /// Pick the next move for the perceived state.
    fn choose_action(&mut self, percept: &Percept, rng: &mut dyn RngCore) -> Action;

    /// Learn from the reward observed after taking `action` in `percept`.
    fn update(
        &mut self,
        percept: &Percept,
        action: Action,
        reward: f64,
        next: &Percept,
        rng: &mut dyn RngCore,
    );

    /// Blend two parents into a child policy. `None` when the partner is an incompatible kind.
    fn offspring(&self, partner: &dyn Policy, rng: &mut dyn RngCore) -> Option<Box<dyn Policy>>;

    /// Fold `other` into `self`, weighting entries by the supplied energy shares.
    /// Returns `false` when the kinds are incompatible and nothing changed.
    fn absorb(&mut self, other: &dyn Policy, own_weight: f64, other_weight: f64) -> bool;

    /// Exchange learned entries the other side lacks, scaled by `discount`.
    fn share_with(&mut self, _other: &mut dyn Policy, _discount: f64) {}

    fn clone_box(&self) -> Box<dyn Policy>;

    fn as_any(&self) -> &(dyn Any + Send + Sync);

    fn as_any_mut(&mut self) -> &mut (dyn Any + Send + Sync);
}

/// Policy attachment held by each agent. Unbound agents stay in place.
#[derive(Default)]
pub struct PolicyBinding {
    policy: Option<Box<dyn Policy>>,
    registry_key: Option<u64>,
}

impl Clone for PolicyBinding {
    fn clone(&self) -> Self {
        Self {
            policy: self.policy.as_ref().map(|policy| policy.clone_box()),
            registry_key: self.registry_key,
        }
    }
}

impl fmt::Debug for PolicyBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyBinding")
            .field("kind", &self.kind())
            .field("registry_key", &self.registry_key)
            .finish()
    }
}

impl PolicyBinding {
    #[must_use]
    pub fn unbound() -> Self {
        Self::default()
    }

    /// Attach a policy produced outside the registry.
    #[must_use]
    pub fn with_policy(policy: Box<dyn Policy>) -> Self {
        Self {
            policy: Some(policy),
            registry_key: None,
        }
    }

    /// Instantiate a policy from the registry.
    #[must_use]
    pub fn from_registry(
        registry: &PolicyRegistry,
        rng: &mut dyn RngCore,
        key: u64,
    ) -> Option<Self> {
        let policy = registry.spawn(rng, key)?;
        Some(Self {
            policy: Some(policy),
            registry_key: Some(key),
        })
    }

    #[must_use]
    pub fn kind(&self) -> Option<&'static str> {
        self.policy.as_ref().map(|policy| policy.kind())
    }

    #[must_use]
    pub const fn registry_key(&self) -> Option<u64> {
        self.registry_key
    }

    #[must_use]
    pub const fn is_bound(&self) -> bool {
        self.policy.is_some()
    }

    #[must_use]
    pub fn policy(&self) -> Option<&dyn Policy> {
        self.policy.as_deref()
    }

    pub fn choose_action(&mut self, percept: &Percept, rng: &mut dyn RngCore) -> Action {
        self.policy
            .as_mut()
            .map_or(Action::STAY, |policy| policy.choose_action(percept, rng))
    }

    pub fn update(
        &mut self,
        percept: &Percept,
        action: Action,
        reward: f64,
        next: &Percept,
        rng: &mut dyn RngCore,
    ) {
        if let Some(policy) = self.policy.as_mut() {
            policy.update(percept, action, reward, next, rng);
        }
    }

    /// Child binding blended from two parents; falls back to a copy of whichever parent is bound.
    pub fn offspring(&self, partner: &Self, rng: &mut dyn RngCore) -> Self {
        match (self.policy.as_deref(), partner.policy.as_deref()) {
            (Some(own), Some(other)) => match own.offspring(other, rng) {
                Some(child) => Self {
                    policy: Some(child),
                    registry_key: self.registry_key,
                },
                None => self.clone(),
            },
            (Some(_), None) => self.clone(),
            (None, Some(_)) => partner.clone(),
            (None, None) => Self::unbound(),
        }
    }

    /// Fold the absorbed agent's policy into this one.
    pub fn absorb(&mut self, other: &Self, own_weight: f64, other_weight: f64) {
        if !self.is_bound() {
            if other.is_bound() {
                *self = other.clone();
            }
            return;
        }
        if let (Some(own), Some(theirs)) = (self.policy.as_mut(), other.policy.as_deref()) {
            own.absorb(theirs, own_weight, other_weight);
        }
    }

    /// Exchange learned entries with another binding.
    pub fn share_with(&mut self, other: &mut Self, discount: f64) {
        if let (Some(own), Some(theirs)) = (self.policy.as_mut(), other.policy.as_mut()) {
            own.share_with(theirs.as_mut(), discount);
        }
    }
}

type PolicySpawner = Box<dyn Fn(&mut dyn RngCore) -> Box<dyn Policy> + Send + Sync + 'static>;

struct PolicyEntry {
    kind: Cow<'static, str>,
    spawner: PolicySpawner,
}

/// Registry owning policy factories keyed by opaque handles.
#[derive(Default)]
pub struct PolicyRegistry {
    next_key: u64,
    entries: HashMap<u64, PolicyEntry>,
}

impl fmt::Debug for PolicyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyRegistry")
            .field("next_key", &self.next_key)
            .field("entry_count", &self.entries.len())
            .finish()
    }
}

impl PolicyRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new policy factory, returning its registry key.
    pub fn register<F>(&mut self, kind: impl Into<Cow<'static, str>>, factory: F) -> u64
    where
        F: Fn(&mut dyn RngCore) -> Box<dyn Policy> + Send + Sync + 'static,
    {
        let key = self.next_key;
        self.next_key += 1;
        self.entries.insert(
            key,
            PolicyEntry {
                kind: kind.into(),
                spawner: Box::new(factory),
            },
        );
        key
    }

    pub fn unregister(&mut self, key: u64) -> bool {
        self.entries.remove(&key).is_some()
    }

    /// Instantiate a new policy using the factory referenced by `key`.
    pub fn spawn(&self, rng: &mut dyn RngCore, key: u64) -> Option<Box<dyn Policy>> {
        self.entries.get(&key).map(|entry| (entry.spawner)(rng))
    }

    #[must_use]
    pub fn kind(&self, key: u64) -> Option<&str> {
        self.entries.get(&key).map(|entry| entry.kind.as_ref())
    }
}
