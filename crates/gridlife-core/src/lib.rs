//! Core types and simulation engine for the gridlife foraging world.

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

mod config;
mod events;
mod interaction;
mod perception;
mod policy;
mod snapshot;
mod world;

pub use config::{
    CombatConfig, FoodConfig, MergeConfig, MetabolismConfig, PhysiologyConfig, ReproductionConfig,
    RewardWeights, SimConfig, WorldError,
};
pub use events::{Event, EventKind, EventLog};
pub use perception::{FEATURE_COUNT, Percept, StateKey, perceive};
pub use policy::{Action, Policy, PolicyBinding, PolicyRegistry};
pub use snapshot::{AgentView, FoodView, Metrics, ServerMessage, VitalsView, WorldSnapshot};
pub use world::{TickSummary, World};

/// Unique, monotonically increasing agent identifier. Never reused.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct AgentId(pub u64);

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a social group (extended model only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub u64);

/// Simulation tick counter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Tick(pub u64);

impl Tick {
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Integer cell coordinate on the bounded grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Manhattan distance to another cell.
    #[must_use]
    pub fn manhattan(self, other: Self) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }

    /// Euclidean distance to another cell.
    #[must_use]
    pub fn euclidean(self, other: Self) -> f64 {
        let dx = f64::from(self.x - other.x);
        let dy = f64::from(self.y - other.y);
        dx.hypot(dy)
    }
}

/// Binary sex of an agent; serialized as `"M"` / `"F"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Sex {
    #[default]
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
}

impl Sex {
    /// Draw a sex uniformly at random.
    pub fn random(rng: &mut dyn RngCore) -> Self {
        if rng.random_bool(0.5) {
            Self::Male
        } else {
            Self::Female
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Male => "M",
            Self::Female => "F",
        }
    }
}

/// Heritable traits blended on reproduction and merge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Traits {
    pub aggression: f64,
    pub speed: u8,
    pub strength: f64,
    pub reproduction: f64,
}

impl Traits {
    pub const SPEED_MIN: u8 = 1;
    pub const SPEED_MAX: u8 = 5;
    pub const STRENGTH_MAX: f64 = 100.0;

    /// Clamp every trait into its valid range.
    #[must_use]
    pub fn clamped(self) -> Self {
        Self {
            aggression: clamp01(self.aggression),
            speed: self.speed.clamp(Self::SPEED_MIN, Self::SPEED_MAX),
            strength: finite_or(self.strength, 0.0).clamp(0.0, Self::STRENGTH_MAX),
            reproduction: clamp01(self.reproduction),
        }
    }

    /// Sample traits for a randomly seeded agent.
    pub fn random(rng: &mut dyn RngCore) -> Self {
        Self {
            aggression: rng.random::<f64>(),
            speed: rng.random_range(1..=2),
            strength: 5.0 + rng.random::<f64>() * 10.0,
            reproduction: 0.3 + rng.random::<f64>() * 0.35,
        }
    }
}

impl Default for Traits {
    fn default() -> Self {
        Self {
            aggression: 0.5,
            speed: 1,
            strength: 5.0,
            reproduction: 0.05,
        }
    }
}

/// Named experience tallies accumulated over an agent's life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Experience {
    pub ate: u32,
    pub attacks: u32,
    pub kills: u32,
    pub repro: u32,
    pub merges: u32,
}

impl Experience {
    /// Sum of every tally.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.ate + self.attacks + self.kills + self.repro + self.merges
    }

    /// Fold another agent's tallies into this one.
    pub fn absorb(&mut self, other: &Self) {
        self.ate += other.ate;
        self.attacks += other.attacks;
        self.kills += other.kills;
        self.repro += other.repro;
        self.merges += other.merges;
    }
}

/// Vital statistics of the extended physiological model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vitals {
    pub fatigue: f64,
    pub hunger: f64,
    pub stress: f64,
    pub health: f64,
}

impl Vitals {
    pub const MAX: f64 = 100.0;
}

impl Default for Vitals {
    fn default() -> Self {
        Self {
            fatigue: 0.0,
            hunger: 0.0,
            stress: 0.0,
            health: Self::MAX,
        }
    }
}

/// Lineage list; two parents for births, growing with each merge.
pub type ParentList = SmallVec<[AgentId; 2]>;

/// A simulated organism.
#[derive(Debug, Clone)]
pub struct Agent {
    pub id: AgentId,
    pub position: Position,
    pub energy: f64,
    pub sex: Sex,
    pub age: u32,
    pub traits: Traits,
    pub experience: Experience,
    pub vitals: Vitals,
    /// Ticks elapsed since the last meal.
    pub ticks_since_meal: u32,
    pub parents: ParentList,
    pub group: Option<GroupId>,
    pub last_action: Action,
    pub policy: PolicyBinding,
}

impl Agent {
    /// Construct a fresh agent with default vitals and no policy bound.
    #[must_use]
    pub fn new(id: AgentId, position: Position, energy: f64, sex: Sex, traits: Traits) -> Self {
        Self {
            id,
            position,
            energy,
            sex,
            age: 0,
            traits: traits.clamped(),
            experience: Experience::default(),
            vitals: Vitals::default(),
            ticks_since_meal: 0,
            parents: ParentList::new(),
            group: None,
            last_action: Action::STAY,
            policy: PolicyBinding::unbound(),
        }
    }
}

/// A food item occupying one cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Food {
    pub position: Position,
    pub energy: f64,
}

/// Standard normal sample via the Box-Muller transform.
pub fn gaussian(rng: &mut dyn RngCore) -> f64 {
    const TWO_PI: f64 = std::f64::consts::TAU;
    let u1 = rng.random::<f64>().clamp(f64::MIN_POSITIVE, 1.0);
    let u2 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (TWO_PI * u2).cos()
}

fn clamp01(value: f64) -> f64 {
    finite_or(value, 0.0).clamp(0.0, 1.0)
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() { value } else { fallback }
}
