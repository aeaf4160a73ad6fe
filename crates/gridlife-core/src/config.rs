use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when constructing world state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorldError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Static configuration for a gridlife world.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimConfig {
    /// Grid width in cells.
    pub width: u32,
    /// Grid height in cells.
    pub height: u32,
    /// Optional RNG seed for reproducible worlds.
    pub rng_seed: Option<u64>,
    /// Number of random agents seeded at startup.
    pub initial_agents: usize,
    /// Maximum number of retained diagnostic events.
    pub event_log_capacity: usize,
    pub food: FoodConfig,
    pub metabolism: MetabolismConfig,
    pub combat: CombatConfig,
    pub merge: MergeConfig,
    pub reproduction: ReproductionConfig,
    pub rewards: RewardWeights,
    pub physiology: PhysiologyConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            width: 100,
            height: 100,
            rng_seed: None,
            initial_agents: 2,
            event_log_capacity: 5_000,
            food: FoodConfig::default(),
            metabolism: MetabolismConfig::default(),
            combat: CombatConfig::default(),
            merge: MergeConfig::default(),
            reproduction: ReproductionConfig::default(),
            rewards: RewardWeights::default(),
            physiology: PhysiologyConfig::default(),
        }
    }
}

/// Passive food spawning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FoodConfig {
    /// Whether passive spawning starts enabled.
    pub random_spawn: bool,
    /// Probability that a single spawn attempt places food.
    pub spawn_chance: f64,
    /// Grid cells per spawn attempt; attempts per tick = area / this.
    pub cells_per_attempt: u32,
    /// Minimum energy of spawned food.
    pub energy_min: f64,
    /// Uniform spread added on top of `energy_min`.
    pub energy_spread: f64,
}

impl Default for FoodConfig {
    fn default() -> Self {
        Self {
            random_spawn: true,
            spawn_chance: 0.04,
            cells_per_attempt: 50,
            energy_min: 12.0,
            energy_spread: 12.0,
        }
    }
}

/// Per-tick energy decay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetabolismConfig {
    /// Baseline energy drained every tick.
    pub drain: f64,
    /// Ticks without food before the starvation drain applies.
    pub starvation_grace: u32,
    /// Additional drain once the grace period has elapsed.
    pub starvation_drain: f64,
}

impl Default for MetabolismConfig {
    fn default() -> Self {
        Self {
            drain: 0.08,
            starvation_grace: 100,
            starvation_drain: 0.15,
        }
    }
}

/// Combat resolution constants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CombatConfig {
    /// Attack resolves when the rolled chance exceeds this value.
    pub threshold: f64,
    /// Standard deviation of the Gaussian noise added to the chance.
    pub noise: f64,
    pub damage_min: f64,
    pub damage_spread: f64,
    /// Fraction of dealt damage credited to the attacker.
    pub energy_steal: f64,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            threshold: 0.1,
            noise: 0.2,
            damage_min: 2.0,
            damage_spread: 3.0,
            energy_steal: 0.1,
        }
    }
}

/// Merge (same-sex fusion) constants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MergeConfig {
    /// Combined energy that must be exceeded before a merge can trigger.
    pub energy_threshold: f64,
    pub base_chance: f64,
    /// Scale applied to the mean reproduction trait of both agents.
    pub trait_scale: f64,
    /// Survivor energy = combined energy * cost factor.
    pub cost_factor: f64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            energy_threshold: 40.0,
            base_chance: 0.15,
            trait_scale: 0.2,
            cost_factor: 0.85,
        }
    }
}

/// Reproduction and mutation constants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReproductionConfig {
    /// Both parents must hold strictly more energy than this.
    pub energy_floor: f64,
    /// Multiplicative energy penalty applied to both parents.
    pub parent_energy_factor: f64,
    /// Child energy = (sum of parent energies) * this fraction.
    pub child_energy_fraction: f64,
    pub aggression_sigma: f64,
    pub speed_sigma: f64,
    pub strength_sigma: f64,
    pub reproduction_sigma: f64,
}

impl Default for ReproductionConfig {
    fn default() -> Self {
        Self {
            energy_floor: 15.0,
            parent_energy_factor: 0.85,
            child_energy_fraction: 0.25,
            aggression_sigma: 0.05,
            speed_sigma: 0.5,
            strength_sigma: 0.5,
            reproduction_sigma: 0.01,
        }
    }
}

/// Reward shaping weights shared by every policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RewardWeights {
    pub energy: f64,
    pub kill: f64,
    pub repro: f64,
    /// Multiplier on the reduction of distance to the nearest food.
    pub food_distance: f64,
    /// Added to the distance delta on the tick an agent eats.
    pub eat_bonus: f64,
    pub well_fed_threshold: f64,
    pub well_fed_bonus: f64,
    /// Extended model: reward per tick of age.
    pub age: f64,
    /// Extended model: bonus for belonging to a social group.
    pub group: f64,
    /// Extended model: penalty per unit of hunger, fatigue and stress.
    pub vital_penalty: f64,
}

impl Default for RewardWeights {
    fn default() -> Self {
        Self {
            energy: 1.0,
            kill: 5.0,
            repro: 3.0,
            food_distance: 1.5,
            eat_bonus: 2.0,
            well_fed_threshold: 50.0,
            well_fed_bonus: 0.1,
            age: 1.0 / 1_000.0,
            group: 0.2,
            vital_penalty: 1.0 / 200.0,
        }
    }
}

/// Extended physiological model: vitals, social groups and extra reward terms.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PhysiologyConfig {
    pub enabled: bool,
    /// `(base, spread)` increments applied per tick.
    pub fatigue_rate: (f64, f64),
    pub hunger_rate: (f64, f64),
    pub stress_rate: (f64, f64),
    /// Health lost per tick = (fatigue + hunger + stress) / this.
    pub health_divisor: f64,
    /// Euclidean radius for choosing a social partner.
    pub social_radius: f64,
    pub group_found_chance: f64,
    pub group_join_chance: f64,
    /// Energy gained by each member when two members of one group meet.
    pub group_energy_bonus: f64,
    pub group_stress_relief: f64,
    /// Discount applied to policy entries shared between group members.
    pub share_discount: f64,
}

impl Default for PhysiologyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            fatigue_rate: (0.1, 0.2),
            hunger_rate: (0.1, 0.3),
            stress_rate: (0.05, 0.1),
            health_divisor: 600.0,
            social_radius: 20.0,
            group_found_chance: 0.3,
            group_join_chance: 0.5,
            group_energy_bonus: 0.5,
            group_stress_relief: 1.0,
            share_discount: 0.7,
        }
    }
}

impl SimConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), WorldError> {
        if self.width == 0 || self.height == 0 {
            return Err(WorldError::InvalidConfig("grid dimensions must be non-zero"));
        }
        if self.width > i32::MAX as u32 || self.height > i32::MAX as u32 {
            return Err(WorldError::InvalidConfig("grid dimensions exceed i32 range"));
        }
        if self.event_log_capacity == 0 {
            return Err(WorldError::InvalidConfig(
                "event_log_capacity must be positive",
            ));
        }
        let food = &self.food;
        if !(0.0..=1.0).contains(&food.spawn_chance) {
            return Err(WorldError::InvalidConfig("food.spawn_chance must be in [0, 1]"));
        }
        if food.cells_per_attempt == 0 {
            return Err(WorldError::InvalidConfig(
                "food.cells_per_attempt must be positive",
            ));
        }
        if food.energy_min <= 0.0 || food.energy_spread < 0.0 {
            return Err(WorldError::InvalidConfig(
                "food energy must be positive with a non-negative spread",
            ));
        }
        if self.metabolism.drain < 0.0 || self.metabolism.starvation_drain < 0.0 {
            return Err(WorldError::InvalidConfig("metabolism drains must be non-negative"));
        }
        if self.combat.damage_min < 0.0
            || self.combat.damage_spread < 0.0
            || self.combat.noise < 0.0
            || self.combat.energy_steal < 0.0
        {
            return Err(WorldError::InvalidConfig(
                "combat damage, noise and steal must be non-negative",
            ));
        }
        if !(self.merge.cost_factor > 0.0 && self.merge.cost_factor <= 1.0) {
            return Err(WorldError::InvalidConfig("merge.cost_factor must be in (0, 1]"));
        }
        let repro = &self.reproduction;
        if repro.energy_floor < 0.0 {
            return Err(WorldError::InvalidConfig(
                "reproduction.energy_floor must be non-negative",
            ));
        }
        if !(repro.parent_energy_factor > 0.0 && repro.parent_energy_factor < 1.0) {
            return Err(WorldError::InvalidConfig(
                "reproduction.parent_energy_factor must be in (0, 1)",
            ));
        }
        if repro.child_energy_fraction <= 0.0 {
            return Err(WorldError::InvalidConfig(
                "reproduction.child_energy_fraction must be positive",
            ));
        }
        if repro.aggression_sigma < 0.0
            || repro.speed_sigma < 0.0
            || repro.strength_sigma < 0.0
            || repro.reproduction_sigma < 0.0
        {
            return Err(WorldError::InvalidConfig("mutation sigmas must be non-negative"));
        }
        let physiology = &self.physiology;
        if physiology.health_divisor <= 0.0 || physiology.social_radius < 0.0 {
            return Err(WorldError::InvalidConfig(
                "physiology health divisor must be positive and social radius non-negative",
            ));
        }
        Ok(())
    }

    /// Returns the configured RNG seed, generating one from entropy if absent.
    pub(crate) fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }

    /// Number of spawn attempts per tick, proportional to grid area.
    #[must_use]
    pub fn food_spawn_attempts(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height) / u64::from(self.food.cells_per_attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(SimConfig::default().validate(), Ok(()));
    }

    #[test]
    fn zero_dimensions_are_rejected() {
        let config = SimConfig {
            width: 0,
            ..SimConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(WorldError::InvalidConfig(_))
        ));
    }

    #[test]
    fn cost_factor_out_of_range_is_rejected() {
        let mut config = SimConfig::default();
        config.merge.cost_factor = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: SimConfig =
            serde_json::from_str(r#"{"width": 40, "merge": {"cost_factor": 0.5}}"#)
                .expect("parse");
        assert_eq!(config.width, 40);
        assert_eq!(config.height, 100);
        assert!((config.merge.cost_factor - 0.5).abs() < f64::EPSILON);
        assert!((config.merge.base_chance - 0.15).abs() < f64::EPSILON);
    }

    #[test]
    fn spawn_attempts_scale_with_area() {
        assert_eq!(SimConfig::default().food_spawn_attempts(), 200);
    }
}
