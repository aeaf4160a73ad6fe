//! Derives what an agent perceives from the current world state.
//!
//! A single pass produces every encoding the policies consume: the continuous
//! feature vector, per-action food distances for heuristic shaping, and the
//! two discretized state keys (basic and extended).

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::{Action, Agent, Food, Position};

/// Length of the continuous feature vector `{bias, dx, dy, energy, threat}`.
pub const FEATURE_COUNT: usize = 5;

/// Manhattan radius inside which stronger same-sex rivals count as a threat.
const THREAT_RADIUS: i32 = 3;
const BASIC_THREAT_RADIUS: i32 = 2;
const BASIC_CROWD_RADIUS: i32 = 3;
const EXTENDED_FOOD_RADIUS: f64 = 50.0;
const EXTENDED_CROWD_RADIUS: f64 = 10.0;
const NO_FOOD_EXTENDED: u8 = 8;

/// Discretized state used as the tabular policy key.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct StateKey {
    pub food_direction: u8,
    pub food_distance: u8,
    pub energy: u8,
    pub threat: u8,
    pub nearby: u8,
    pub fatigue: u8,
    pub hunger: u8,
    pub stress: u8,
}

/// Everything an agent perceives at one instant.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Percept {
    pub features: [f64; FEATURE_COUNT],
    /// Manhattan distance to the nearest food, or `width + height` when none exists.
    pub food_distance: f64,
    /// Nearest-food distance after taking each action, indexed by action.
    pub food_distance_after: [f64; Action::COUNT],
    pub basic_key: StateKey,
    pub extended_key: StateKey,
    pub energy: f64,
    pub age: u32,
    pub experience: u32,
}

impl Percept {
    /// Threat feature in `[0, 1]`.
    #[must_use]
    pub fn threat(&self) -> f64 {
        self.features[4]
    }
}

/// Perceive the world from `agent`'s point of view.
///
/// `agents` may include `agent` itself; it is skipped by id. Ties between
/// equally distant foods resolve to the first one yielded by `foods`.
pub fn perceive<'a, A, F>(agent: &Agent, agents: A, foods: F, width: u32, height: u32) -> Percept
where
    A: Iterator<Item = &'a Agent> + Clone,
    F: Iterator<Item = &'a Food> + Clone,
{
    let pos = agent.position;
    let no_food = f64::from(width) + f64::from(height);
    let max_x = width.saturating_sub(1) as i32;
    let max_y = height.saturating_sub(1) as i32;

    let candidates: [Position; Action::COUNT] = std::array::from_fn(|idx| {
        let (dx, dy) = Action::new(idx).map_or((0, 0), Action::offset);
        Position::new((pos.x + dx).clamp(0, max_x), (pos.y + dy).clamp(0, max_y))
    });

    let mut nearest: Option<(Position, i32)> = None;
    let mut after = [no_food; Action::COUNT];
    let mut nearest_euclid: Option<(Position, f64)> = None;
    for food in foods {
        let d = pos.manhattan(food.position);
        if nearest.is_none_or(|(_, best)| d < best) {
            nearest = Some((food.position, d));
        }
        for (slot, cell) in after.iter_mut().zip(&candidates) {
            *slot = slot.min(f64::from(cell.manhattan(food.position)));
        }
        let e = pos.euclidean(food.position);
        if e < EXTENDED_FOOD_RADIUS && nearest_euclid.is_none_or(|(_, best)| e < best) {
            nearest_euclid = Some((food.position, e));
        }
    }

    let others = agents.filter(|other| other.id != agent.id);
    let threat = threat_score(agent, others.clone());

    let (dx_norm, dy_norm) = nearest.map_or((0.0, 0.0), |(food, _)| {
        (
            f64::from(food.x - pos.x) / f64::from(width),
            f64::from(food.y - pos.y) / f64::from(height),
        )
    });
    let energy_norm = (agent.energy / 100.0).clamp(0.0, 1.0);
    let food_distance = nearest.map_or(no_food, |(_, d)| f64::from(d));

    Percept {
        features: [1.0, dx_norm, dy_norm, energy_norm, threat],
        food_distance,
        food_distance_after: after,
        basic_key: basic_key(agent, nearest, others.clone()),
        extended_key: extended_key(agent, nearest_euclid, others),
        energy: agent.energy,
        age: agent.age,
        experience: agent.experience.total(),
    }
}

/// Strongest threat posed by a same-sex rival within [`THREAT_RADIUS`], clamped to `[0, 1]`.
fn threat_score<'a>(agent: &Agent, others: impl Iterator<Item = &'a Agent>) -> f64 {
    others
        .filter(|other| other.sex == agent.sex)
        .filter_map(|other| {
            let d = agent.position.manhattan(other.position);
            (d <= THREAT_RADIUS).then(|| {
                let gap = (other.traits.strength - agent.traits.strength).max(0.0);
                OrderedFloat(gap / 10.0 / f64::from(d + 1))
            })
        })
        .max()
        .map_or(0.0, |score| score.0.clamp(0.0, 1.0))
}

fn basic_key<'a>(
    agent: &Agent,
    nearest: Option<(Position, i32)>,
    others: impl Iterator<Item = &'a Agent>,
) -> StateKey {
    let pos = agent.position;
    let (food_direction, food_distance) = match nearest {
        Some((food, d)) => {
            let sx = (food.x - pos.x).signum() + 1;
            let sy = (food.y - pos.y).signum() + 1;
            let bucket = match d {
                0..=2 => 0,
                3..=5 => 1,
                6..=10 => 2,
                11..=20 => 3,
                _ => 4,
            };
            ((sy * 3 + sx) as u8, bucket)
        }
        None => (Action::STAY.index() as u8, 4),
    };

    let energy = match agent.energy {
        e if e > 150.0 => 4,
        e if e > 100.0 => 3,
        e if e > 50.0 => 2,
        e if e > 25.0 => 1,
        _ => 0,
    };

    let mut threat = 0u8;
    let mut nearby = 0u8;
    for other in others {
        let d = pos.manhattan(other.position);
        if other.sex == agent.sex && d <= BASIC_THREAT_RADIUS {
            threat = threat.saturating_add(1);
        }
        if d <= BASIC_CROWD_RADIUS {
            nearby = nearby.saturating_add(1);
        }
    }

    StateKey {
        food_direction,
        food_distance,
        energy,
        threat: threat.min(3),
        nearby: nearby.min(3),
        ..StateKey::default()
    }
}

fn extended_key<'a>(
    agent: &Agent,
    nearest: Option<(Position, f64)>,
    others: impl Iterator<Item = &'a Agent>,
) -> StateKey {
    let pos = agent.position;
    let (food_direction, food_distance) = match nearest {
        Some((food, d)) => {
            let angle = f64::from(food.y - pos.y)
                .atan2(f64::from(food.x - pos.x))
                .to_degrees();
            let direction = (((angle + 360.0) / 45.0) as u32 % 8) as u8;
            let bucket = match d {
                d if d < 5.0 => 0,
                d if d < 15.0 => 1,
                d if d < 30.0 => 2,
                d if d < 60.0 => 3,
                _ => 4,
            };
            (direction, bucket)
        }
        None => (NO_FOOD_EXTENDED, 4),
    };

    let mut threat = 0u8;
    let mut nearby = 0u8;
    for other in others {
        if pos.euclidean(other.position) >= EXTENDED_CROWD_RADIUS {
            continue;
        }
        nearby = nearby.saturating_add(1);
        let level = if other.traits.aggression > 0.7 && other.traits.strength > agent.traits.strength
        {
            2
        } else if other.traits.aggression > 0.5 {
            1
        } else {
            0
        };
        threat = threat.max(level);
    }

    let vitals = agent.vitals;
    StateKey {
        food_direction,
        food_distance,
        energy: bucket(agent.energy, 25.0, 4),
        threat,
        nearby: nearby.min(3),
        fatigue: bucket(vitals.fatigue, 25.0, 4),
        hunger: bucket(vitals.hunger, 33.0, 3),
        stress: bucket(vitals.stress, 33.0, 3),
    }
}

fn bucket(value: f64, width: f64, max: u8) -> u8 {
    let level = (value / width).floor();
    if level.is_nan() || level <= 0.0 {
        0
    } else {
        (level as u64).min(u64::from(max)) as u8
    }
}
