//! Immutable, serializable views of world state for external consumers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{Agent, AgentId, Event, Experience, Food, GroupId, Sex, Tick};

/// Messages written to clients. Serialized with a `type` discriminator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Handshake carrying the grid dimensions.
    Config { w: u32, h: u32 },
    /// Per-tick world state.
    State(WorldSnapshot),
}

/// Point-in-time view of the world taken at the end of a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub tick: Tick,
    pub agents: Vec<AgentView>,
    pub foods: Vec<FoodView>,
    pub metrics: Metrics,
    pub lineage: BTreeMap<AgentId, Vec<AgentId>>,
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentView {
    pub id: AgentId,
    pub x: i32,
    pub y: i32,
    pub energy: f64,
    pub age: u32,
    pub sex: Sex,
    pub spd: u8,
    pub agg: f64,
    pub repro: f64,
    pub strength: f64,
    pub exp: Experience,
    pub parents: Vec<AgentId>,
    /// Index of the last chosen action.
    pub policy_dir: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vitals: Option<VitalsView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
}

/// Vital statistics, present only when the extended model is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VitalsView {
    pub fatigue: f64,
    pub hunger: f64,
    pub stress: f64,
    pub health: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FoodView {
    pub x: i32,
    pub y: i32,
    pub energy: f64,
}

/// Aggregate population metrics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Metrics {
    pub population: usize,
    pub avg_energy: f64,
    pub avg_aggression: f64,
    /// Cumulative births, including seeded and externally placed agents.
    pub births: u64,
    pub deaths: u64,
    /// Average age at death; zero before the first death.
    pub avg_life: f64,
}

impl AgentView {
    pub(crate) fn from_agent(agent: &Agent, extended: bool) -> Self {
        let vitals = agent.vitals;
        Self {
            id: agent.id,
            x: agent.position.x,
            y: agent.position.y,
            energy: agent.energy,
            age: agent.age,
            sex: agent.sex,
            spd: agent.traits.speed,
            agg: agent.traits.aggression,
            repro: agent.traits.reproduction,
            strength: agent.traits.strength,
            exp: agent.experience,
            parents: agent.parents.to_vec(),
            policy_dir: agent.last_action.index() as u8,
            vitals: extended.then_some(VitalsView {
                fatigue: vitals.fatigue,
                hunger: vitals.hunger,
                stress: vitals.stress,
                health: vitals.health,
            }),
            group_id: agent.group,
        }
    }
}

impl From<&Food> for FoodView {
    fn from(food: &Food) -> Self {
        Self {
            x: food.position.x,
            y: food.position.y,
            energy: food.energy,
        }
    }
}

impl Metrics {
    pub(crate) fn collect<'a>(
        agents: impl ExactSizeIterator<Item = &'a Agent>,
        births: u64,
        deaths: u64,
        total_age_at_death: u64,
    ) -> Self {
        let population = agents.len();
        let (energy, aggression) = agents.fold((0.0, 0.0), |(e, a), agent| {
            (e + agent.energy, a + agent.traits.aggression)
        });
        let mean = |sum: f64| {
            if population == 0 {
                0.0
            } else {
                sum / population as f64
            }
        };
        Self {
            population,
            avg_energy: mean(energy),
            avg_aggression: mean(aggression),
            births,
            deaths,
            avg_life: if deaths == 0 {
                0.0
            } else {
                total_age_at_death as f64 / deaths as f64
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Position, Traits};

    #[test]
    fn config_message_matches_handshake_shape() {
        let json = serde_json::to_value(ServerMessage::Config { w: 80, h: 60 }).expect("json");
        assert_eq!(json, serde_json::json!({"type": "config", "w": 80, "h": 60}));
    }

    #[test]
    fn metrics_average_over_population() {
        let a = Agent::new(AgentId(1), Position::new(0, 0), 10.0, Sex::Male, Traits::default());
        let mut b = a.clone();
        b.id = AgentId(2);
        b.energy = 30.0;
        b.traits.aggression = 1.0;
        let metrics = Metrics::collect([&a, &b].into_iter(), 5, 2, 30);
        assert_eq!(metrics.population, 2);
        assert!((metrics.avg_energy - 20.0).abs() < 1e-12);
        assert!((metrics.avg_aggression - 0.75).abs() < 1e-12);
        assert!((metrics.avg_life - 15.0).abs() < 1e-12);

        let empty = Metrics::collect(std::iter::empty(), 0, 0, 0);
        assert!(empty.avg_energy.abs() < f64::EPSILON);
        assert!(empty.avg_life.abs() < f64::EPSILON);
    }

    #[test]
    fn state_message_is_tagged() {
        let snapshot = WorldSnapshot {
            tick: Tick(3),
            agents: Vec::new(),
            foods: vec![FoodView {
                x: 1,
                y: 2,
                energy: 12.0,
            }],
            metrics: Metrics::default(),
            lineage: BTreeMap::new(),
            events: Vec::new(),
        };
        let json = serde_json::to_value(ServerMessage::State(snapshot)).expect("json");
        assert_eq!(json["type"], "state");
        assert_eq!(json["tick"], 3);
        assert_eq!(json["foods"][0]["energy"], 12.0);
    }
}
