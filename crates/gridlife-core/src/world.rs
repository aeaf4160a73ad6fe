//! World state and the per-tick lifecycle driver.

use rand::Rng;
use rand::rngs::SmallRng;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

use crate::snapshot::{AgentView, FoodView, Metrics, ServerMessage, WorldSnapshot};
use crate::{
    Action, Agent, AgentId, Event, EventKind, EventLog, Food, GroupId, ParentList, Percept,
    PolicyBinding, PolicyRegistry, Position, Sex, SimConfig, Tick, Traits, Vitals, WorldError,
    perceive,
};

/// Counters describing what happened during one call to [`World::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickSummary {
    pub tick: Tick,
    /// Population at the end of the tick.
    pub population: usize,
    pub births: usize,
    pub deaths: usize,
    /// Agents absorbed by a merge this tick.
    pub merges: usize,
    pub food_spawned: usize,
}

/// Cell-keyed food storage; iteration runs in `(x, y)` order.
pub(crate) type FoodMap = BTreeMap<(i32, i32), Food>;

/// The complete simulation: agents, foods, lineage, counters and the RNG.
pub struct World {
    pub(crate) config: SimConfig,
    tick: Tick,
    pub(crate) rng: SmallRng,
    pub(crate) agents: BTreeMap<AgentId, Agent>,
    pub(crate) foods: FoodMap,
    next_id: u64,
    pub(crate) lineage: BTreeMap<AgentId, ParentList>,
    pub(crate) events: EventLog,
    births: u64,
    deaths: u64,
    total_age_at_death: u64,
    random_food: bool,
    registry: PolicyRegistry,
    default_policy: Option<u64>,
    next_group: u64,
    /// Social groups and their members (extended model only).
    pub(crate) groups: BTreeMap<GroupId, BTreeSet<AgentId>>,
    /// Agents that already reproduced during the current tick.
    pub(crate) reproduced: BTreeSet<AgentId>,
    pub(crate) current: TickSummary,
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("tick", &self.tick)
            .field("agent_count", &self.agents.len())
            .field("food_count", &self.foods.len())
            .field("random_food", &self.random_food)
            .finish()
    }
}

impl World {
    /// Instantiate an empty world using the supplied configuration.
    pub fn new(config: SimConfig) -> Result<Self, WorldError> {
        config.validate()?;
        let rng = config.seeded_rng();
        let events = EventLog::new(config.event_log_capacity);
        let random_food = config.food.random_spawn;
        Ok(Self {
            config,
            tick: Tick::zero(),
            rng,
            agents: BTreeMap::new(),
            foods: FoodMap::new(),
            next_id: 0,
            lineage: BTreeMap::new(),
            events,
            births: 0,
            deaths: 0,
            total_age_at_death: 0,
            random_food,
            registry: PolicyRegistry::new(),
            default_policy: None,
            next_group: 0,
            groups: BTreeMap::new(),
            reproduced: BTreeSet::new(),
            current: TickSummary::default(),
        })
    }

    #[must_use]
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    #[must_use]
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    #[must_use]
    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.agents.get(&id)
    }

    /// Agents in ascending id order.
    pub fn agents(&self) -> impl Iterator<Item = &Agent> + '_ {
        self.agents.values()
    }

    pub fn foods(&self) -> impl Iterator<Item = &Food> + '_ {
        self.foods.values()
    }

    #[must_use]
    pub fn food_at(&self, x: i32, y: i32) -> Option<&Food> {
        self.foods.get(&(x, y))
    }

    #[must_use]
    pub fn lineage(&self) -> &BTreeMap<AgentId, ParentList> {
        &self.lineage
    }

    #[must_use]
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Cumulative births, including seeded and externally placed agents.
    #[must_use]
    pub const fn births(&self) -> u64 {
        self.births
    }

    #[must_use]
    pub const fn deaths(&self) -> u64 {
        self.deaths
    }

    #[must_use]
    pub const fn random_food_enabled(&self) -> bool {
        self.random_food
    }

    /// Enable or disable passive food spawning.
    pub fn set_random_food_enabled(&mut self, enabled: bool) {
        self.random_food = enabled;
    }

    pub fn registry_mut(&mut self) -> &mut PolicyRegistry {
        &mut self.registry
    }

    /// Registry key used for seeded and placed agents. `None` leaves them unbound.
    pub fn set_default_policy(&mut self, key: Option<u64>) {
        self.default_policy = key;
    }

    /// Attach a policy to an existing agent. Returns `false` if the agent is gone.
    pub fn bind_policy(&mut self, id: AgentId, binding: PolicyBinding) -> bool {
        match self.agents.get_mut(&id) {
            Some(agent) => {
                agent.policy = binding;
                true
            }
            None => false,
        }
    }

    /// Add `count` agents at random cells with randomized traits.
    pub fn seed_random_agents(&mut self, count: usize) -> Vec<AgentId> {
        let (width, height) = (self.width(), self.height());
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            let x = self.rng.random_range(0..width);
            let y = self.rng.random_range(0..height);
            let energy = 100.0 + self.rng.random::<f64>() * 50.0;
            let sex = Sex::random(&mut self.rng);
            let traits = Traits::random(&mut self.rng);
            ids.push(self.register_agent(Position::new(x, y), energy, sex, traits));
        }
        ids
    }

    /// Place food at a cell. Returns `false` (and changes nothing) when the cell
    /// is out of bounds or already holds food or an agent.
    pub fn add_food_at(&mut self, x: i32, y: i32, energy: f64) -> bool {
        if !self.in_bounds(x, y) || !energy.is_finite() || energy <= 0.0 {
            return false;
        }
        let position = Position::new(x, y);
        if self.foods.contains_key(&(x, y)) || self.agents.values().any(|a| a.position == position)
        {
            return false;
        }
        self.foods.insert((x, y), Food { position, energy });
        true
    }

    /// Place an agent with clamped traits. `None` when out of bounds or the
    /// energy is not a positive finite value.
    pub fn add_agent_at(
        &mut self,
        x: i32,
        y: i32,
        energy: f64,
        sex: Sex,
        traits: Traits,
    ) -> Option<AgentId> {
        if !self.in_bounds(x, y) || !energy.is_finite() || energy <= 0.0 {
            return None;
        }
        Some(self.register_agent(Position::new(x, y), energy, sex, traits.clamped()))
    }

    /// Handshake message declaring the grid dimensions.
    #[must_use]
    pub fn config_message(&self) -> ServerMessage {
        ServerMessage::Config {
            w: self.config.width,
            h: self.config.height,
        }
    }

    /// Immutable view of the current state.
    #[must_use]
    pub fn snapshot(&self) -> WorldSnapshot {
        let extended = self.config.physiology.enabled;
        WorldSnapshot {
            tick: self.tick,
            agents: self
                .agents
                .values()
                .map(|agent| AgentView::from_agent(agent, extended))
                .collect(),
            foods: self.foods.values().map(FoodView::from).collect(),
            metrics: self.metrics(),
            lineage: self
                .lineage
                .iter()
                .map(|(id, parents)| (*id, parents.to_vec()))
                .collect(),
            events: self.events.to_vec(),
        }
    }

    #[must_use]
    pub fn metrics(&self) -> Metrics {
        Metrics::collect(
            self.agents.values(),
            self.births,
            self.deaths,
            self.total_age_at_death,
        )
    }

    /// Execute one tick: spawn food, then advance every agent alive at tick start.
    pub fn step(&mut self) -> TickSummary {
        self.tick = self.tick.next();
        self.current = TickSummary {
            tick: self.tick,
            ..TickSummary::default()
        };
        self.reproduced.clear();

        self.current.food_spawned = self.stage_food_spawn();

        let roster: Vec<AgentId> = self.agents.keys().copied().collect();
        for id in roster {
            self.advance_agent(id);
        }

        if self.config.physiology.enabled {
            self.prune_groups();
        }

        self.current.population = self.agents.len();
        self.current
    }

    fn stage_food_spawn(&mut self) -> usize {
        if !self.random_food {
            return 0;
        }
        let attempts = self.config.food_spawn_attempts();
        let (width, height) = (self.width(), self.height());
        let food = self.config.food.clone();
        let occupied: BTreeSet<(i32, i32)> = self
            .agents
            .values()
            .map(|agent| (agent.position.x, agent.position.y))
            .collect();
        let mut spawned = 0;
        for _ in 0..attempts {
            if self.rng.random::<f64>() >= food.spawn_chance {
                continue;
            }
            let x = self.rng.random_range(0..width);
            let y = self.rng.random_range(0..height);
            if self.foods.contains_key(&(x, y)) || occupied.contains(&(x, y)) {
                continue;
            }
            let energy = food.energy_min + self.rng.random::<f64>() * food.energy_spread;
            self.foods.insert(
                (x, y),
                Food {
                    position: Position::new(x, y),
                    energy,
                },
            );
            spawned += 1;
        }
        spawned
    }

    fn advance_agent(&mut self, id: AgentId) {
        if !self.apply_metabolism(id) {
            return;
        }

        let Some(percept) = self.perceive(id) else {
            return;
        };
        let Some(agent) = self.agents.get_mut(&id) else {
            return;
        };
        let before_energy = agent.energy;
        let before_kills = agent.experience.kills;
        let before_repro = agent.experience.repro;
        let action = agent.policy.choose_action(&percept, &mut self.rng);
        let origin = agent.position;

        let destination = self.clamp_position(origin, action);
        if let Some(agent) = self.agents.get_mut(&id) {
            agent.position = destination;
            agent.last_action = action;
        }

        let mut distance_delta = percept.food_distance - percept.food_distance_after[action.index()];
        if self.feed(id) {
            distance_delta += self.config.rewards.eat_bonus;
        }
        self.resolve_attack(id);
        self.resolve_merge(id);
        self.resolve_reproduction(id);
        if self.config.physiology.enabled {
            self.socialize(id);
        }

        let Some(next) = self.perceive(id) else {
            return;
        };
        let weights = &self.config.rewards;
        let extended = self.config.physiology.enabled;
        let Some(agent) = self.agents.get_mut(&id) else {
            return;
        };
        let mut reward = (agent.energy - before_energy) * weights.energy
            + f64::from(agent.experience.kills - before_kills) * weights.kill
            + f64::from(agent.experience.repro - before_repro) * weights.repro
            + distance_delta * weights.food_distance;
        if agent.energy > weights.well_fed_threshold {
            reward += weights.well_fed_bonus;
        }
        if extended {
            let vitals = agent.vitals;
            reward += f64::from(agent.age) * weights.age;
            if agent.group.is_some() {
                reward += weights.group;
            }
            reward -= (vitals.hunger + vitals.fatigue + vitals.stress) * weights.vital_penalty;
        }
        agent
            .policy
            .update(&percept, action, reward, &next, &mut self.rng);
    }

    /// Age the agent and drain energy. Removes it and returns `false` on starvation.
    fn apply_metabolism(&mut self, id: AgentId) -> bool {
        let metabolism = &self.config.metabolism;
        let physiology = &self.config.physiology;
        let Some(agent) = self.agents.get_mut(&id) else {
            return false;
        };
        agent.age = agent.age.saturating_add(1);
        agent.energy -= metabolism.drain;
        agent.ticks_since_meal = agent.ticks_since_meal.saturating_add(1);
        if agent.ticks_since_meal > metabolism.starvation_grace {
            agent.energy -= metabolism.starvation_drain;
        }
        if physiology.enabled {
            let rng = &mut self.rng;
            let mut raise = |value: &mut f64, (base, spread): (f64, f64)| {
                *value = (*value + base + rng.random::<f64>() * spread).min(Vitals::MAX);
            };
            let vitals = &mut agent.vitals;
            raise(&mut vitals.fatigue, physiology.fatigue_rate);
            raise(&mut vitals.hunger, physiology.hunger_rate);
            raise(&mut vitals.stress, physiology.stress_rate);
            let loss = (vitals.fatigue + vitals.hunger + vitals.stress) / physiology.health_divisor;
            vitals.health = (vitals.health - loss).max(0.0);
        }
        if agent.energy > 0.0 {
            return true;
        }
        if let Some(agent) = self.agents.remove(&id) {
            debug!(agent = %id, age = agent.age, "agent starved");
            self.record_death(&agent);
            self.push_event(
                EventKind::Death,
                agent.id,
                agent.sex,
                None,
                None,
                format!("agent {} ({}) starved at age {}", agent.id, agent.sex.as_str(), agent.age),
            );
        }
        false
    }

    pub(crate) fn perceive(&self, id: AgentId) -> Option<Percept> {
        let agent = self.agents.get(&id)?;
        Some(perceive(
            agent,
            self.agents.values(),
            self.foods.values(),
            self.config.width,
            self.config.height,
        ))
    }

    /// Allocate an id, insert the agent and record it in the lineage map.
    fn register_agent(&mut self, position: Position, energy: f64, sex: Sex, traits: Traits) -> AgentId {
        let id = self.allocate_id();
        let mut agent = Agent::new(id, position, energy, sex, traits);
        agent.policy = self.default_binding();
        self.agents.insert(id, agent);
        self.lineage.insert(id, ParentList::new());
        self.births += 1;
        id
    }

    pub(crate) fn allocate_id(&mut self) -> AgentId {
        self.next_id += 1;
        AgentId(self.next_id)
    }

    /// Fresh binding from the default registry entry, or unbound.
    pub(crate) fn default_binding(&mut self) -> PolicyBinding {
        self.default_policy
            .and_then(|key| PolicyBinding::from_registry(&self.registry, &mut self.rng, key))
            .unwrap_or_default()
    }

    pub(crate) fn record_birth(&mut self) {
        self.births += 1;
        self.current.births += 1;
    }

    pub(crate) fn record_death(&mut self, agent: &Agent) {
        self.deaths += 1;
        self.total_age_at_death += u64::from(agent.age);
        self.current.deaths += 1;
    }

    pub(crate) fn push_event(
        &mut self,
        kind: EventKind,
        actor_id: AgentId,
        actor_sex: Sex,
        target: Option<AgentId>,
        value: Option<f64>,
        message: String,
    ) {
        self.events.push(Event {
            kind,
            tick: self.tick,
            actor_id,
            actor_sex,
            target_id: target,
            value,
            message,
        });
    }

    pub(crate) fn allocate_group(&mut self) -> GroupId {
        self.next_group += 1;
        GroupId(self.next_group)
    }

    /// Drop dead members and the groups left without any.
    fn prune_groups(&mut self) {
        let agents = &self.agents;
        self.groups.retain(|_, members| {
            members.retain(|id| agents.contains_key(id));
            !members.is_empty()
        });
    }

    /// Number of social groups with at least one living member.
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Put `id` into `group`, creating the membership set if needed.
    pub(crate) fn join_group(&mut self, id: AgentId, group: GroupId) {
        if let Some(agent) = self.agents.get_mut(&id) {
            agent.group = Some(group);
            self.groups.entry(group).or_default().insert(id);
        }
    }

    fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && x < self.width() && y < self.height()
    }

    fn width(&self) -> i32 {
        self.config.width as i32
    }

    fn height(&self) -> i32 {
        self.config.height as i32
    }

    /// Apply an action's displacement, clamped to the grid.
    pub(crate) fn clamp_position(&self, position: Position, action: Action) -> Position {
        let (dx, dy) = action.offset();
        Position::new(
            (position.x + dx).clamp(0, self.width() - 1),
            (position.y + dy).clamp(0, self.height() - 1),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Policy;
    use rand::RngCore;
    use std::any::Any;

    #[derive(Clone)]
    struct Wander;

    impl Policy for Wander {
        fn kind(&self) -> &'static str {
            "test.wander"
        }

        fn choose_action(&mut self, _: &Percept, rng: &mut dyn RngCore) -> Action {
            Action::new(rng.random_range(0..Action::COUNT)).unwrap_or(Action::STAY)
        }

        fn update(&mut self, _: &Percept, _: Action, _: f64, _: &Percept, _: &mut dyn RngCore) {}

        fn offspring(&self, _: &dyn Policy, _: &mut dyn RngCore) -> Option<Box<dyn Policy>> {
            Some(Box::new(Wander))
        }

        fn absorb(&mut self, _: &dyn Policy, _: f64, _: f64) -> bool {
            true
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

    /// Fixed-move policy that keeps every reward it is shown.
    #[derive(Clone)]
    struct Recorder {
        action: Action,
        rewards: Vec<(f64, Action)>,
    }

    impl Policy for Recorder {
        fn kind(&self) -> &'static str {
            "test.recorder"
        }

        fn choose_action(&mut self, _: &Percept, _: &mut dyn RngCore) -> Action {
            self.action
        }

        fn update(
            &mut self,
            _: &Percept,
            action: Action,
            reward: f64,
            _: &Percept,
            _: &mut dyn RngCore,
        ) {
            self.rewards.push((reward, action));
        }

        fn offspring(&self, _: &dyn Policy, _: &mut dyn RngCore) -> Option<Box<dyn Policy>> {
            None
        }

        fn absorb(&mut self, _: &dyn Policy, _: f64, _: f64) -> bool {
            false
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

    fn place_recorder(world: &mut World, x: i32, y: i32, energy: f64, action: Action) -> AgentId {
        let id = world
            .add_agent_at(x, y, energy, Sex::Male, Traits::default())
            .expect("agent");
        let recorder = Recorder {
            action,
            rewards: Vec::new(),
        };
        assert!(world.bind_policy(id, PolicyBinding::with_policy(Box::new(recorder))));
        id
    }

    fn recorded(world: &World, id: AgentId) -> Vec<(f64, Action)> {
        world
            .agent(id)
            .and_then(|agent| agent.policy.policy())
            .and_then(|policy| policy.as_any().downcast_ref::<Recorder>())
            .map(|recorder| recorder.rewards.clone())
            .expect("recorder")
    }

    fn single_reward(world: &World, id: AgentId) -> f64 {
        let rewards = recorded(world, id);
        assert_eq!(rewards.len(), 1, "{rewards:?}");
        rewards[0].0
    }

    fn quiet_config() -> SimConfig {
        let mut config = SimConfig {
            rng_seed: Some(0x5eed),
            ..SimConfig::default()
        };
        config.food.random_spawn = false;
        config
    }

    fn traits(reproduction: f64) -> Traits {
        Traits {
            reproduction,
            ..Traits::default()
        }
    }

    #[test]
    fn new_world_rejects_invalid_config() {
        let config = SimConfig {
            height: 0,
            ..SimConfig::default()
        };
        assert!(matches!(World::new(config), Err(WorldError::InvalidConfig(_))));
    }

    #[test]
    fn starving_agent_is_removed_after_one_tick() {
        let mut world = World::new(quiet_config()).expect("world");
        let id = world
            .add_agent_at(10, 10, 0.05, Sex::Female, Traits::default())
            .expect("agent");
        let summary = world.step();
        assert!(world.agent(id).is_none());
        assert_eq!(world.deaths(), 1);
        assert_eq!(summary.deaths, 1);
        assert_eq!(summary.population, 0);
        let last = world.events().iter().last().expect("event");
        assert_eq!(last.kind, EventKind::Death);
        assert_eq!(last.actor_id, id);
    }

    #[test]
    fn food_under_agent_is_consumed() {
        let mut world = World::new(quiet_config()).expect("world");
        assert!(world.add_food_at(5, 5, 10.0));
        let id = world
            .add_agent_at(5, 5, 50.0, Sex::Male, Traits::default())
            .expect("agent");
        world.step();
        let agent = world.agent(id).expect("alive");
        assert!((agent.energy - (50.0 - 0.08 + 10.0)).abs() < 1e-9);
        assert_eq!(agent.experience.ate, 1);
        assert_eq!(agent.ticks_since_meal, 0);
        assert!(world.food_at(5, 5).is_none());
    }

    #[test]
    fn placement_rejects_conflicts_and_bounds() {
        let mut world = World::new(quiet_config()).expect("world");
        assert!(!world.add_food_at(-1, 0, 10.0));
        assert!(!world.add_food_at(0, 100, 10.0));
        assert!(world.add_food_at(1, 1, 10.0));
        assert!(!world.add_food_at(1, 1, 10.0));
        world
            .add_agent_at(2, 2, 10.0, Sex::Male, Traits::default())
            .expect("agent");
        assert!(!world.add_food_at(2, 2, 10.0));
        assert!(world.add_agent_at(100, 0, 10.0, Sex::Male, Traits::default()).is_none());
        assert!(world.add_agent_at(0, 0, 0.0, Sex::Male, Traits::default()).is_none());
        assert_eq!(world.agent_count(), 1);
        assert_eq!(world.foods().count(), 1);
    }

    #[test]
    fn placed_agent_traits_are_clamped() {
        let mut world = World::new(quiet_config()).expect("world");
        let id = world
            .add_agent_at(
                3,
                3,
                20.0,
                Sex::Female,
                Traits {
                    aggression: 3.0,
                    speed: 0,
                    strength: 5.0,
                    reproduction: -1.0,
                },
            )
            .expect("agent");
        let agent = world.agent(id).expect("agent");
        assert!((agent.traits.aggression - 1.0).abs() < f64::EPSILON);
        assert_eq!(agent.traits.speed, Traits::SPEED_MIN);
        assert!(agent.traits.reproduction.abs() < f64::EPSILON);
    }

    #[test]
    fn adjacent_pair_produces_exactly_one_child() {
        let mut world = World::new(quiet_config()).expect("world");
        let a = world
            .add_agent_at(0, 0, 100.0, Sex::Male, traits(1.0))
            .expect("male");
        let b = world
            .add_agent_at(1, 0, 100.0, Sex::Female, traits(1.0))
            .expect("female");
        let summary = world.step();
        assert_eq!(summary.births, 1);
        assert_eq!(world.agent_count(), 3);

        let child = world
            .agents()
            .find(|agent| agent.id != a && agent.id != b)
            .expect("child");
        assert_eq!(child.parents.as_slice(), &[a, b]);
        assert_eq!(child.age, 0);
        assert_eq!(child.position, Position::new(0, 0));
        assert_eq!(
            world.lineage().get(&child.id).map(|p| p.to_vec()),
            Some(vec![a, b])
        );
        for parent in [a, b] {
            let parent = world.agent(parent).expect("parent");
            assert!(parent.energy < 100.0 - 0.08);
            assert_eq!(parent.experience.repro, 1);
        }
        assert_eq!(
            world.events().iter().last().map(|e| e.kind),
            Some(EventKind::Birth)
        );
    }

    #[test]
    fn reproduction_requires_energy_above_floor() {
        let mut world = World::new(quiet_config()).expect("world");
        world
            .add_agent_at(0, 0, 15.05, Sex::Male, traits(1.0))
            .expect("male");
        world
            .add_agent_at(0, 1, 100.0, Sex::Female, traits(1.0))
            .expect("female");
        let summary = world.step();
        assert_eq!(summary.births, 0);
        assert_eq!(world.agent_count(), 2);
    }

    #[test]
    fn merge_keeps_survivor_with_discounted_energy() {
        let mut config = quiet_config();
        config.merge.base_chance = 1.0;
        config.combat.threshold = f64::MAX;
        let mut world = World::new(config).expect("world");
        let a = world
            .add_agent_at(4, 4, 50.0, Sex::Male, traits(0.2))
            .expect("a");
        let b = world
            .add_agent_at(4, 5, 30.0, Sex::Male, traits(0.6))
            .expect("b");
        let summary = world.step();
        assert_eq!(summary.merges, 1);
        assert_eq!(world.agent_count(), 1);
        assert!(world.agent(b).is_none());

        let survivor = world.agent(a).expect("survivor");
        // `b` has not been advanced yet when `a` absorbs it.
        let combined = (50.0 - 0.08) + 30.0;
        assert!((survivor.energy - combined * 0.85).abs() < 1e-9);
        let wa = (50.0 - 0.08) / combined;
        let expected_repro = 0.2 * wa + 0.6 * (1.0 - wa);
        assert!((survivor.traits.reproduction - expected_repro).abs() < 1e-9);
        assert_eq!(survivor.experience.merges, 1);
        assert_eq!(survivor.parents.as_slice(), &[b]);
        assert_eq!(world.lineage().get(&a).map(|p| p.to_vec()), Some(vec![b]));
    }

    #[test]
    fn reward_credits_closing_distance_to_food() {
        let mut world = World::new(quiet_config()).expect("world");
        assert!(world.add_food_at(5, 5, 10.0));
        let right = Action::from_offset(1, 0).expect("action");
        let id = place_recorder(&mut world, 2, 5, 30.0, right);
        world.step();
        // distance 3 -> 2, weighted by food_distance (1.5); no energy change
        // after metabolism, below the well-fed threshold.
        assert_eq!(recorded(&world, id)[0].1, right);
        assert!((single_reward(&world, id) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn reward_adds_eat_bonus_when_food_is_reached() {
        let mut world = World::new(quiet_config()).expect("world");
        assert!(world.add_food_at(5, 5, 10.0));
        let right = Action::from_offset(1, 0).expect("action");
        let id = place_recorder(&mut world, 4, 5, 30.0, right);
        world.step();
        // energy +10, then (1 step + eat bonus 2) * 1.5
        assert!((single_reward(&world, id) - (10.0 + 3.0 * 1.5)).abs() < 1e-9);
        assert!(world.food_at(5, 5).is_none());
    }

    #[test]
    fn reward_includes_steal_and_kill_weight() {
        let mut config = quiet_config();
        config.combat.threshold = f64::MIN;
        config.combat.damage_min = 1_000.0;
        config.combat.damage_spread = 0.0;
        config.merge.energy_threshold = f64::MAX;
        let mut world = World::new(config).expect("world");
        let attacker = place_recorder(&mut world, 0, 0, 30.0, Action::STAY);
        let victim = world
            .add_agent_at(1, 0, 30.0, Sex::Male, Traits::default())
            .expect("victim");
        world.step();
        assert!(world.agent(victim).is_none());
        // steal 1000 * 0.1, kill weight 5, well-fed bonus 0.1; no food anywhere.
        assert!((single_reward(&world, attacker) - (100.0 + 5.0 + 0.1)).abs() < 1e-9);
    }

    #[test]
    fn extended_reward_counts_age_group_and_vitals() {
        let mut config = quiet_config();
        config.physiology.enabled = true;
        config.physiology.group_found_chance = 1.0;
        config.physiology.group_energy_bonus = 0.0;
        config.physiology.group_stress_relief = 0.0;
        config.merge.energy_threshold = f64::MAX;
        let mut world = World::new(config).expect("world");
        let id = place_recorder(&mut world, 10, 10, 30.0, Action::STAY);
        world
            .add_agent_at(12, 10, 30.0, Sex::Female, Traits::default())
            .expect("partner");
        world.step();

        let agent = world.agent(id).expect("agent");
        assert!(agent.group.is_some());
        let vitals = agent.vitals;
        let expected =
            1.0 / 1_000.0 + 0.2 - (vitals.hunger + vitals.fatigue + vitals.stress) / 200.0;
        assert!((single_reward(&world, id) - expected).abs() < 1e-9);
    }

    #[test]
    fn merge_requires_combined_energy_above_threshold() {
        let run = |threshold: f64| {
            let mut config = quiet_config();
            config.merge.base_chance = 1.0;
            config.merge.energy_threshold = threshold;
            config.combat.threshold = f64::MAX;
            let mut world = World::new(config).expect("world");
            world
                .add_agent_at(4, 4, 20.0, Sex::Male, Traits::default())
                .expect("a");
            world
                .add_agent_at(4, 5, 20.0, Sex::Male, Traits::default())
                .expect("b");
            let summary = world.step();
            (summary.merges, world.agent_count())
        };
        // combined energy is 39.92 after the first agent's drain
        assert_eq!(run(40.0), (0, 2));
        assert_eq!(run(39.0), (1, 1));
    }

    #[test]
    fn actor_resolves_at_most_one_attack_per_tick() {
        let mut config = quiet_config();
        config.combat.threshold = f64::MIN;
        config.combat.damage_min = 1.0;
        config.combat.damage_spread = 0.0;
        config.combat.energy_steal = 0.0;
        config.merge.energy_threshold = f64::MAX;
        let mut world = World::new(config).expect("world");
        let middle = world
            .add_agent_at(1, 0, 50.0, Sex::Male, Traits::default())
            .expect("middle");
        let left = world
            .add_agent_at(0, 0, 50.0, Sex::Male, Traits::default())
            .expect("left");
        let right = world
            .add_agent_at(2, 0, 50.0, Sex::Male, Traits::default())
            .expect("right");
        world.step();

        assert_eq!(world.agent(middle).expect("middle").experience.attacks, 1);
        let by_middle: Vec<Option<AgentId>> = world
            .events()
            .iter()
            .filter(|event| event.kind == EventKind::Attack && event.actor_id == middle)
            .map(|event| event.target_id)
            .collect();
        assert_eq!(by_middle, vec![Some(left)]);
        assert!((world.agent(left).expect("left").energy - (50.0 - 1.0 - 0.08)).abs() < 1e-9);
        assert!((world.agent(right).expect("right").energy - (50.0 - 0.08)).abs() < 1e-9);
    }

    #[test]
    fn females_never_initiate_attacks() {
        let mut config = quiet_config();
        config.combat.threshold = f64::MIN;
        config.merge.energy_threshold = f64::MAX;
        let mut world = World::new(config).expect("world");
        world
            .add_agent_at(0, 0, 50.0, Sex::Female, Traits::default())
            .expect("a");
        world
            .add_agent_at(1, 0, 50.0, Sex::Female, Traits::default())
            .expect("b");
        world.step();
        assert!(world.agents().all(|agent| agent.experience.attacks == 0));
    }

    #[test]
    fn lethal_attack_removes_defender_and_credits_kill() {
        let mut config = quiet_config();
        config.combat.threshold = f64::MIN;
        config.combat.damage_min = 1_000.0;
        config.merge.energy_threshold = f64::MAX;
        let mut world = World::new(config).expect("world");
        let a = world
            .add_agent_at(0, 0, 50.0, Sex::Male, Traits::default())
            .expect("a");
        let b = world
            .add_agent_at(1, 0, 50.0, Sex::Male, Traits::default())
            .expect("b");
        let summary = world.step();
        assert_eq!(summary.deaths, 1);
        assert!(world.agent(b).is_none());
        let attacker = world.agent(a).expect("attacker");
        assert_eq!(attacker.experience.kills, 1);
        assert_eq!(attacker.experience.attacks, 1);
        let kinds: Vec<EventKind> = world.events().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::Attack, EventKind::Kill]);
    }

    #[test]
    fn population_identity_holds_every_tick() {
        let mut config = SimConfig {
            width: 24,
            height: 24,
            rng_seed: Some(42),
            event_log_capacity: 64,
            ..SimConfig::default()
        };
        config.food.spawn_chance = 0.5;
        let mut world = World::new(config).expect("world");
        let key = world
            .registry_mut()
            .register("test.wander", |_: &mut dyn RngCore| Box::new(Wander) as Box<dyn Policy>);
        world.set_default_policy(Some(key));
        world.seed_random_agents(30);

        let mut seen: BTreeSet<AgentId> = world.agents().map(|a| a.id).collect();
        let mut max_id = seen.iter().max().copied().unwrap_or_default();
        for _ in 0..200 {
            let before = world.agent_count();
            let summary = world.step();
            assert_eq!(
                summary.population,
                before + summary.births - summary.deaths - summary.merges
            );
            assert!(world.agents().all(|agent| agent.energy > 0.0));
            assert!(world.events().len() <= 64);
            for agent in world.agents() {
                if seen.insert(agent.id) {
                    assert!(agent.id > max_id, "id {} reused", agent.id);
                    max_id = agent.id;
                }
            }
        }
    }

    #[test]
    fn physiology_raises_vitals_and_forms_groups() {
        let mut config = quiet_config();
        config.physiology.enabled = true;
        config.physiology.group_found_chance = 1.0;
        config.merge.energy_threshold = f64::MAX;
        let mut world = World::new(config).expect("world");
        let a = world
            .add_agent_at(10, 10, 80.0, Sex::Male, traits(0.0))
            .expect("a");
        let b = world
            .add_agent_at(12, 10, 80.0, Sex::Female, traits(0.0))
            .expect("b");
        world.step();

        let first = world.agent(a).expect("a");
        assert!(first.vitals.fatigue >= 0.1 && first.vitals.fatigue <= 0.3);
        assert!(first.vitals.hunger >= 0.1);
        assert!(first.vitals.health < Vitals::MAX);
        assert!(first.group.is_some());
        assert_eq!(first.group, world.agent(b).and_then(|agent| agent.group));
        assert_eq!(world.group_count(), 1);

        let snapshot = world.snapshot();
        assert!(snapshot.agents.iter().all(|view| view.vitals.is_some()));
    }

    #[test]
    fn snapshot_reports_metrics_and_lineage() {
        let mut world = World::new(quiet_config()).expect("world");
        world.seed_random_agents(3);
        world.add_food_at(0, 0, 12.0);
        let snapshot = world.snapshot();
        assert_eq!(snapshot.agents.len(), world.agent_count());
        assert_eq!(snapshot.metrics.population, world.agent_count());
        assert_eq!(snapshot.metrics.births, 3);
        assert_eq!(snapshot.lineage.len(), 3);
        assert!(snapshot.agents.iter().all(|view| view.vitals.is_none()));
        assert_eq!(
            world.config_message(),
            ServerMessage::Config { w: 100, h: 100 }
        );
    }
}
