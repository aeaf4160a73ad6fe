//! Interaction rules resolved after an agent moves: feeding, combat, merging,
//! reproduction and (extended model) social grouping.
//!
//! Candidates are always visited in ascending id order and each rule resolves
//! at most once per actor per tick.

use rand::Rng;
use tracing::debug;

use crate::{Agent, AgentId, EventKind, ParentList, Sex, Traits, Vitals, World, gaussian};

impl World {
    /// Consume food on the agent's cell. Returns `true` when it ate.
    pub(crate) fn feed(&mut self, id: AgentId) -> bool {
        let Some(agent) = self.agents.get_mut(&id) else {
            return false;
        };
        let cell = (agent.position.x, agent.position.y);
        let Some(food) = self.foods.remove(&cell) else {
            return false;
        };
        agent.energy += food.energy;
        agent.experience.ate += 1;
        agent.ticks_since_meal = 0;
        agent.vitals.hunger = 0.0;
        true
    }

    /// Agents adjacent to `actor` with the same (or opposite) sex, in id order.
    fn adjacent_ids(&self, actor: &Agent, same_sex: bool) -> Vec<AgentId> {
        self.agents
            .values()
            .filter(|other| other.id != actor.id)
            .filter(|other| (other.sex == actor.sex) == same_sex)
            .filter(|other| other.position.manhattan(actor.position) <= 1)
            .map(|other| other.id)
            .collect()
    }

    /// Males attack one adjacent male rival; females never initiate.
    pub(crate) fn resolve_attack(&mut self, id: AgentId) {
        let Some(actor) = self.agents.get(&id) else {
            return;
        };
        if actor.sex == Sex::Female {
            return;
        }
        let combat = self.config.combat.clone();
        for target in self.adjacent_ids(actor, true) {
            let (Some(attacker), Some(defender)) = (self.agents.get(&id), self.agents.get(&target))
            else {
                continue;
            };
            let chance = (attacker.traits.aggression - defender.traits.aggression)
                + (attacker.traits.strength - defender.traits.strength) / 10.0
                + gaussian(&mut self.rng) * combat.noise;
            if chance <= combat.threshold {
                continue;
            }

            let damage = combat.damage_min + self.rng.random::<f64>() * combat.damage_spread;
            let Some(defender) = self.agents.get_mut(&target) else {
                continue;
            };
            defender.energy -= damage;
            let killed = defender.energy <= 0.0;
            let Some(attacker) = self.agents.get_mut(&id) else {
                return;
            };
            attacker.energy += damage * combat.energy_steal;
            attacker.experience.attacks += 1;
            let attacker_sex = attacker.sex;
            self.push_event(
                EventKind::Attack,
                id,
                attacker_sex,
                Some(target),
                Some(damage),
                format!("agent {id} attacked {target} for {damage:.1}"),
            );

            if killed {
                if let Some(victim) = self.agents.remove(&target) {
                    self.record_death(&victim);
                }
                if let Some(attacker) = self.agents.get_mut(&id) {
                    attacker.experience.kills += 1;
                }
                debug!(attacker = %id, victim = %target, "agent killed");
                self.push_event(
                    EventKind::Kill,
                    id,
                    attacker_sex,
                    Some(target),
                    None,
                    format!("agent {id} killed {target}"),
                );
            }
            return;
        }
    }

    /// Fuse `id` with one adjacent same-sex agent; `id` survives.
    pub(crate) fn resolve_merge(&mut self, id: AgentId) {
        let Some(actor) = self.agents.get(&id) else {
            return;
        };
        let merge = self.config.merge.clone();
        for target in self.adjacent_ids(actor, true) {
            let (Some(survivor), Some(absorbed)) = (self.agents.get(&id), self.agents.get(&target))
            else {
                continue;
            };
            let combined = survivor.energy + absorbed.energy;
            if combined <= merge.energy_threshold {
                continue;
            }
            let chance = merge.base_chance
                + merge.trait_scale
                    * (survivor.traits.reproduction + absorbed.traits.reproduction)
                    / 2.0;
            if self.rng.random::<f64>() >= chance {
                continue;
            }

            let Some(absorbed) = self.agents.remove(&target) else {
                continue;
            };
            let Some(survivor) = self.agents.get_mut(&id) else {
                return;
            };
            let own_weight = survivor.energy / combined;
            let other_weight = absorbed.energy / combined;
            survivor.energy = combined * merge.cost_factor;
            survivor.traits =
                blend_traits(&survivor.traits, &absorbed.traits, own_weight, other_weight);
            survivor.experience.absorb(&absorbed.experience);
            survivor.experience.merges += 1;
            survivor
                .policy
                .absorb(&absorbed.policy, own_weight, other_weight);
            survivor.parents.push(target);
            let (survivor_sex, survivor_energy) = (survivor.sex, survivor.energy);

            self.lineage.entry(id).or_default().push(target);
            self.current.merges += 1;
            debug!(survivor = %id, absorbed = %target, "agents merged");
            self.push_event(
                EventKind::Merge,
                id,
                survivor_sex,
                Some(target),
                Some(survivor_energy),
                format!("agent {id} merged with {target}"),
            );
            return;
        }
    }

    /// Produce at most one child with an adjacent opposite-sex partner.
    pub(crate) fn resolve_reproduction(&mut self, id: AgentId) {
        if self.reproduced.contains(&id) {
            return;
        }
        let Some(actor) = self.agents.get(&id) else {
            return;
        };
        let repro = self.config.reproduction.clone();
        for partner_id in self.adjacent_ids(actor, false) {
            if self.reproduced.contains(&partner_id) {
                continue;
            }
            let (Some(first), Some(second)) = (self.agents.get(&id), self.agents.get(&partner_id))
            else {
                continue;
            };
            if first.energy <= repro.energy_floor || second.energy <= repro.energy_floor {
                continue;
            }
            let chance = (first.traits.reproduction + second.traits.reproduction) / 2.0;
            if self.rng.random::<f64>() >= chance {
                continue;
            }

            let mut mutate = |mean: f64, sigma: f64| mean + gaussian(&mut self.rng) * sigma;
            let traits = Traits {
                aggression: mutate(
                    (first.traits.aggression + second.traits.aggression) / 2.0,
                    repro.aggression_sigma,
                ),
                speed: mutate(
                    (f64::from(first.traits.speed) + f64::from(second.traits.speed)) / 2.0,
                    repro.speed_sigma,
                )
                .round()
                .clamp(f64::from(Traits::SPEED_MIN), f64::from(Traits::SPEED_MAX))
                    as u8,
                strength: mutate(
                    (first.traits.strength + second.traits.strength) / 2.0,
                    repro.strength_sigma,
                ),
                reproduction: mutate(
                    (first.traits.reproduction + second.traits.reproduction) / 2.0,
                    repro.reproduction_sigma,
                ),
            }
            .clamped();
            let energy = (first.energy + second.energy) * repro.child_energy_fraction;
            let position = first.position;
            let group = first.group;
            let mut policy = first.policy.offspring(&second.policy, &mut self.rng);
            if !policy.is_bound() {
                policy = self.default_binding();
            }

            let child_id = self.allocate_id();
            let sex = Sex::random(&mut self.rng);
            let mut child = Agent::new(child_id, position, energy, sex, traits);
            child.policy = policy;
            child.vitals = Vitals::default();
            child.parents = ParentList::from_slice(&[id, partner_id]);
            let child_sex = child.sex;
            self.agents.insert(child_id, child);
            self.lineage.insert(child_id, ParentList::from_slice(&[id, partner_id]));
            if self.config.physiology.enabled
                && let Some(group) = group
            {
                self.join_group(child_id, group);
            }

            for parent in [id, partner_id] {
                if let Some(agent) = self.agents.get_mut(&parent) {
                    agent.energy *= repro.parent_energy_factor;
                    agent.experience.repro += 1;
                }
                self.reproduced.insert(parent);
            }
            self.record_birth();
            debug!(child = %child_id, first = %id, second = %partner_id, "agent born");
            self.push_event(
                EventKind::Birth,
                child_id,
                child_sex,
                None,
                Some(energy),
                format!("agent {child_id} born to {id} and {partner_id}"),
            );
            return;
        }
    }

    /// Extended model: pick one neighbour within the social radius and interact.
    pub(crate) fn socialize(&mut self, id: AgentId) {
        let Some(actor) = self.agents.get(&id) else {
            return;
        };
        let physiology = self.config.physiology.clone();
        let candidates: Vec<AgentId> = self
            .agents
            .values()
            .filter(|other| other.id != id)
            .filter(|other| other.position.euclidean(actor.position) <= physiology.social_radius)
            .map(|other| other.id)
            .collect();
        if candidates.is_empty() {
            return;
        }
        let partner_id = candidates[self.rng.random_range(0..candidates.len())];
        let own_group = actor.group;
        let Some(partner_group) = self.agents.get(&partner_id).map(|p| p.group) else {
            return;
        };

        match (own_group, partner_group) {
            (None, None) => {
                if self.rng.random::<f64>() < physiology.group_found_chance {
                    let group = self.allocate_group();
                    self.join_group(id, group);
                    self.join_group(partner_id, group);
                    let actor_sex = self.agents.get(&id).map_or(Sex::Male, |a| a.sex);
                    self.push_event(
                        EventKind::GroupFormed,
                        id,
                        actor_sex,
                        Some(partner_id),
                        None,
                        format!("agent {id} formed group {} with {partner_id}", group.0),
                    );
                }
            }
            (None, Some(group)) => {
                if self.rng.random::<f64>() < physiology.group_join_chance {
                    self.join_group(id, group);
                }
            }
            (Some(group), None) => {
                if self.rng.random::<f64>() < physiology.group_join_chance {
                    self.join_group(partner_id, group);
                }
            }
            (Some(a), Some(b)) if a == b => {
                let Some(mut partner) = self.agents.remove(&partner_id) else {
                    return;
                };
                if let Some(actor) = self.agents.get_mut(&id) {
                    for member in [&mut *actor, &mut partner] {
                        member.energy += physiology.group_energy_bonus;
                        member.vitals.stress =
                            (member.vitals.stress - physiology.group_stress_relief).max(0.0);
                    }
                    actor
                        .policy
                        .share_with(&mut partner.policy, physiology.share_discount);
                }
                self.agents.insert(partner_id, partner);
            }
            (Some(_), Some(_)) => {}
        }
    }
}

/// Energy-weighted blend of two trait sets.
fn blend_traits(a: &Traits, b: &Traits, wa: f64, wb: f64) -> Traits {
    Traits {
        aggression: a.aggression * wa + b.aggression * wb,
        speed: (f64::from(a.speed) * wa + f64::from(b.speed) * wb)
            .round()
            .clamp(f64::from(Traits::SPEED_MIN), f64::from(Traits::SPEED_MAX)) as u8,
        strength: a.strength * wa + b.strength * wb,
        reproduction: a.reproduction * wa + b.reproduction * wb,
    }
    .clamped()
}
