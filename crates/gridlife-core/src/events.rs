//! Bounded, append-only diagnostic event log.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::{AgentId, Sex, Tick};

/// Category of a recorded event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Death,
    Attack,
    Kill,
    Merge,
    Birth,
    GroupFormed,
}

/// One diagnostic entry. Not authoritative state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub tick: Tick,
    pub actor_id: AgentId,
    pub actor_sex: Sex,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_id: Option<AgentId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    pub message: String,
}

/// Ring of the most recent events; the oldest entry is evicted first.
#[derive(Debug, Clone)]
pub struct EventLog {
    capacity: usize,
    entries: VecDeque<Event>,
}

impl EventLog {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity.min(1_024)),
        }
    }

    pub fn push(&mut self, event: Event) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(event);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Event> + '_ {
        self.entries.iter()
    }

    /// Owned copy of the retained events, oldest first.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Event> {
        self.entries.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(tick: u64) -> Event {
        Event {
            kind: EventKind::Death,
            tick: Tick(tick),
            actor_id: AgentId(tick),
            actor_sex: Sex::Male,
            target_id: None,
            value: None,
            message: String::new(),
        }
    }

    #[test]
    fn log_never_exceeds_capacity() {
        let mut log = EventLog::new(3);
        for tick in 0..10 {
            log.push(event(tick));
        }
        assert_eq!(log.len(), 3);
        let ticks: Vec<u64> = log.iter().map(|e| e.tick.0).collect();
        assert_eq!(ticks, vec![7, 8, 9]);
    }

    #[test]
    fn event_serializes_type_tag() {
        let json = serde_json::to_value(event(1)).expect("json");
        assert_eq!(json["type"], "death");
        assert!(json.get("target_id").is_none());
    }
}
