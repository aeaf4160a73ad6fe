//! JSON-lines client commands and their acknowledgement.

use gridlife_core::{Sex, Traits};
use serde::{Deserialize, Serialize};

/// A control request sent by a client, tagged by `type`.
///
/// Coordinates arrive as JSON numbers and are truncated toward zero, so
/// `3.9` addresses column 3.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    AddFood {
        x: f64,
        y: f64,
        #[serde(default = "default_food_energy")]
        energy: f64,
    },
    AddAgent {
        x: f64,
        y: f64,
        #[serde(default = "default_agent_energy")]
        energy: f64,
        #[serde(default = "default_sex")]
        sex: Sex,
        #[serde(default = "default_aggression")]
        agg: f64,
        #[serde(default = "default_speed")]
        spd: f64,
        #[serde(default = "default_strength")]
        strength: f64,
        #[serde(default = "default_reproduction")]
        repro: f64,
    },
    ToggleRandomFood {
        enabled: bool,
    },
}

fn default_food_energy() -> f64 {
    12.0
}

fn default_agent_energy() -> f64 {
    40.0
}

fn default_sex() -> Sex {
    Sex::Male
}

fn default_aggression() -> f64 {
    0.5
}

fn default_speed() -> f64 {
    1.0
}

fn default_strength() -> f64 {
    5.0
}

fn default_reproduction() -> f64 {
    0.05
}

impl ClientCommand {
    /// Parse one line of client input.
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim())
    }
}

/// Traits requested by an `add_agent` command, before clamping.
pub(crate) fn requested_traits(agg: f64, spd: f64, strength: f64, repro: f64) -> Traits {
    let speed = if spd.is_finite() {
        spd.round()
            .clamp(f64::from(Traits::SPEED_MIN), f64::from(Traits::SPEED_MAX)) as u8
    } else {
        Traits::SPEED_MIN
    };
    Traits {
        aggression: agg,
        speed,
        strength,
        reproduction: repro,
    }
    .clamped()
}

/// Saturating float-to-cell conversion; non-finite input maps out of range.
pub(crate) fn cell(coordinate: f64) -> i32 {
    if coordinate.is_finite() {
        coordinate.trunc() as i32
    } else {
        -1
    }
}

/// Reply written for every received line, valid or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Ack {
    pub ok: &'static str,
}

impl Ack {
    pub const RECEIVED: Ack = Ack { ok: "received" };
}
