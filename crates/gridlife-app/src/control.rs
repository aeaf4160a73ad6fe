use std::io::{self, BufRead};
use std::sync::{MutexGuard, PoisonError};

use gridlife_core::{AgentId, ServerMessage, World, WorldSnapshot};
use thiserror::Error;
use tracing::debug;

use crate::SharedWorld;
use crate::command::{Ack, ClientCommand, cell, requested_traits};

/// Errors produced while servicing external control requests.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("failed to lock world state")]
    Lock,
    #[error("malformed command: {0}")]
    Malformed(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl ControlError {
    fn serialization(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<PoisonError<MutexGuard<'_, World>>> for ControlError {
    fn from(_: PoisonError<MutexGuard<'_, World>>) -> Self {
        ControlError::Lock
    }
}

/// What a control request did to the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Food(bool),
    Agent(Option<AgentId>),
    RandomFood(bool),
}

/// Shared handle used by I/O tasks to reach the running world.
///
/// Every operation takes the same lock as the tick driver, so a request
/// waits for an in-flight tick to finish rather than racing it.
#[derive(Clone)]
pub struct ControlHandle {
    shared_world: SharedWorld,
}

impl ControlHandle {
    pub fn new(shared_world: SharedWorld) -> Self {
        Self { shared_world }
    }

    pub fn shared_world(&self) -> SharedWorld {
        self.shared_world.clone()
    }

    fn lock_world(&self) -> Result<MutexGuard<'_, World>, ControlError> {
        self.shared_world.lock().map_err(|err| err.into())
    }

    /// Place food; `Ok(false)` when the request was ignored.
    pub fn add_food_at(&self, x: i32, y: i32, energy: f64) -> Result<bool, ControlError> {
        let mut world = self.lock_world()?;
        Ok(world.add_food_at(x, y, energy))
    }

    pub fn set_random_food_enabled(&self, enabled: bool) -> Result<(), ControlError> {
        let mut world = self.lock_world()?;
        world.set_random_food_enabled(enabled);
        Ok(())
    }

    pub fn config_message(&self) -> Result<ServerMessage, ControlError> {
        Ok(self.lock_world()?.config_message())
    }

    pub fn snapshot(&self) -> Result<WorldSnapshot, ControlError> {
        Ok(self.lock_world()?.snapshot())
    }

    /// Handshake line written before any state message.
    pub fn handshake_json(&self) -> Result<String, ControlError> {
        let message = self.config_message()?;
        serde_json::to_string(&message).map_err(ControlError::serialization)
    }

    /// Apply a parsed command under the world lock.
    pub fn apply(&self, command: &ClientCommand) -> Result<Applied, ControlError> {
        let mut world = self.lock_world()?;
        let applied = match *command {
            ClientCommand::AddFood { x, y, energy } => {
                Applied::Food(world.add_food_at(cell(x), cell(y), energy))
            }
            ClientCommand::AddAgent {
                x,
                y,
                energy,
                sex,
                agg,
                spd,
                strength,
                repro,
            } => Applied::Agent(world.add_agent_at(
                cell(x),
                cell(y),
                energy,
                sex,
                requested_traits(agg, spd, strength, repro),
            )),
            ClientCommand::ToggleRandomFood { enabled } => {
                world.set_random_food_enabled(enabled);
                Applied::RandomFood(enabled)
            }
        };
        Ok(applied)
    }

    /// Service one raw input line. Malformed input is acknowledged and
    /// ignored; only a poisoned world lock is reported as an error.
    pub fn handle_line(&self, line: &str) -> Result<Ack, ControlError> {
        match ClientCommand::parse(line).map_err(|err| ControlError::Malformed(err.to_string())) {
            Ok(command) => {
                let applied = self.apply(&command)?;
                debug!(?command, ?applied, "applied control command");
            }
            Err(err) => debug!(%err, "ignoring client line"),
        }
        Ok(Ack::RECEIVED)
    }

    /// Serve newline-delimited commands until EOF, passing one ack line per
    /// non-blank input line to `emit`. Lines that are not UTF-8 are
    /// acknowledged and skipped. Returns the number of acks written.
    pub fn serve_lines<R: BufRead>(
        &self,
        mut input: R,
        mut emit: impl FnMut(&str) -> io::Result<()>,
    ) -> Result<u64, ControlError> {
        let ack = serde_json::to_string(&Ack::RECEIVED).map_err(ControlError::serialization)?;
        let mut buf = Vec::new();
        let mut served = 0;
        loop {
            buf.clear();
            if input.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            match std::str::from_utf8(&buf) {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => {
                    self.handle_line(line)?;
                }
                Err(err) => debug!(%err, "ignoring non-UTF-8 client line"),
            }
            emit(&ack)?;
            served += 1;
        }
        Ok(served)
    }
}
