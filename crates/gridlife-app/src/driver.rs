//! Periodic tick execution with cooperative cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use gridlife_core::{ServerMessage, TickSummary};
use thiserror::Error;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use crate::SharedWorld;
use crate::publish::{PublishOutcome, SnapshotPublisher};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DriverError {
    /// A previous holder panicked while mutating the world.
    #[error("world lock poisoned")]
    Poisoned,
}

/// Clonable liveness flag shared with whoever may stop the driver.
#[derive(Debug, Clone)]
pub struct DriverHandle {
    running: Arc<AtomicBool>,
}

impl DriverHandle {
    /// Ask the driver to exit before its next tick.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Runs `World::step` on a fixed interval and publishes a snapshot after each tick.
pub struct TickDriver {
    world: SharedWorld,
    publisher: SnapshotPublisher,
    interval: Duration,
    max_ticks: Option<u64>,
    running: Arc<AtomicBool>,
}

impl TickDriver {
    pub fn new(world: SharedWorld, publisher: SnapshotPublisher, interval: Duration) -> Self {
        Self {
            world,
            publisher,
            interval: interval.max(Duration::from_millis(1)),
            max_ticks: None,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Stop on its own after `ticks` ticks.
    #[must_use]
    pub fn with_max_ticks(mut self, ticks: Option<u64>) -> Self {
        self.max_ticks = ticks;
        self
    }

    pub fn handle(&self) -> DriverHandle {
        DriverHandle {
            running: Arc::clone(&self.running),
        }
    }

    pub fn publisher(&self) -> &SnapshotPublisher {
        &self.publisher
    }

    /// Execute one tick atomically and offer its snapshot.
    ///
    /// The snapshot is taken under the same lock as the step; publishing
    /// happens after the lock is released.
    pub fn tick_once(&self) -> Result<(TickSummary, PublishOutcome), DriverError> {
        let (summary, snapshot) = {
            let mut world = self.world.lock().map_err(|_| DriverError::Poisoned)?;
            let summary = world.step();
            (summary, world.snapshot())
        };
        let outcome = self.publisher.offer(ServerMessage::State(snapshot));
        Ok((summary, outcome))
    }

    /// Tick until stopped, the tick limit is reached, or the lock is poisoned.
    /// Returns the number of ticks executed.
    pub async fn run(self) -> Result<u64, DriverError> {
        let mut interval = time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_ms = self.interval.as_millis() as u64, "tick driver started");

        let mut executed = 0_u64;
        loop {
            interval.tick().await;
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            if self.max_ticks.is_some_and(|limit| executed >= limit) {
                break;
            }
            let (summary, outcome) = self.tick_once()?;
            executed += 1;
            debug!(
                tick = summary.tick.0,
                population = summary.population,
                births = summary.births,
                deaths = summary.deaths,
                merges = summary.merges,
                ?outcome,
                "tick complete"
            );
        }
        self.running.store(false, Ordering::SeqCst);
        info!(
            executed,
            dropped = self.publisher.dropped(),
            "tick driver stopped"
        );
        Ok(executed)
    }
}
