//! Shared application plumbing for the gridlife runtime.

use std::sync::{Arc, Mutex};

use gridlife_core::World;

/// The single serialization boundary around world state.
pub type SharedWorld = Arc<Mutex<World>>;

pub mod command;
pub mod config;
pub mod control;
pub mod driver;
pub mod publish;

pub use command::{Ack, ClientCommand};
pub use config::{ConfigLoadError, load_config};
pub use control::{ControlError, ControlHandle};
pub use driver::{DriverError, DriverHandle, TickDriver};
pub use publish::{PublishOutcome, SnapshotPublisher, SnapshotReceiver, snapshot_channel};

/// Wrap a world in the shared lock.
#[must_use]
pub fn share(world: World) -> SharedWorld {
    Arc::new(Mutex::new(world))
}
