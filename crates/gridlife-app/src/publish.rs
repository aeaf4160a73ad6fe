//! Bounded snapshot channel between the tick driver and the output writer.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossfire::mpmc;
use crossfire::{MAsyncTx, MRx, TrySendError, detect_backoff_cfg};
use gridlife_core::ServerMessage;
use tracing::debug;

pub type SnapshotSender = MAsyncTx<Arc<ServerMessage>>;
pub type SnapshotReceiver = MRx<Arc<ServerMessage>>;

/// Result of offering one message to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Delivered,
    /// The queue was full; the message was discarded.
    Dropped,
    /// Every receiver is gone.
    Closed,
}

/// Producer side of the snapshot channel. Never blocks.
pub struct SnapshotPublisher {
    sender: SnapshotSender,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

/// Create a publisher and its receiver. A zero capacity is raised to one.
pub fn snapshot_channel(capacity: usize) -> (SnapshotPublisher, SnapshotReceiver) {
    detect_backoff_cfg();
    let (sender, receiver) = mpmc::bounded_tx_async_rx_blocking(capacity.max(1));
    let publisher = SnapshotPublisher {
        sender,
        delivered: AtomicU64::new(0),
        dropped: AtomicU64::new(0),
    };
    (publisher, receiver)
}

impl SnapshotPublisher {
    pub fn offer(&self, message: ServerMessage) -> PublishOutcome {
        match self.sender.try_send(Arc::new(message)) {
            Ok(()) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                PublishOutcome::Delivered
            }
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(dropped, "snapshot queue full; dropping snapshot");
                PublishOutcome::Dropped
            }
            Err(TrySendError::Disconnected(_)) => PublishOutcome::Closed,
        }
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
