//! Broadcast channel carrying [`SchedulerEvent`]s.
//!
//! Publishing never blocks. Receivers that fall behind the ring buffer observe
//! `RecvError::Lagged(n)` and skip the `n` oldest events; events published
//! while nobody is subscribed are dropped.

use super::types::SchedulerEvent;
use tokio::sync::broadcast;

/// Cheaply cloneable handle to the scheduler's event channel.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<SchedulerEvent>,
}

impl EventBus {
    /// Creates a bus with the given ring buffer capacity (at least 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: SchedulerEvent) {
        let _ = self.tx.send(event);
    }

    /// Receiver for events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
