//! In-process safety event bus

use conductor_guard::{EventSink, SafetyEvent};
use tokio::sync::broadcast;

/// Fans safety events out to every subscriber.
///
/// Events published with no subscriber attached are dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SafetyEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SafetyEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl EventSink for EventBus {
    fn broadcast(&self, event: SafetyEvent) {
        let name = event.name();
        match self.tx.send(event) {
            Ok(receivers) => tracing::debug!(event = name, receivers, "safety event published"),
            Err(_) => tracing::trace!(event = name, "safety event dropped, no subscribers"),
        }
    }
}
