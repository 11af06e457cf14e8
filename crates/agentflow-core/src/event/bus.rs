//! Broadcast event bus for distributing workflow lifecycle events.
//!
//! Built on `tokio::sync::broadcast`, the `EventBus` supports multiple
//! concurrent subscribers. Publishing with no active subscribers is a no-op.

use agentflow_types::error::EventError;
use agentflow_types::event::{EventEnvelope, WorkflowEvent};
use tokio::sync::broadcast;

use super::publisher::EventPublisher;

/// Multi-consumer event bus for workflow and step lifecycle events.
///
/// Wraps a `tokio::sync::broadcast` channel. Cloning the bus clones the
/// sender, allowing multiple producers and consumers.
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    /// Create a new event bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Create a new subscriber that will receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    /// Send an already-wrapped event to all current subscribers.
    ///
    /// If there are no subscribers, the event is silently dropped.
    pub fn send(&self, envelope: EventEnvelope) {
        let _ = self.sender.send(envelope);
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl EventPublisher for EventBus {
    async fn publish(&self, event: WorkflowEvent) -> Result<EventEnvelope, EventError> {
        let envelope = EventEnvelope::new(event);
        tracing::trace!(
            event_id = %envelope.id,
            event_type = %envelope.event_type,
            "publishing event"
        );
        self.send(envelope.clone());
        Ok(envelope)
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receiver_count", &self.sender.receiver_count())
            .finish()
    }
}
