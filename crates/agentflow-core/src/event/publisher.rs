//! Event publishing port.

use agentflow_types::error::EventError;
use agentflow_types::event::{EventEnvelope, WorkflowEvent};

/// Outbound side of the notification collaborator.
///
/// The registry and scheduler publish every lifecycle transition through this
/// trait. A failed publish is propagated to the caller as a transport error;
/// the core never swallows it.
pub trait EventPublisher: Send + Sync {
    /// Publish one event and return the envelope it was sent in.
    fn publish(
        &self,
        event: WorkflowEvent,
    ) -> impl std::future::Future<Output = Result<EventEnvelope, EventError>> + Send;
}

#[cfg(test)]
pub(crate) mod recording {
    //! Publisher that keeps every event in memory for assertions.

    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    #[derive(Default)]
    pub(crate) struct RecordingPublisher {
        events: Mutex<Vec<WorkflowEvent>>,
        pub(crate) fail: AtomicBool,
    }

    impl RecordingPublisher {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn events(&self) -> Vec<WorkflowEvent> {
            self.events.lock().unwrap().clone()
        }

        pub(crate) fn event_types(&self) -> Vec<&'static str> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .map(|e| e.event_type())
                .collect()
        }

        pub(crate) fn count(&self, event_type: &str) -> usize {
            self.event_types()
                .into_iter()
                .filter(|t| *t == event_type)
                .count()
        }

        pub(crate) fn clear(&self) {
            self.events.lock().unwrap().clear();
        }
    }

    impl EventPublisher for RecordingPublisher {
        async fn publish(&self, event: WorkflowEvent) -> Result<EventEnvelope, EventError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(EventError::Closed);
            }
            self.events.lock().unwrap().push(event.clone());
            Ok(EventEnvelope::new(event))
        }
    }
}
