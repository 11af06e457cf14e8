//! Background task that persists every bus event into an `EventStore`.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::bus::EventBus;
use crate::repository::event::EventStore;

/// Subscribe to `bus` and append each envelope to `store` until `cancel`
/// fires or the bus closes. Append failures are logged and skipped.
pub fn spawn_recorder<S>(bus: &EventBus, store: Arc<S>, cancel: CancellationToken) -> JoinHandle<()>
where
    S: EventStore + 'static,
{
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = rx.recv() => match received {
                    Ok(envelope) => {
                        if let Err(e) = store.append(&envelope).await {
                            warn!(
                                event_id = %envelope.id,
                                event_type = %envelope.event_type,
                                error = %e,
                                "failed to record event"
                            );
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "event recorder lagged; events were not recorded");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        debug!("event recorder stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use agentflow_types::error::RepositoryError;
    use agentflow_types::event::{EventEnvelope, EventQuery, WorkflowEvent};
    use tokio::sync::Mutex;
    use uuid::Uuid;

    use crate::event::publisher::EventPublisher;

    #[derive(Default)]
    struct VecStore {
        events: Mutex<Vec<EventEnvelope>>,
    }

    impl EventStore for VecStore {
        async fn append(&self, event: &EventEnvelope) -> Result<(), RepositoryError> {
            self.events.lock().await.push(event.clone());
            Ok(())
        }

        async fn history(&self, query: &EventQuery) -> Result<Vec<EventEnvelope>, RepositoryError> {
            let events = self.events.lock().await;
            Ok(events
                .iter()
                .rev()
                .filter(|e| query.correlation_id.is_none_or(|c| e.correlation_id == c))
                .take(query.limit as usize)
                .cloned()
                .collect())
        }
    }

    #[tokio::test]
    async fn recorder_appends_published_events() {
        let bus = EventBus::new(16);
        let store = Arc::new(VecStore::default());
        let cancel = CancellationToken::new();
        let handle = spawn_recorder(&bus, store.clone(), cancel.clone());

        let workflow_id = Uuid::now_v7();
        bus.publish(WorkflowEvent::WorkflowCancelled {
            workflow_id,
            workflow_type: "etl".to_string(),
            tenant_id: "t1".to_string(),
        })
        .await
        .unwrap();

        // Dropping the last sender closes the channel after the buffered
        // event is drained, which ends the loop.
        drop(bus);
        handle.await.unwrap();

        let recorded = store
            .history(&EventQuery {
                correlation_id: Some(workflow_id),
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].event_type, "workflow.cancelled");
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn recorder_stops_on_cancel() {
        let bus = EventBus::new(16);
        let store = Arc::new(VecStore::default());
        let cancel = CancellationToken::new();
        let handle = spawn_recorder(&bus, store.clone(), cancel.clone());

        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(bus.receiver_count(), 0);
    }
}
