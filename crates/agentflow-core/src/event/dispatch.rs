//! Event-type routed handler dispatch on top of the broadcast bus.
//!
//! Handlers register for one or more event-type tags (`task.created`,
//! `workflow.completed`, ...). A listener task pulls envelopes off an
//! `EventBus` subscription and invokes every handler registered for the
//! envelope's type. A failing handler is logged and does not stop the loop.

use std::future::Future;
use std::sync::Arc;

use agentflow_types::event::EventEnvelope;
use dashmap::DashMap;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::bus::EventBus;

/// Async callback invoked with each matching envelope.
pub type EventHandler =
    Arc<dyn Fn(EventEnvelope) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Box an async closure into an `EventHandler`.
pub fn handler_fn<F, Fut>(f: F) -> EventHandler
where
    F: Fn(EventEnvelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |envelope| f(envelope).boxed())
}

/// Registry of handlers keyed by event-type tag.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: DashMap<String, Vec<EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for each of `event_types`.
    pub fn subscribe(&self, event_types: &[&str], handler: EventHandler) {
        for event_type in event_types {
            self.handlers
                .entry((*event_type).to_string())
                .or_default()
                .push(handler.clone());
        }
    }

    /// Event types with at least one handler, sorted.
    pub fn subscribed_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.iter().map(|r| r.key().clone()).collect();
        types.sort();
        types
    }

    /// Invoke every handler registered for the envelope's type.
    ///
    /// Returns how many handlers ran. The handler list is cloned out of the
    /// map first so no `DashMap` guard is held across `.await`.
    pub async fn dispatch(&self, envelope: &EventEnvelope) -> usize {
        let handlers: Vec<EventHandler> = match self.handlers.get(&envelope.event_type) {
            Some(entry) => entry.value().clone(),
            None => return 0,
        };

        for handler in &handlers {
            if let Err(e) = handler(envelope.clone()).await {
                warn!(
                    event_id = %envelope.id,
                    event_type = %envelope.event_type,
                    error = %e,
                    "event handler failed"
                );
            }
        }
        handlers.len()
    }

    /// Spawn the listener loop on a fresh subscription to `bus`.
    ///
    /// The loop ends when `cancel` fires or the bus is dropped.
    pub fn spawn(self: Arc<Self>, bus: &EventBus, cancel: CancellationToken) -> JoinHandle<()> {
        let mut rx = bus.subscribe();
        tokio::spawn(async move {
            if self.handlers.is_empty() {
                warn!("event dispatcher started with no subscriptions");
            }
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = rx.recv() => match received {
                        Ok(envelope) => {
                            self.dispatch(&envelope).await;
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "event dispatcher lagged behind the bus");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            debug!("event dispatcher stopped");
        })
    }
}
