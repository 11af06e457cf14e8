//! Event store trait definition.
//!
//! Durable history of published lifecycle events, queried by type,
//! correlation ID, and time range.

use agentflow_types::error::RepositoryError;
use agentflow_types::event::{EventEnvelope, EventQuery};

pub trait EventStore: Send + Sync {
    /// Append one event. Appending an ID twice is a `Conflict`.
    fn append(
        &self,
        event: &EventEnvelope,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Events matching `query`, newest first.
    fn history(
        &self,
        query: &EventQuery,
    ) -> impl std::future::Future<Output = Result<Vec<EventEnvelope>, RepositoryError>> + Send;
}
