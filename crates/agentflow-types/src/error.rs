use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by workflow registry and step scheduler operations.
///
/// Step-level failures are never errors: they are recorded as data on the
/// step and rolled up by completion aggregation.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The operation is not valid for the entity's current status.
    #[error("state conflict: {0}")]
    StateConflict(String),

    /// An unknown workflow or step ID, or a dependency with no matching step.
    #[error("missing reference: {0}")]
    MissingReference(String),

    #[error("step {step_id} has reached maximum retry count ({max_retries})")]
    RetryExhausted { step_id: Uuid, max_retries: u32 },

    #[error("cycle detected: {0}")]
    CycleDetected(String),

    /// A request field failed validation (empty name, empty tenant, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("event transport error: {0}")]
    Transport(String),
}

/// Errors from repository operations (used by trait definitions in agentflow-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors from publishing to, or recording, the event stream.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("event channel closed")]
    Closed,

    #[error("event store error: {0}")]
    Store(String),
}

impl From<RepositoryError> for WorkflowError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound => {
                WorkflowError::MissingReference("record not found in store".to_string())
            }
            other => WorkflowError::Storage(other.to_string()),
        }
    }
}

impl From<EventError> for WorkflowError {
    fn from(e: EventError) -> Self {
        WorkflowError::Transport(e.to_string())
    }
}
