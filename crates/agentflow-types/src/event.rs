//! Lifecycle event types for the agentflow event bus.
//!
//! `WorkflowEvent` is the payload published by the registry and scheduler.
//! Every event travels inside an `EventEnvelope` that adds an ID, timestamp,
//! and correlation ID (the owning workflow). All variants are Clone + Send +
//! Sync for use with tokio broadcast channels, and serialize to JSON with a
//! dotted `type` tag (`workflow.created`, `task.created`, ...).

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::workflow::StepStatus;

pub const WORKFLOW_CREATED: &str = "workflow.created";
pub const WORKFLOW_STARTED: &str = "workflow.started";
pub const WORKFLOW_COMPLETED: &str = "workflow.completed";
pub const WORKFLOW_FAILED: &str = "workflow.failed";
pub const WORKFLOW_CANCELLED: &str = "workflow.cancelled";
pub const WORKFLOW_STEP_COMPLETED: &str = "workflow.step.completed";
pub const TASK_CREATED: &str = "task.created";

/// Every event-type tag the core produces.
pub const ALL_EVENT_TYPES: &[&str] = &[
    WORKFLOW_CREATED,
    WORKFLOW_STARTED,
    WORKFLOW_COMPLETED,
    WORKFLOW_FAILED,
    WORKFLOW_CANCELLED,
    WORKFLOW_STEP_COMPLETED,
    TASK_CREATED,
];

/// Work order for an agent: everything needed to execute one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepTask {
    pub step_id: Uuid,
    pub workflow_id: Uuid,
    pub workflow_type: String,
    pub tenant_id: String,
    pub agent_type: String,
    pub task_data: HashMap<String, serde_json::Value>,
    pub workflow_input: HashMap<String, serde_json::Value>,
    /// Results of the step's dependencies keyed by dependency step ID.
    pub dependency_results: BTreeMap<Uuid, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    /// 1 for the first admission, incremented by each retry.
    pub attempt: u32,
}

/// Events emitted by the workflow registry and step scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkflowEvent {
    #[serde(rename = "workflow.created")]
    WorkflowCreated {
        workflow_id: Uuid,
        workflow_type: String,
        tenant_id: String,
        name: String,
        description: String,
    },

    #[serde(rename = "workflow.started")]
    WorkflowStarted {
        workflow_id: Uuid,
        workflow_type: String,
        tenant_id: String,
    },

    #[serde(rename = "workflow.completed")]
    WorkflowCompleted {
        workflow_id: Uuid,
        workflow_type: String,
        tenant_id: String,
        has_errors: bool,
    },

    #[serde(rename = "workflow.failed")]
    WorkflowFailed {
        workflow_id: Uuid,
        workflow_type: String,
        tenant_id: String,
        has_errors: bool,
    },

    #[serde(rename = "workflow.cancelled")]
    WorkflowCancelled {
        workflow_id: Uuid,
        workflow_type: String,
        tenant_id: String,
    },

    /// A step was admitted (or re-admitted by a retry) and needs an agent.
    #[serde(rename = "task.created")]
    TaskCreated(StepTask),

    /// A step reached a terminal status (completed, failed, or skipped).
    #[serde(rename = "workflow.step.completed")]
    StepCompleted {
        step_id: Uuid,
        workflow_id: Uuid,
        status: StepStatus,
        has_error: bool,
        skipped: bool,
    },
}

impl WorkflowEvent {
    /// The dotted event-type tag used for routing and subscriptions.
    pub fn event_type(&self) -> &'static str {
        match self {
            WorkflowEvent::WorkflowCreated { .. } => WORKFLOW_CREATED,
            WorkflowEvent::WorkflowStarted { .. } => WORKFLOW_STARTED,
            WorkflowEvent::WorkflowCompleted { .. } => WORKFLOW_COMPLETED,
            WorkflowEvent::WorkflowFailed { .. } => WORKFLOW_FAILED,
            WorkflowEvent::WorkflowCancelled { .. } => WORKFLOW_CANCELLED,
            WorkflowEvent::TaskCreated(_) => TASK_CREATED,
            WorkflowEvent::StepCompleted { .. } => WORKFLOW_STEP_COMPLETED,
        }
    }

    /// The workflow this event belongs to.
    pub fn workflow_id(&self) -> Uuid {
        match self {
            WorkflowEvent::WorkflowCreated { workflow_id, .. }
            | WorkflowEvent::WorkflowStarted { workflow_id, .. }
            | WorkflowEvent::WorkflowCompleted { workflow_id, .. }
            | WorkflowEvent::WorkflowFailed { workflow_id, .. }
            | WorkflowEvent::WorkflowCancelled { workflow_id, .. }
            | WorkflowEvent::StepCompleted { workflow_id, .. } => *workflow_id,
            WorkflowEvent::TaskCreated(task) => task.workflow_id,
        }
    }
}

/// Transport wrapper around a `WorkflowEvent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// UUIDv7 event ID.
    pub id: Uuid,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    /// Groups related events; the owning workflow's ID.
    pub correlation_id: Uuid,
    pub payload: WorkflowEvent,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl EventEnvelope {
    /// Wrap an event, correlating it with its workflow.
    pub fn new(payload: WorkflowEvent) -> Self {
        Self {
            id: Uuid::now_v7(),
            event_type: payload.event_type().to_string(),
            timestamp: Utc::now(),
            correlation_id: payload.workflow_id(),
            payload,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

/// Filters for reading back recorded events. Newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventQuery {
    /// Only these event types (empty = all).
    #[serde(default)]
    pub event_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<DateTime<Utc>>,
    #[serde(default = "default_event_limit")]
    pub limit: u32,
}

fn default_event_limit() -> u32 {
    100
}

impl Default for EventQuery {
    fn default() -> Self {
        Self {
            event_types: Vec::new(),
            correlation_id: None,
            since: None,
            until: None,
            limit: default_event_limit(),
        }
    }
}
