//! Workflow domain types for agentflow.
//!
//! A `Workflow` is a tenant-scoped unit of orchestration composed of `Step`s.
//! Steps declare dependencies on other steps of the same workflow; the
//! scheduler in `agentflow-core` admits a step only once every dependency is
//! `Completed`. Both entities carry a closed status enum so that invalid
//! status strings cannot be represented.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Workflow status
// ---------------------------------------------------------------------------

/// Lifecycle status of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Created,
    Scheduled,
    Running,
    Waiting,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    /// Terminal statuses are immutable: no operation leaves them.
    pub fn is_terminal(self) -> bool {
        match self {
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled => true,
            WorkflowStatus::Created
            | WorkflowStatus::Scheduled
            | WorkflowStatus::Running
            | WorkflowStatus::Waiting => false,
        }
    }

    /// Whether steps of a workflow in this status may be scheduled and
    /// aggregated.
    pub fn is_active(self) -> bool {
        match self {
            WorkflowStatus::Running | WorkflowStatus::Waiting => true,
            WorkflowStatus::Created
            | WorkflowStatus::Scheduled
            | WorkflowStatus::Completed
            | WorkflowStatus::Failed
            | WorkflowStatus::Cancelled => false,
        }
    }

    /// The snake_case wire name (`"running"`, `"cancelled"`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowStatus::Created => "created",
            WorkflowStatus::Scheduled => "scheduled",
            WorkflowStatus::Running => "running",
            WorkflowStatus::Waiting => "waiting",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WorkflowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(WorkflowStatus::Created),
            "scheduled" => Ok(WorkflowStatus::Scheduled),
            "running" => Ok(WorkflowStatus::Running),
            "waiting" => Ok(WorkflowStatus::Waiting),
            "completed" => Ok(WorkflowStatus::Completed),
            "failed" => Ok(WorkflowStatus::Failed),
            "cancelled" => Ok(WorkflowStatus::Cancelled),
            other => Err(format!("invalid workflow status: '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Step status
// ---------------------------------------------------------------------------

/// Lifecycle status of a single workflow step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Scheduled,
    Running,
    Waiting,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        match self {
            StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped => true,
            StepStatus::Pending
            | StepStatus::Scheduled
            | StepStatus::Running
            | StepStatus::Waiting => false,
        }
    }

    /// Admitted but not yet terminal: an agent owns the step right now.
    pub fn is_in_flight(self) -> bool {
        match self {
            StepStatus::Scheduled | StepStatus::Running | StepStatus::Waiting => true,
            StepStatus::Pending
            | StepStatus::Completed
            | StepStatus::Failed
            | StepStatus::Skipped => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Scheduled => "scheduled",
            StepStatus::Running => "running",
            StepStatus::Waiting => "waiting",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StepStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(StepStatus::Pending),
            "scheduled" => Ok(StepStatus::Scheduled),
            "running" => Ok(StepStatus::Running),
            "waiting" => Ok(StepStatus::Waiting),
            "completed" => Ok(StepStatus::Completed),
            "failed" => Ok(StepStatus::Failed),
            "skipped" => Ok(StepStatus::Skipped),
            other => Err(format!("invalid step status: '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Retry configuration
// ---------------------------------------------------------------------------

/// Retry bookkeeping limits for a step.
///
/// Retries are caller-invoked (`retry_step`); the interval is advisory data
/// for the caller and is not enforced by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt (default 3).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Suggested delay between retries in seconds (default 60).
    #[serde(default = "default_retry_interval")]
    pub retry_interval_seconds: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_interval() -> u64 {
    60
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_interval_seconds: default_retry_interval(),
        }
    }
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// A workflow record as persisted by the repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    /// UUIDv7 workflow ID.
    pub id: Uuid,
    pub name: String,
    pub description: String,
    /// Caller-supplied category label used for routing and reporting.
    #[serde(rename = "type")]
    pub workflow_type: String,
    pub status: WorkflowStatus,
    /// Owning tenant. Never reassigned.
    pub tenant_id: String,
    /// Immutable input visible to every step.
    #[serde(default)]
    pub input_data: HashMap<String, serde_json::Value>,
    /// Results of completed steps keyed by step ID. Filled at completion.
    #[serde(default)]
    pub output_data: BTreeMap<Uuid, serde_json::Value>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Failed step ID -> error message. Only set when the workflow failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<BTreeMap<Uuid, String>>,
}

/// Request payload for creating a workflow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewWorkflow {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub workflow_type: String,
    pub tenant_id: String,
    #[serde(default)]
    pub input_data: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Filters for `find` queries. Results are ordered newest first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub workflow_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<WorkflowStatus>,
    /// Inclusive lower bound on `created_at`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_after: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_before: Option<DateTime<Utc>>,
    /// Maximum rows to return. `None` uses the engine default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// A unit of work assigned to an external agent, gated by dependencies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// UUIDv7 step ID.
    pub id: Uuid,
    /// Owning workflow. Fixed for the step's lifetime.
    pub workflow_id: Uuid,
    pub name: String,
    pub description: String,
    /// Which kind of worker should execute the step.
    pub agent_type: String,
    #[serde(default)]
    pub task_data: HashMap<String, serde_json::Value>,
    /// Step IDs (same workflow) that must be `Completed` first.
    #[serde(default)]
    pub dependencies: Vec<Uuid>,
    pub status: StepStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Advisory; forwarded to the agent, never enforced by the scheduler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub retry_config: RetryConfig,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Failed step whose failure skipped this one under the
    /// `skip_dependents` policy. `None` for manual skips.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped_by: Option<Uuid>,
}

impl Step {
    /// Whether another `retry_step` is allowed by the retry budget.
    pub fn has_retries_left(&self) -> bool {
        self.retry_count < self.retry_config.max_retries
    }
}

/// Request payload for attaching a step to a workflow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewStep {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub agent_type: String,
    #[serde(default)]
    pub task_data: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub dependencies: Vec<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    /// `None` falls back to the engine's default retry configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_config: Option<RetryConfig>,
}

/// Terminal outcome reported by an agent for a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Completed {
        #[serde(default)]
        result: serde_json::Value,
    },
    Failed {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<serde_json::Value>,
    },
}

impl StepOutcome {
    pub fn status(&self) -> StepStatus {
        match self {
            StepOutcome::Completed { .. } => StepStatus::Completed,
            StepOutcome::Failed { .. } => StepStatus::Failed,
        }
    }
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// A pending step that can never be admitted without intervention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockedStep {
    pub step_id: Uuid,
    pub name: String,
    /// Failed or skipped steps upstream of this one.
    pub blocked_by: Vec<Uuid>,
}

/// Read-only snapshot explaining where a workflow stands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDiagnosis {
    pub workflow_id: Uuid,
    pub status: WorkflowStatus,
    pub total_steps: usize,
    pub pending: usize,
    pub in_flight: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub blocked: Vec<BlockedStep>,
    /// Active, not all steps terminal, and nothing in flight: progress needs
    /// a retry or skip.
    pub stuck: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(WorkflowStatus::Completed.is_terminal());
        assert!(WorkflowStatus::Failed.is_terminal());
        assert!(WorkflowStatus::Cancelled.is_terminal());
        assert!(!WorkflowStatus::Created.is_terminal());
        assert!(!WorkflowStatus::Running.is_terminal());

        assert!(StepStatus::Completed.is_terminal());
        assert!(StepStatus::Failed.is_terminal());
        assert!(StepStatus::Skipped.is_terminal());
        assert!(!StepStatus::Pending.is_terminal());
        assert!(!StepStatus::Waiting.is_terminal());
    }

    #[test]
    fn test_active_statuses() {
        assert!(WorkflowStatus::Running.is_active());
        assert!(WorkflowStatus::Waiting.is_active());
        assert!(!WorkflowStatus::Created.is_active());
        assert!(!WorkflowStatus::Cancelled.is_active());
    }

    #[test]
    fn test_status_string_roundtrip() {
        for s in [
            StepStatus::Pending,
            StepStatus::Scheduled,
            StepStatus::Running,
            StepStatus::Waiting,
            StepStatus::Completed,
            StepStatus::Failed,
            StepStatus::Skipped,
        ] {
            assert_eq!(s.as_str().parse::<StepStatus>().unwrap(), s);
            assert_eq!(
                serde_json::to_value(s).unwrap(),
                serde_json::Value::String(s.to_string())
            );
        }
        assert!("done".parse::<WorkflowStatus>().is_err());
    }

    #[test]
    fn test_retry_config_defaults() {
        let config: RetryConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, RetryConfig::default());
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_interval_seconds, 60);
    }

    #[test]
    fn test_step_outcome_tagged_by_status() {
        let outcome: StepOutcome =
            serde_json::from_str(r#"{"status":"failed","error":"boom"}"#).unwrap();
        assert_eq!(outcome.status(), StepStatus::Failed);

        let outcome: StepOutcome =
            serde_json::from_str(r#"{"status":"completed","result":{"x":1}}"#).unwrap();
        assert_eq!(
            outcome,
            StepOutcome::Completed {
                result: serde_json::json!({"x": 1})
            }
        );
    }

    #[test]
    fn test_workflow_type_field_renamed() {
        let req: NewWorkflow = serde_json::from_str(
            r#"{"name":"sync","type":"connector","tenant_id":"t1"}"#,
        )
        .unwrap();
        assert_eq!(req.workflow_type, "connector");
        assert!(req.input_data.is_empty());
    }
}
