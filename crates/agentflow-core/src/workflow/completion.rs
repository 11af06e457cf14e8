//! Rolls step outcomes up into a workflow outcome.

use std::collections::BTreeMap;

use agentflow_types::workflow::{Step, StepStatus, WorkflowStatus};
use uuid::Uuid;

/// Terminal outcome of a workflow whose steps are all terminal.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// `Failed` if any step failed, otherwise `Completed`.
    pub status: WorkflowStatus,
    /// Result of every completed step, keyed by step ID.
    pub output_data: BTreeMap<Uuid, serde_json::Value>,
    /// Error of every failed step, keyed by step ID.
    pub errors: BTreeMap<Uuid, String>,
}

impl Completion {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Aggregate a workflow's steps. `None` while any step is non-terminal.
///
/// A workflow with no steps completes with empty output. Skipped steps
/// contribute neither output nor errors.
pub fn aggregate(steps: &[Step]) -> Option<Completion> {
    if steps.iter().any(|s| !s.status.is_terminal()) {
        return None;
    }

    let mut output_data = BTreeMap::new();
    let mut errors = BTreeMap::new();
    for step in steps {
        match step.status {
            StepStatus::Completed => {
                if let Some(result) = &step.result {
                    output_data.insert(step.id, result.clone());
                }
            }
            StepStatus::Failed => {
                let error = step
                    .error
                    .clone()
                    .unwrap_or_else(|| "step failed without an error message".to_string());
                errors.insert(step.id, error);
            }
            // Non-terminal statuses were ruled out above.
            StepStatus::Skipped
            | StepStatus::Pending
            | StepStatus::Scheduled
            | StepStatus::Running
            | StepStatus::Waiting => {}
        }
    }

    let status = if errors.is_empty() {
        WorkflowStatus::Completed
    } else {
        WorkflowStatus::Failed
    };

    Some(Completion {
        status,
        output_data,
        errors,
    })
}
