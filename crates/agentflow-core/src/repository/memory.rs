//! In-memory `WorkflowRepository` for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use agentflow_types::error::RepositoryError;
use agentflow_types::workflow::{Step, Workflow, WorkflowFilter};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::workflow::WorkflowRepository;

#[derive(Default)]
pub(crate) struct InMemoryWorkflowRepository {
    workflows: Mutex<HashMap<Uuid, Workflow>>,
    steps: Mutex<HashMap<Uuid, Step>>,
    /// When set, every write fails with a query error.
    pub(crate) fail_writes: AtomicBool,
}

impl InMemoryWorkflowRepository {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn check_writable(&self) -> Result<(), RepositoryError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepositoryError::Query("disk full".to_string()));
        }
        Ok(())
    }
}

impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn create_workflow(&self, workflow: &Workflow) -> Result<(), RepositoryError> {
        self.check_writable()?;
        let mut workflows = self.workflows.lock().await;
        if workflows.contains_key(&workflow.id) {
            return Err(RepositoryError::Conflict(workflow.id.to_string()));
        }
        workflows.insert(workflow.id, workflow.clone());
        Ok(())
    }

    async fn get_workflow(&self, id: &Uuid) -> Result<Option<Workflow>, RepositoryError> {
        Ok(self.workflows.lock().await.get(id).cloned())
    }

    async fn update_workflow(&self, workflow: &Workflow) -> Result<(), RepositoryError> {
        self.check_writable()?;
        let mut workflows = self.workflows.lock().await;
        match workflows.get_mut(&workflow.id) {
            Some(existing) => {
                *existing = workflow.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn find_workflows(
        &self,
        filter: &WorkflowFilter,
        limit: u32,
    ) -> Result<Vec<Workflow>, RepositoryError> {
        let workflows = self.workflows.lock().await;
        let mut found: Vec<Workflow> = workflows
            .values()
            .filter(|w| filter.tenant_id.as_ref().is_none_or(|t| &w.tenant_id == t))
            .filter(|w| {
                filter
                    .workflow_type
                    .as_ref()
                    .is_none_or(|t| &w.workflow_type == t)
            })
            .filter(|w| filter.status.is_none_or(|s| w.status == s))
            .filter(|w| filter.created_after.is_none_or(|d| w.created_at >= d))
            .filter(|w| filter.created_before.is_none_or(|d| w.created_at <= d))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        found.truncate(limit as usize);
        Ok(found)
    }

    async fn create_step(&self, step: &Step) -> Result<(), RepositoryError> {
        self.check_writable()?;
        let mut steps = self.steps.lock().await;
        if steps.contains_key(&step.id) {
            return Err(RepositoryError::Conflict(step.id.to_string()));
        }
        steps.insert(step.id, step.clone());
        Ok(())
    }

    async fn get_step(&self, id: &Uuid) -> Result<Option<Step>, RepositoryError> {
        Ok(self.steps.lock().await.get(id).cloned())
    }

    async fn update_step(&self, step: &Step) -> Result<(), RepositoryError> {
        self.check_writable()?;
        let mut steps = self.steps.lock().await;
        match steps.get_mut(&step.id) {
            Some(existing) => {
                *existing = step.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn list_steps(&self, workflow_id: &Uuid) -> Result<Vec<Step>, RepositoryError> {
        let steps = self.steps.lock().await;
        let mut found: Vec<Step> = steps
            .values()
            .filter(|s| &s.workflow_id == workflow_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(found)
    }
}
