//! Workflow registry: owns workflow records and their lifecycle transitions.
//!
//! The registry does not lock. Callers that mutate an existing workflow go
//! through `WorkflowEngine`, which holds the workflow's critical section.

use std::collections::BTreeMap;
use std::sync::Arc;

use agentflow_types::error::WorkflowError;
use agentflow_types::event::WorkflowEvent;
use agentflow_types::workflow::{NewWorkflow, Workflow, WorkflowFilter, WorkflowStatus};
use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use super::completion::Completion;
use crate::event::publisher::EventPublisher;
use crate::repository::workflow::WorkflowRepository;

pub struct WorkflowRegistry<R: WorkflowRepository, P: EventPublisher> {
    repo: Arc<R>,
    events: Arc<P>,
    find_limit: u32,
}

impl<R: WorkflowRepository, P: EventPublisher> WorkflowRegistry<R, P> {
    /// `find_limit` caps `find` when the filter carries no limit.
    pub fn new(repo: Arc<R>, events: Arc<P>, find_limit: u32) -> Self {
        Self {
            repo,
            events,
            find_limit,
        }
    }

    /// Persist a new workflow in `Created` status and announce it.
    pub async fn create(&self, request: NewWorkflow) -> Result<Workflow, WorkflowError> {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(WorkflowError::InvalidInput(
                "workflow name cannot be empty".to_string(),
            ));
        }
        if request.tenant_id.trim().is_empty() {
            return Err(WorkflowError::InvalidInput(
                "tenant_id cannot be empty".to_string(),
            ));
        }
        if request.workflow_type.trim().is_empty() {
            return Err(WorkflowError::InvalidInput(
                "workflow type cannot be empty".to_string(),
            ));
        }

        let now = Utc::now();
        let workflow = Workflow {
            id: Uuid::now_v7(),
            name,
            description: request.description,
            workflow_type: request.workflow_type,
            status: WorkflowStatus::Created,
            tenant_id: request.tenant_id,
            input_data: request.input_data,
            output_data: BTreeMap::new(),
            metadata: request.metadata,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            error: None,
        };

        self.repo.create_workflow(&workflow).await?;
        self.events
            .publish(WorkflowEvent::WorkflowCreated {
                workflow_id: workflow.id,
                workflow_type: workflow.workflow_type.clone(),
                tenant_id: workflow.tenant_id.clone(),
                name: workflow.name.clone(),
                description: workflow.description.clone(),
            })
            .await?;

        info!(
            workflow_id = %workflow.id,
            tenant_id = %workflow.tenant_id,
            workflow_type = %workflow.workflow_type,
            "workflow created"
        );
        Ok(workflow)
    }

    /// Move a `Created` workflow to `Running` and announce it.
    ///
    /// The initial scheduling pass is the scheduler's job; see
    /// `WorkflowEngine::start_workflow`.
    pub async fn mark_started(&self, workflow_id: &Uuid) -> Result<Workflow, WorkflowError> {
        let mut workflow = self.get(workflow_id).await?;
        if workflow.status != WorkflowStatus::Created {
            return Err(WorkflowError::StateConflict(format!(
                "workflow {workflow_id} is {}; only created workflows can be started",
                workflow.status
            )));
        }

        let now = Utc::now();
        workflow.status = WorkflowStatus::Running;
        workflow.started_at = Some(now);
        workflow.updated_at = now;
        self.repo.update_workflow(&workflow).await?;
        self.events
            .publish(WorkflowEvent::WorkflowStarted {
                workflow_id: workflow.id,
                workflow_type: workflow.workflow_type.clone(),
                tenant_id: workflow.tenant_id.clone(),
            })
            .await?;

        info!(%workflow_id, "workflow started");
        Ok(workflow)
    }

    /// Cancel a non-terminal workflow. Step records are left untouched.
    pub async fn cancel(&self, workflow_id: &Uuid) -> Result<Workflow, WorkflowError> {
        let mut workflow = self.get(workflow_id).await?;
        if workflow.status.is_terminal() {
            return Err(WorkflowError::StateConflict(format!(
                "workflow {workflow_id} is already {}",
                workflow.status
            )));
        }

        let now = Utc::now();
        workflow.status = WorkflowStatus::Cancelled;
        workflow.completed_at = Some(now);
        workflow.updated_at = now;
        self.repo.update_workflow(&workflow).await?;
        self.events
            .publish(WorkflowEvent::WorkflowCancelled {
                workflow_id: workflow.id,
                workflow_type: workflow.workflow_type.clone(),
                tenant_id: workflow.tenant_id.clone(),
            })
            .await?;

        info!(%workflow_id, "workflow cancelled");
        Ok(workflow)
    }

    pub async fn get(&self, workflow_id: &Uuid) -> Result<Workflow, WorkflowError> {
        self.repo
            .get_workflow(workflow_id)
            .await?
            .ok_or_else(|| WorkflowError::MissingReference(format!("workflow {workflow_id}")))
    }

    /// Workflows matching `filter`, newest first.
    pub async fn find(&self, filter: &WorkflowFilter) -> Result<Vec<Workflow>, WorkflowError> {
        let limit = filter.limit.unwrap_or(self.find_limit);
        Ok(self.repo.find_workflows(filter, limit).await?)
    }

    /// Write the aggregated outcome onto `workflow` and announce it.
    pub(crate) async fn finalize(
        &self,
        mut workflow: Workflow,
        completion: Completion,
    ) -> Result<Workflow, WorkflowError> {
        let has_errors = completion.has_errors();
        let now = Utc::now();
        workflow.status = completion.status;
        workflow.output_data = completion.output_data;
        workflow.error = has_errors.then_some(completion.errors);
        workflow.completed_at = Some(now);
        workflow.updated_at = now;
        self.repo.update_workflow(&workflow).await?;

        let event = if workflow.status == WorkflowStatus::Failed {
            WorkflowEvent::WorkflowFailed {
                workflow_id: workflow.id,
                workflow_type: workflow.workflow_type.clone(),
                tenant_id: workflow.tenant_id.clone(),
                has_errors,
            }
        } else {
            WorkflowEvent::WorkflowCompleted {
                workflow_id: workflow.id,
                workflow_type: workflow.workflow_type.clone(),
                tenant_id: workflow.tenant_id.clone(),
                has_errors,
            }
        };
        self.events.publish(event).await?;

        info!(
            workflow_id = %workflow.id,
            status = %workflow.status,
            outputs = workflow.output_data.len(),
            "workflow finished"
        );
        Ok(workflow)
    }

    /// Flip an active workflow between `Running` and `Waiting`.
    pub(crate) async fn set_activity(
        &self,
        mut workflow: Workflow,
        status: WorkflowStatus,
    ) -> Result<Workflow, WorkflowError> {
        if !workflow.status.is_active() || workflow.status == status {
            return Ok(workflow);
        }
        workflow.status = status;
        workflow.updated_at = Utc::now();
        self.repo.update_workflow(&workflow).await?;
        debug!(workflow_id = %workflow.id, %status, "workflow activity changed");
        Ok(workflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use agentflow_types::event::{WORKFLOW_CANCELLED, WORKFLOW_CREATED, WORKFLOW_STARTED};
    use serde_json::json;

    use crate::event::publisher::recording::RecordingPublisher;
    use crate::repository::memory::InMemoryWorkflowRepository;

    type TestRegistry = WorkflowRegistry<InMemoryWorkflowRepository, RecordingPublisher>;

    fn setup() -> (
        TestRegistry,
        Arc<InMemoryWorkflowRepository>,
        Arc<RecordingPublisher>,
    ) {
        let repo = Arc::new(InMemoryWorkflowRepository::new());
        let events = Arc::new(RecordingPublisher::new());
        let registry = WorkflowRegistry::new(repo.clone(), events.clone(), 100);
        (registry, repo, events)
    }

    fn request(tenant: &str, workflow_type: &str) -> NewWorkflow {
        NewWorkflow {
            name: "sync contacts".to_string(),
            description: "pull CRM contacts".to_string(),
            workflow_type: workflow_type.to_string(),
            tenant_id: tenant.to_string(),
            input_data: [("source".to_string(), json!("crm"))].into(),
            metadata: Default::default(),
        }
    }

    #[tokio::test]
    async fn create_persists_and_announces() {
        let (registry, _repo, events) = setup();
        let workflow = registry.create(request("t1", "connector")).await.unwrap();

        assert_eq!(workflow.status, WorkflowStatus::Created);
        assert!(workflow.started_at.is_none());
        assert_eq!(registry.get(&workflow.id).await.unwrap(), workflow);
        assert_eq!(events.event_types(), vec![WORKFLOW_CREATED]);
    }

    #[tokio::test]
    async fn create_rejects_blank_name() {
        let (registry, _repo, events) = setup();
        let mut req = request("t1", "connector");
        req.name = "   ".to_string();
        let err = registry.create(req).await.unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidInput(_)));
        assert!(events.events().is_empty());
    }

    #[tokio::test]
    async fn start_twice_is_state_conflict() {
        let (registry, _repo, events) = setup();
        let workflow = registry.create(request("t1", "etl")).await.unwrap();

        let started = registry.mark_started(&workflow.id).await.unwrap();
        assert_eq!(started.status, WorkflowStatus::Running);
        assert!(started.started_at.is_some());

        let err = registry.mark_started(&workflow.id).await.unwrap_err();
        assert!(matches!(err, WorkflowError::StateConflict(_)));
        assert_eq!(events.count(WORKFLOW_STARTED), 1);
    }

    #[tokio::test]
    async fn cancel_terminal_is_state_conflict() {
        let (registry, _repo, events) = setup();
        let workflow = registry.create(request("t1", "etl")).await.unwrap();

        let cancelled = registry.cancel(&workflow.id).await.unwrap();
        assert_eq!(cancelled.status, WorkflowStatus::Cancelled);
        assert!(cancelled.completed_at.is_some());

        let err = registry.cancel(&workflow.id).await.unwrap_err();
        assert!(matches!(err, WorkflowError::StateConflict(_)));
        let err = registry.mark_started(&workflow.id).await.unwrap_err();
        assert!(matches!(err, WorkflowError::StateConflict(_)));
        assert_eq!(events.count(WORKFLOW_CANCELLED), 1);
    }

    #[tokio::test]
    async fn get_unknown_is_missing_reference() {
        let (registry, _repo, _events) = setup();
        let err = registry.get(&Uuid::now_v7()).await.unwrap_err();
        assert!(matches!(err, WorkflowError::MissingReference(_)));
    }

    #[tokio::test]
    async fn find_filters_and_orders_newest_first() {
        let (registry, _repo, _events) = setup();
        let first = registry.create(request("t1", "etl")).await.unwrap();
        let second = registry.create(request("t1", "etl")).await.unwrap();
        registry.create(request("t2", "etl")).await.unwrap();
        registry.create(request("t1", "report")).await.unwrap();

        let found = registry
            .find(&WorkflowFilter {
                tenant_id: Some("t1".to_string()),
                workflow_type: Some("etl".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        let ids: Vec<Uuid> = found.iter().map(|w| w.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);

        let limited = registry
            .find(&WorkflowFilter {
                limit: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn storage_failure_surfaces_without_event() {
        let (registry, repo, events) = setup();
        repo.fail_writes.store(true, Ordering::SeqCst);

        let err = registry.create(request("t1", "etl")).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Storage(_)));
        assert!(events.events().is_empty());
    }

    #[tokio::test]
    async fn transport_failure_surfaces() {
        let (registry, _repo, events) = setup();
        events.fail.store(true, Ordering::SeqCst);

        let err = registry.create(request("t1", "etl")).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Transport(_)));
    }
}
