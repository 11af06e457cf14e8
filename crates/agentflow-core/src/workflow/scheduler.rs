//! Step scheduler: owns step records, admission control, and completion
//! evaluation.
//!
//! A pending step is admitted (moved to `Scheduled` with a `task.created`
//! event) only once every one of its dependencies is `Completed`. After each
//! step outcome the owning workflow is re-evaluated: if steps remain, another
//! admission pass runs; if all are terminal, the registry finalizes it.
//!
//! Like the registry, the scheduler assumes its caller holds the workflow's
//! critical section.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use agentflow_types::config::FailurePolicy;
use agentflow_types::error::WorkflowError;
use agentflow_types::event::{StepTask, WorkflowEvent};
use agentflow_types::workflow::{
    NewStep, RetryConfig, Step, StepOutcome, StepStatus, Workflow, WorkflowDiagnosis,
    WorkflowStatus,
};
use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::completion;
use super::dag;
use super::registry::WorkflowRegistry;
use crate::event::publisher::EventPublisher;
use crate::repository::workflow::WorkflowRepository;

pub struct StepScheduler<R: WorkflowRepository, P: EventPublisher> {
    repo: Arc<R>,
    events: Arc<P>,
    registry: Arc<WorkflowRegistry<R, P>>,
    failure_policy: FailurePolicy,
    default_retry: RetryConfig,
}

impl<R: WorkflowRepository, P: EventPublisher> StepScheduler<R, P> {
    pub fn new(
        repo: Arc<R>,
        events: Arc<P>,
        registry: Arc<WorkflowRegistry<R, P>>,
        failure_policy: FailurePolicy,
        default_retry: RetryConfig,
    ) -> Self {
        Self {
            repo,
            events,
            registry,
            failure_policy,
            default_retry,
        }
    }

    // -----------------------------------------------------------------------
    // Step records
    // -----------------------------------------------------------------------

    /// Attach a pending step to a non-terminal workflow.
    ///
    /// Dependencies must already exist in the same workflow and may not form
    /// a cycle. On an active workflow the step goes through an admission
    /// pass immediately, so the returned step may already be `Scheduled`.
    pub async fn add_step(
        &self,
        workflow_id: &Uuid,
        request: NewStep,
    ) -> Result<Step, WorkflowError> {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(WorkflowError::InvalidInput(
                "step name cannot be empty".to_string(),
            ));
        }
        if request.agent_type.trim().is_empty() {
            return Err(WorkflowError::InvalidInput(
                "agent_type cannot be empty".to_string(),
            ));
        }

        let workflow = self.registry.get(workflow_id).await?;
        if workflow.status.is_terminal() {
            return Err(WorkflowError::StateConflict(format!(
                "workflow {workflow_id} is {}; steps cannot be added",
                workflow.status
            )));
        }

        let mut dependencies = request.dependencies;
        let mut seen = HashSet::new();
        dependencies.retain(|d| seen.insert(*d));

        let existing = self.repo.list_steps(workflow_id).await?;
        let id = Uuid::now_v7();
        dag::validate_new_step(&existing, id, &dependencies)?;

        let now = Utc::now();
        let step = Step {
            id,
            workflow_id: *workflow_id,
            name,
            description: request.description,
            agent_type: request.agent_type,
            task_data: request.task_data,
            dependencies,
            status: StepStatus::Pending,
            created_at: now,
            updated_at: now,
            scheduled_at: None,
            started_at: None,
            completed_at: None,
            timeout_seconds: request.timeout_seconds,
            retry_config: request.retry_config.unwrap_or(self.default_retry),
            retry_count: 0,
            result: None,
            error: None,
            skipped_by: None,
        };
        self.repo.create_step(&step).await?;
        info!(
            %workflow_id,
            step_id = %step.id,
            agent_type = %step.agent_type,
            dependencies = step.dependencies.len(),
            "step added"
        );

        if !workflow.status.is_active() {
            return Ok(step);
        }
        let mut steps = existing;
        steps.push(step);
        let admitted = self.admit_ready(&workflow, &steps).await?;
        self.sync_activity(workflow, &steps, !admitted.is_empty())
            .await?;
        match admitted.into_iter().find(|s| s.id == id) {
            Some(scheduled) => Ok(scheduled),
            None => self.get_step(&id).await,
        }
    }

    pub async fn get_step(&self, step_id: &Uuid) -> Result<Step, WorkflowError> {
        self.repo
            .get_step(step_id)
            .await?
            .ok_or_else(|| WorkflowError::MissingReference(format!("step {step_id}")))
    }

    /// Steps of an existing workflow in creation order.
    pub async fn list_steps(&self, workflow_id: &Uuid) -> Result<Vec<Step>, WorkflowError> {
        self.registry.get(workflow_id).await?;
        Ok(self.repo.list_steps(workflow_id).await?)
    }

    // -----------------------------------------------------------------------
    // Admission
    // -----------------------------------------------------------------------

    /// Admit every pending step whose dependencies are all completed.
    ///
    /// Returns the newly scheduled steps. Only active workflows admit; other
    /// statuses return an empty list.
    pub async fn schedule_ready_steps(
        &self,
        workflow_id: &Uuid,
    ) -> Result<Vec<Step>, WorkflowError> {
        let workflow = self.registry.get(workflow_id).await?;
        if !workflow.status.is_active() {
            debug!(
                %workflow_id,
                status = %workflow.status,
                "workflow not active; nothing to schedule"
            );
            return Ok(Vec::new());
        }
        let steps = self.repo.list_steps(workflow_id).await?;
        let admitted = self.admit_ready(&workflow, &steps).await?;
        self.sync_activity(workflow, &steps, !admitted.is_empty())
            .await?;
        Ok(admitted)
    }

    async fn admit_ready(
        &self,
        workflow: &Workflow,
        steps: &[Step],
    ) -> Result<Vec<Step>, WorkflowError> {
        let by_id: HashMap<Uuid, &Step> = steps.iter().map(|s| (s.id, s)).collect();

        // A dangling dependency fails the whole pass before anything is admitted.
        for step in steps.iter().filter(|s| s.status == StepStatus::Pending) {
            if let Some(dep) = step.dependencies.iter().find(|d| !by_id.contains_key(*d)) {
                return Err(WorkflowError::MissingReference(format!(
                    "step {} depends on unknown step {dep}",
                    step.id
                )));
            }
        }

        let ready: Vec<&Step> = steps
            .iter()
            .filter(|s| s.status == StepStatus::Pending)
            .filter(|s| {
                s.dependencies
                    .iter()
                    .all(|d| by_id.get(d).is_some_and(|dep| dep.status == StepStatus::Completed))
            })
            .collect();

        let mut admitted = Vec::with_capacity(ready.len());
        for step in ready {
            let task = build_task(workflow, step, &by_id);
            let mut step = step.clone();
            let now = Utc::now();
            step.status = StepStatus::Scheduled;
            step.scheduled_at = Some(now);
            step.updated_at = now;
            self.repo.update_step(&step).await?;
            self.events.publish(WorkflowEvent::TaskCreated(task)).await?;
            debug!(
                workflow_id = %workflow.id,
                step_id = %step.id,
                agent_type = %step.agent_type,
                "step scheduled"
            );
            admitted.push(step);
        }
        Ok(admitted)
    }

    // -----------------------------------------------------------------------
    // Outcomes
    // -----------------------------------------------------------------------

    /// Record an agent's terminal outcome for an in-flight step, then
    /// re-evaluate the workflow.
    pub async fn complete_step(
        &self,
        step_id: &Uuid,
        outcome: StepOutcome,
    ) -> Result<Step, WorkflowError> {
        let mut step = self.get_step(step_id).await?;
        if !step.status.is_in_flight() {
            return Err(WorkflowError::StateConflict(format!(
                "step {step_id} is {}; only scheduled, running or waiting steps can complete",
                step.status
            )));
        }

        step.status = outcome.status();
        match outcome {
            StepOutcome::Completed { result } => {
                step.result = Some(result);
                step.error = None;
            }
            StepOutcome::Failed { error, result } => {
                step.result = result;
                step.error = Some(error);
            }
        }
        let now = Utc::now();
        step.completed_at = Some(now);
        step.updated_at = now;
        self.repo.update_step(&step).await?;
        self.events
            .publish(WorkflowEvent::StepCompleted {
                step_id: step.id,
                workflow_id: step.workflow_id,
                status: step.status,
                has_error: step.error.is_some(),
                skipped: false,
            })
            .await?;

        if step.status == StepStatus::Failed {
            warn!(
                workflow_id = %step.workflow_id,
                %step_id,
                error = step.error.as_deref().unwrap_or_default(),
                "step failed"
            );
        } else {
            info!(workflow_id = %step.workflow_id, %step_id, "step completed");
        }

        self.evaluate_completion(&step.workflow_id).await?;
        Ok(step)
    }

    /// Re-admit a failed step of an active workflow. Dependencies are not
    /// re-checked: they were satisfied when the step was first admitted.
    ///
    /// Steps downstream of it that the `skip_dependents` policy skipped go
    /// back to `Pending`, so they run once the retry succeeds.
    pub async fn retry_step(&self, step_id: &Uuid) -> Result<Step, WorkflowError> {
        let mut step = self.get_step(step_id).await?;
        if step.status != StepStatus::Failed {
            return Err(WorkflowError::StateConflict(format!(
                "step {step_id} is {}; only failed steps can be retried",
                step.status
            )));
        }
        let workflow = self.registry.get(&step.workflow_id).await?;
        if !workflow.status.is_active() {
            return Err(WorkflowError::StateConflict(format!(
                "workflow {} is {}; retries need a running workflow",
                workflow.id, workflow.status
            )));
        }
        if !step.has_retries_left() {
            return Err(WorkflowError::RetryExhausted {
                step_id: *step_id,
                max_retries: step.retry_config.max_retries,
            });
        }

        let now = Utc::now();
        step.retry_count += 1;
        step.status = StepStatus::Scheduled;
        step.error = None;
        step.result = None;
        step.scheduled_at = Some(now);
        step.started_at = None;
        step.completed_at = None;
        step.updated_at = now;
        self.repo.update_step(&step).await?;

        let mut steps = self.repo.list_steps(&workflow.id).await?;
        self.reopen_cascaded_skips(step.id, &mut steps).await?;
        if self.failure_policy == FailurePolicy::SkipDependents {
            // Dependents may still sit behind another failure.
            self.skip_failed_dependents(&mut steps).await?;
        }
        let by_id: HashMap<Uuid, &Step> = steps.iter().map(|s| (s.id, s)).collect();
        let task = build_task(&workflow, &step, &by_id);
        self.events.publish(WorkflowEvent::TaskCreated(task)).await?;

        info!(
            workflow_id = %workflow.id,
            %step_id,
            attempt = step.retry_count + 1,
            max_retries = step.retry_config.max_retries,
            "step retried"
        );
        self.sync_activity(workflow, &steps, false).await?;
        Ok(step)
    }

    /// Skip a pending or failed step, then re-evaluate the workflow.
    ///
    /// A skip never cascades: dependents of a skipped step stay pending
    /// because admission requires completed dependencies.
    pub async fn skip_step(&self, step_id: &Uuid) -> Result<Step, WorkflowError> {
        let mut step = self.get_step(step_id).await?;
        let workflow = self.registry.get(&step.workflow_id).await?;
        if workflow.status.is_terminal() {
            return Err(WorkflowError::StateConflict(format!(
                "workflow {} is already {}",
                workflow.id, workflow.status
            )));
        }
        match step.status {
            StepStatus::Pending | StepStatus::Failed => {}
            other => {
                return Err(WorkflowError::StateConflict(format!(
                    "step {step_id} is {other}; only pending or failed steps can be skipped"
                )));
            }
        }

        let now = Utc::now();
        step.status = StepStatus::Skipped;
        step.completed_at = Some(now);
        step.updated_at = now;
        self.repo.update_step(&step).await?;
        self.events
            .publish(WorkflowEvent::StepCompleted {
                step_id: step.id,
                workflow_id: step.workflow_id,
                status: step.status,
                has_error: step.error.is_some(),
                skipped: true,
            })
            .await?;
        info!(workflow_id = %workflow.id, %step_id, "step skipped");

        self.evaluate_completion(&workflow.id).await?;
        Ok(step)
    }

    // -----------------------------------------------------------------------
    // Agent progress
    // -----------------------------------------------------------------------

    /// An agent picked the step up (`Scheduled`) or resumed it (`Waiting`).
    pub async fn mark_step_running(&self, step_id: &Uuid) -> Result<Step, WorkflowError> {
        let mut step = self.get_step(step_id).await?;
        match step.status {
            StepStatus::Scheduled | StepStatus::Waiting => {}
            other => {
                return Err(WorkflowError::StateConflict(format!(
                    "step {step_id} is {other}; only scheduled or waiting steps can start running"
                )));
            }
        }

        let now = Utc::now();
        step.status = StepStatus::Running;
        step.started_at.get_or_insert(now);
        step.updated_at = now;
        self.repo.update_step(&step).await?;
        debug!(workflow_id = %step.workflow_id, %step_id, "step running");

        self.refresh_activity(&step.workflow_id).await?;
        Ok(step)
    }

    /// A running step is blocked on something external (human input, a
    /// rate limit, ...).
    pub async fn mark_step_waiting(&self, step_id: &Uuid) -> Result<Step, WorkflowError> {
        let mut step = self.get_step(step_id).await?;
        if step.status != StepStatus::Running {
            return Err(WorkflowError::StateConflict(format!(
                "step {step_id} is {}; only running steps can wait",
                step.status
            )));
        }

        step.status = StepStatus::Waiting;
        step.updated_at = Utc::now();
        self.repo.update_step(&step).await?;
        debug!(workflow_id = %step.workflow_id, %step_id, "step waiting");

        self.refresh_activity(&step.workflow_id).await?;
        Ok(step)
    }

    // -----------------------------------------------------------------------
    // Completion evaluation
    // -----------------------------------------------------------------------

    /// Roll step outcomes up into the workflow.
    ///
    /// No-op unless the workflow is active. With steps still open it runs an
    /// admission pass; once every step is terminal it finalizes the workflow.
    /// Running it again with nothing changed neither transitions nor
    /// publishes.
    pub async fn evaluate_completion(
        &self,
        workflow_id: &Uuid,
    ) -> Result<Workflow, WorkflowError> {
        let workflow = self.registry.get(workflow_id).await?;
        if !workflow.status.is_active() {
            return Ok(workflow);
        }

        let mut steps = self.repo.list_steps(workflow_id).await?;
        if self.failure_policy == FailurePolicy::SkipDependents {
            self.skip_failed_dependents(&mut steps).await?;
        }

        match completion::aggregate(&steps) {
            Some(done) => self.registry.finalize(workflow, done).await,
            None => {
                let admitted = self.admit_ready(&workflow, &steps).await?;
                self.sync_activity(workflow, &steps, !admitted.is_empty())
                    .await
            }
        }
    }

    /// Skip every pending step downstream of a failed step, recording the
    /// failure that caused it.
    async fn skip_failed_dependents(&self, steps: &mut [Step]) -> Result<(), WorkflowError> {
        let failed: Vec<Uuid> = steps
            .iter()
            .filter(|s| s.status == StepStatus::Failed)
            .map(|s| s.id)
            .collect();

        for root in failed {
            let downstream = dag::transitive_dependents(steps, &[root]);
            for step in steps
                .iter_mut()
                .filter(|s| s.status == StepStatus::Pending && downstream.contains(&s.id))
            {
                let now = Utc::now();
                step.status = StepStatus::Skipped;
                step.skipped_by = Some(root);
                step.completed_at = Some(now);
                step.updated_at = now;
                self.repo.update_step(step).await?;
                self.events
                    .publish(WorkflowEvent::StepCompleted {
                        step_id: step.id,
                        workflow_id: step.workflow_id,
                        status: StepStatus::Skipped,
                        has_error: false,
                        skipped: true,
                    })
                    .await?;
                info!(
                    workflow_id = %step.workflow_id,
                    step_id = %step.id,
                    failed_step = %root,
                    "skipped step downstream of a failure"
                );
            }
        }
        Ok(())
    }

    /// Put steps skipped by a failure upstream of `retried` back to
    /// `Pending`. Manual skips are left alone.
    async fn reopen_cascaded_skips(
        &self,
        retried: Uuid,
        steps: &mut [Step],
    ) -> Result<(), WorkflowError> {
        let downstream = dag::transitive_dependents(steps, &[retried]);
        for step in steps.iter_mut().filter(|s| {
            s.status == StepStatus::Skipped
                && s.skipped_by.is_some()
                && downstream.contains(&s.id)
        }) {
            step.status = StepStatus::Pending;
            step.skipped_by = None;
            step.completed_at = None;
            step.updated_at = Utc::now();
            self.repo.update_step(step).await?;
            info!(
                workflow_id = %step.workflow_id,
                step_id = %step.id,
                retried_step = %retried,
                "reopened step skipped by an earlier failure"
            );
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Activity (Running <-> Waiting)
    // -----------------------------------------------------------------------

    async fn refresh_activity(&self, workflow_id: &Uuid) -> Result<Workflow, WorkflowError> {
        let workflow = self.registry.get(workflow_id).await?;
        let steps = self.repo.list_steps(workflow_id).await?;
        self.sync_activity(workflow, &steps, false).await
    }

    /// An active workflow is `Waiting` when every in-flight step waits, and
    /// `Running` as soon as any step is scheduled or running.
    async fn sync_activity(
        &self,
        workflow: Workflow,
        steps: &[Step],
        newly_admitted: bool,
    ) -> Result<Workflow, WorkflowError> {
        let busy = newly_admitted
            || steps
                .iter()
                .any(|s| matches!(s.status, StepStatus::Scheduled | StepStatus::Running));
        let status = if busy {
            WorkflowStatus::Running
        } else if steps.iter().any(|s| s.status == StepStatus::Waiting) {
            WorkflowStatus::Waiting
        } else {
            return Ok(workflow);
        };
        self.registry.set_activity(workflow, status).await
    }

    // -----------------------------------------------------------------------
    // Diagnostics
    // -----------------------------------------------------------------------

    /// Explain where a workflow stands and whether it can progress on its own.
    pub async fn diagnose(
        &self,
        workflow_id: &Uuid,
    ) -> Result<WorkflowDiagnosis, WorkflowError> {
        let workflow = self.registry.get(workflow_id).await?;
        let steps = self.repo.list_steps(workflow_id).await?;

        let count = |status: StepStatus| steps.iter().filter(|s| s.status == status).count();
        let in_flight = steps.iter().filter(|s| s.status.is_in_flight()).count();
        let all_terminal = steps.iter().all(|s| s.status.is_terminal());
        let blocked = dag::blocked_steps(&steps);
        let stuck = workflow.status.is_active() && !all_terminal && in_flight == 0;

        if stuck {
            warn!(
                %workflow_id,
                blocked = blocked.len(),
                "workflow is stuck; retry or skip a failed step to make progress"
            );
        }

        Ok(WorkflowDiagnosis {
            workflow_id: workflow.id,
            status: workflow.status,
            total_steps: steps.len(),
            pending: count(StepStatus::Pending),
            in_flight,
            completed: count(StepStatus::Completed),
            failed: count(StepStatus::Failed),
            skipped: count(StepStatus::Skipped),
            blocked,
            stuck,
        })
    }
}

/// Work order for `step`. A dependency without a result contributes `{}`.
fn build_task(workflow: &Workflow, step: &Step, by_id: &HashMap<Uuid, &Step>) -> StepTask {
    let dependency_results: BTreeMap<Uuid, serde_json::Value> = step
        .dependencies
        .iter()
        .map(|dep| {
            let result = by_id
                .get(dep)
                .and_then(|s| s.result.clone())
                .unwrap_or_else(|| json!({}));
            (*dep, result)
        })
        .collect();

    StepTask {
        step_id: step.id,
        workflow_id: workflow.id,
        workflow_type: workflow.workflow_type.clone(),
        tenant_id: workflow.tenant_id.clone(),
        agent_type: step.agent_type.clone(),
        task_data: step.task_data.clone(),
        workflow_input: workflow.input_data.clone(),
        dependency_results,
        timeout_seconds: step.timeout_seconds,
        attempt: step.retry_count + 1,
    }
}
