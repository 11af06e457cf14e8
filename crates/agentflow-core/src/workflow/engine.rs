//! Workflow engine: the public entry point for the registry and scheduler.
//!
//! Every operation that mutates an existing workflow runs inside that
//! workflow's critical section (`WorkflowLocks`). Step operations first read
//! the step to learn its owning workflow (a step never moves), take the
//! lock, and then re-read the step inside it. Concurrent completions of the
//! same workflow therefore observe each other's writes, and finalization
//! happens exactly once. A lock entry lives only while an operation on its
//! workflow is running or queued.

use std::sync::Arc;

use agentflow_types::config::EngineConfig;
use agentflow_types::error::WorkflowError;
use agentflow_types::workflow::{
    NewStep, NewWorkflow, Step, StepOutcome, Workflow, WorkflowDiagnosis, WorkflowFilter,
};
use uuid::Uuid;

use super::lock::WorkflowLocks;
use super::registry::WorkflowRegistry;
use super::scheduler::StepScheduler;
use crate::event::publisher::EventPublisher;
use crate::repository::workflow::WorkflowRepository;

pub struct WorkflowEngine<R: WorkflowRepository, P: EventPublisher> {
    registry: Arc<WorkflowRegistry<R, P>>,
    scheduler: StepScheduler<R, P>,
    locks: WorkflowLocks,
}

impl<R: WorkflowRepository, P: EventPublisher> WorkflowEngine<R, P> {
    pub fn new(repo: Arc<R>, events: Arc<P>, config: &EngineConfig) -> Self {
        let registry = Arc::new(WorkflowRegistry::new(
            repo.clone(),
            events.clone(),
            config.find_limit,
        ));
        let scheduler = StepScheduler::new(
            repo,
            events,
            registry.clone(),
            config.failure_policy,
            config.default_retry,
        );
        Self {
            registry,
            scheduler,
            locks: WorkflowLocks::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Workflows
    // -----------------------------------------------------------------------

    pub async fn create_workflow(&self, request: NewWorkflow) -> Result<Workflow, WorkflowError> {
        self.registry.create(request).await
    }

    /// Start a created workflow and run the initial admission pass.
    ///
    /// A workflow without steps completes right away with empty output.
    pub async fn start_workflow(&self, workflow_id: &Uuid) -> Result<Workflow, WorkflowError> {
        self.locked(*workflow_id, async {
            self.registry.mark_started(workflow_id).await?;
            self.scheduler.evaluate_completion(workflow_id).await
        })
        .await
    }

    pub async fn cancel_workflow(&self, workflow_id: &Uuid) -> Result<Workflow, WorkflowError> {
        self.locked(*workflow_id, self.registry.cancel(workflow_id)).await
    }

    pub async fn get_workflow(&self, workflow_id: &Uuid) -> Result<Workflow, WorkflowError> {
        self.registry.get(workflow_id).await
    }

    pub async fn find_workflows(
        &self,
        filter: &WorkflowFilter,
    ) -> Result<Vec<Workflow>, WorkflowError> {
        self.registry.find(filter).await
    }

    /// Snapshot of step counts, blocked steps, and whether the workflow is
    /// stuck. Taken under the lock so counts and status agree.
    pub async fn diagnose(&self, workflow_id: &Uuid) -> Result<WorkflowDiagnosis, WorkflowError> {
        self.locked(*workflow_id, self.scheduler.diagnose(workflow_id)).await
    }

    /// Re-run admission for an active workflow. Normally triggered
    /// internally after every outcome.
    pub async fn schedule_ready_steps(
        &self,
        workflow_id: &Uuid,
    ) -> Result<Vec<Step>, WorkflowError> {
        self.locked(*workflow_id, self.scheduler.schedule_ready_steps(workflow_id)).await
    }

    // -----------------------------------------------------------------------
    // Steps
    // -----------------------------------------------------------------------

    pub async fn add_step(
        &self,
        workflow_id: &Uuid,
        request: NewStep,
    ) -> Result<Step, WorkflowError> {
        self.locked(*workflow_id, self.scheduler.add_step(workflow_id, request)).await
    }

    pub async fn get_step(&self, step_id: &Uuid) -> Result<Step, WorkflowError> {
        self.scheduler.get_step(step_id).await
    }

    pub async fn list_steps(&self, workflow_id: &Uuid) -> Result<Vec<Step>, WorkflowError> {
        self.scheduler.list_steps(workflow_id).await
    }

    pub async fn complete_step(
        &self,
        step_id: &Uuid,
        outcome: StepOutcome,
    ) -> Result<Step, WorkflowError> {
        let workflow_id = self.owning_workflow(step_id).await?;
        self.locked(workflow_id, self.scheduler.complete_step(step_id, outcome)).await
    }

    pub async fn retry_step(&self, step_id: &Uuid) -> Result<Step, WorkflowError> {
        let workflow_id = self.owning_workflow(step_id).await?;
        self.locked(workflow_id, self.scheduler.retry_step(step_id)).await
    }

    pub async fn skip_step(&self, step_id: &Uuid) -> Result<Step, WorkflowError> {
        let workflow_id = self.owning_workflow(step_id).await?;
        self.locked(workflow_id, self.scheduler.skip_step(step_id)).await
    }

    pub async fn mark_step_running(&self, step_id: &Uuid) -> Result<Step, WorkflowError> {
        let workflow_id = self.owning_workflow(step_id).await?;
        self.locked(workflow_id, self.scheduler.mark_step_running(step_id)).await
    }

    pub async fn mark_step_waiting(&self, step_id: &Uuid) -> Result<Step, WorkflowError> {
        let workflow_id = self.owning_workflow(step_id).await?;
        self.locked(workflow_id, self.scheduler.mark_step_waiting(step_id)).await
    }

    // -----------------------------------------------------------------------
    // Locking helpers
    // -----------------------------------------------------------------------

    async fn owning_workflow(&self, step_id: &Uuid) -> Result<Uuid, WorkflowError> {
        Ok(self.scheduler.get_step(step_id).await?.workflow_id)
    }

    /// Run `op` inside the critical section of `workflow_id`.
    ///
    /// The lock entry is forgotten afterwards unless another caller is
    /// already waiting on it, so the table only holds workflows with an
    /// operation in progress, whatever the outcome of `op`.
    async fn locked<T, F>(&self, workflow_id: Uuid, op: F) -> Result<T, WorkflowError>
    where
        F: Future<Output = Result<T, WorkflowError>>,
    {
        let guard = self.locks.acquire(workflow_id).await;
        let result = op.await;
        self.locks.release(&workflow_id, guard);
        result
    }

    /// Workflows with an operation in progress or queued.
    pub fn active_locks(&self) -> usize {
        self.locks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::Ordering;

    use agentflow_types::config::FailurePolicy;
    use agentflow_types::event::{
        TASK_CREATED, WORKFLOW_COMPLETED, WORKFLOW_FAILED, WORKFLOW_STEP_COMPLETED, WorkflowEvent,
    };
    use agentflow_types::workflow::{RetryConfig, StepStatus, WorkflowStatus};
    use serde_json::json;

    use crate::event::publisher::recording::RecordingPublisher;
    use crate::repository::memory::InMemoryWorkflowRepository;

    type TestEngine = WorkflowEngine<InMemoryWorkflowRepository, RecordingPublisher>;

    fn engine_with(
        config: EngineConfig,
    ) -> (
        Arc<TestEngine>,
        Arc<InMemoryWorkflowRepository>,
        Arc<RecordingPublisher>,
    ) {
        let repo = Arc::new(InMemoryWorkflowRepository::new());
        let events = Arc::new(RecordingPublisher::new());
        let engine = Arc::new(WorkflowEngine::new(repo.clone(), events.clone(), &config));
        (engine, repo, events)
    }

    fn engine() -> (Arc<TestEngine>, Arc<RecordingPublisher>) {
        let (engine, _repo, events) = engine_with(EngineConfig::default());
        (engine, events)
    }

    async fn create(engine: &TestEngine) -> Workflow {
        engine
            .create_workflow(NewWorkflow {
                name: "quarterly report".to_string(),
                workflow_type: "analysis".to_string(),
                tenant_id: "tenant-a".to_string(),
                input_data: [("quarter".to_string(), json!("Q3"))].into(),
                ..Default::default()
            })
            .await
            .unwrap()
    }

    async fn add(engine: &TestEngine, workflow_id: &Uuid, name: &str, deps: Vec<Uuid>) -> Step {
        engine
            .add_step(
                workflow_id,
                NewStep {
                    name: name.to_string(),
                    agent_type: "analyst".to_string(),
                    dependencies: deps,
                    ..Default::default()
                },
            )
            .await
            .unwrap()
    }

    async fn status_of(engine: &TestEngine, step_id: &Uuid) -> StepStatus {
        engine.get_step(step_id).await.unwrap().status
    }

    fn tasks(events: &RecordingPublisher) -> Vec<agentflow_types::event::StepTask> {
        events
            .events()
            .into_iter()
            .filter_map(|e| match e {
                WorkflowEvent::TaskCreated(task) => Some(task),
                _ => None,
            })
            .collect()
    }

    fn failed(error: &str) -> StepOutcome {
        StepOutcome::Failed {
            error: error.to_string(),
            result: None,
        }
    }

    // -----------------------------------------------------------------------
    // Scenarios
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn fan_out_runs_dependents_after_root_and_collects_outputs() {
        let (engine, events) = engine();
        let w = create(&engine).await;
        let a = add(&engine, &w.id, "A", vec![]).await;
        let b = add(&engine, &w.id, "B", vec![a.id]).await;
        let c = add(&engine, &w.id, "C", vec![a.id]).await;

        engine.start_workflow(&w.id).await.unwrap();
        assert_eq!(status_of(&engine, &a.id).await, StepStatus::Scheduled);
        assert_eq!(status_of(&engine, &b.id).await, StepStatus::Pending);
        assert_eq!(status_of(&engine, &c.id).await, StepStatus::Pending);

        events.clear();
        engine
            .complete_step(&a.id, StepOutcome::Completed { result: json!({"x": 1}) })
            .await
            .unwrap();
        assert_eq!(status_of(&engine, &b.id).await, StepStatus::Scheduled);
        assert_eq!(status_of(&engine, &c.id).await, StepStatus::Scheduled);

        let admitted = tasks(&events);
        assert_eq!(admitted.len(), 2);
        for task in &admitted {
            assert_eq!(task.dependency_results, BTreeMap::from([(a.id, json!({"x": 1}))]));
            assert_eq!(task.workflow_input["quarter"], json!("Q3"));
            assert_eq!(task.attempt, 1);
        }

        engine
            .complete_step(&b.id, StepOutcome::Completed { result: json!("b") })
            .await
            .unwrap();
        assert_eq!(
            engine.get_workflow(&w.id).await.unwrap().status,
            WorkflowStatus::Running
        );
        engine
            .complete_step(&c.id, StepOutcome::Completed { result: json!("c") })
            .await
            .unwrap();

        let w = engine.get_workflow(&w.id).await.unwrap();
        assert_eq!(w.status, WorkflowStatus::Completed);
        assert!(w.completed_at.is_some());
        assert!(w.error.is_none());
        assert_eq!(
            w.output_data,
            BTreeMap::from([(a.id, json!({"x": 1})), (b.id, json!("b")), (c.id, json!("c"))])
        );
        assert_eq!(events.count(WORKFLOW_COMPLETED), 1);
    }

    #[tokio::test]
    async fn failed_dependency_leaves_workflow_stuck_and_diagnosable() {
        let (engine, events) = engine();
        let w = create(&engine).await;
        let e = add(&engine, &w.id, "E", vec![]).await;
        let d = add(&engine, &w.id, "D", vec![e.id]).await;

        engine.start_workflow(&w.id).await.unwrap();
        engine.complete_step(&e.id, failed("api timeout")).await.unwrap();

        assert_eq!(status_of(&engine, &d.id).await, StepStatus::Pending);
        let workflow = engine.get_workflow(&w.id).await.unwrap();
        assert!(!workflow.status.is_terminal());
        assert_eq!(events.count(WORKFLOW_FAILED), 0);

        let diagnosis = engine.diagnose(&w.id).await.unwrap();
        assert!(diagnosis.stuck);
        assert_eq!(diagnosis.failed, 1);
        assert_eq!(diagnosis.pending, 1);
        assert_eq!(diagnosis.in_flight, 0);
        assert_eq!(diagnosis.blocked.len(), 1);
        assert_eq!(diagnosis.blocked[0].step_id, d.id);
        assert_eq!(diagnosis.blocked[0].blocked_by, vec![e.id]);

        // Skipping the failed step does not admit D: admission needs a
        // completed dependency. Skipping D as well lets the workflow finish.
        engine.skip_step(&e.id).await.unwrap();
        assert_eq!(status_of(&engine, &d.id).await, StepStatus::Pending);
        engine.skip_step(&d.id).await.unwrap();
        assert_eq!(
            engine.get_workflow(&w.id).await.unwrap().status,
            WorkflowStatus::Completed
        );
    }

    #[tokio::test]
    async fn retry_recovers_stuck_workflow() {
        let (engine, events) = engine();
        let w = create(&engine).await;
        let e = add(&engine, &w.id, "E", vec![]).await;
        let d = add(&engine, &w.id, "D", vec![e.id]).await;
        engine.start_workflow(&w.id).await.unwrap();
        engine.complete_step(&e.id, failed("flaky")).await.unwrap();

        events.clear();
        let retried = engine.retry_step(&e.id).await.unwrap();
        assert_eq!(retried.status, StepStatus::Scheduled);
        assert_eq!(retried.retry_count, 1);
        assert!(retried.error.is_none());
        assert_eq!(tasks(&events)[0].attempt, 2);

        engine
            .complete_step(&e.id, StepOutcome::Completed { result: json!(1) })
            .await
            .unwrap();
        assert_eq!(status_of(&engine, &d.id).await, StepStatus::Scheduled);
        assert!(!engine.diagnose(&w.id).await.unwrap().stuck);
    }

    #[tokio::test]
    async fn retry_beyond_max_retries_is_exhausted() {
        let (engine, _events) = engine();
        let w = create(&engine).await;
        let x = engine
            .add_step(
                &w.id,
                NewStep {
                    name: "X".to_string(),
                    agent_type: "connector".to_string(),
                    retry_config: Some(RetryConfig {
                        max_retries: 1,
                        retry_interval_seconds: 5,
                    }),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        // Keeps the workflow active while X fails.
        add(&engine, &w.id, "Y", vec![]).await;
        engine.start_workflow(&w.id).await.unwrap();

        engine.complete_step(&x.id, failed("boom")).await.unwrap();
        engine.retry_step(&x.id).await.unwrap();
        engine.complete_step(&x.id, failed("boom again")).await.unwrap();

        let err = engine.retry_step(&x.id).await.unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::RetryExhausted { step_id, max_retries: 1 } if step_id == x.id
        ));
        let x = engine.get_step(&x.id).await.unwrap();
        assert_eq!(x.retry_count, 1);
        assert_eq!(x.status, StepStatus::Failed);
    }

    #[tokio::test]
    async fn retry_non_failed_step_is_state_conflict() {
        let (engine, _events) = engine();
        let w = create(&engine).await;
        let a = add(&engine, &w.id, "A", vec![]).await;
        engine.start_workflow(&w.id).await.unwrap();

        let err = engine.retry_step(&a.id).await.unwrap_err();
        assert!(matches!(err, WorkflowError::StateConflict(_)));
    }

    #[tokio::test]
    async fn failure_of_last_step_fails_workflow_with_error_map() {
        let (engine, events) = engine();
        let w = create(&engine).await;
        let a = add(&engine, &w.id, "A", vec![]).await;
        let b = add(&engine, &w.id, "B", vec![]).await;
        engine.start_workflow(&w.id).await.unwrap();

        engine
            .complete_step(&a.id, StepOutcome::Completed { result: json!("ok") })
            .await
            .unwrap();
        engine.complete_step(&b.id, failed("bad input")).await.unwrap();

        let w = engine.get_workflow(&w.id).await.unwrap();
        assert_eq!(w.status, WorkflowStatus::Failed);
        assert_eq!(w.error, Some(BTreeMap::from([(b.id, "bad input".to_string())])));
        assert_eq!(w.output_data, BTreeMap::from([(a.id, json!("ok"))]));
        assert_eq!(events.count(WORKFLOW_FAILED), 1);

        // Terminal workflow: retry is refused even though the step failed.
        let err = engine.retry_step(&b.id).await.unwrap_err();
        assert!(matches!(err, WorkflowError::StateConflict(_)));
        let err = engine.skip_step(&b.id).await.unwrap_err();
        assert!(matches!(err, WorkflowError::StateConflict(_)));
    }

    #[tokio::test]
    async fn start_without_steps_completes_immediately() {
        let (engine, events) = engine();
        let w = create(&engine).await;

        let started = engine.start_workflow(&w.id).await.unwrap();
        assert_eq!(started.status, WorkflowStatus::Completed);
        assert!(started.output_data.is_empty());
        assert!(started.started_at.is_some());
        assert_eq!(events.count(WORKFLOW_COMPLETED), 1);
    }

    #[tokio::test]
    async fn start_twice_is_state_conflict() {
        let (engine, _events) = engine();
        let w = create(&engine).await;
        add(&engine, &w.id, "A", vec![]).await;
        engine.start_workflow(&w.id).await.unwrap();

        let err = engine.start_workflow(&w.id).await.unwrap_err();
        assert!(matches!(err, WorkflowError::StateConflict(_)));
    }

    // -----------------------------------------------------------------------
    // Properties
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn dependents_are_scheduled_only_after_every_dependency_completes() {
        let (engine, _events) = engine();
        let w = create(&engine).await;
        let a = add(&engine, &w.id, "A", vec![]).await;
        let b = add(&engine, &w.id, "B", vec![]).await;
        let join = add(&engine, &w.id, "join", vec![a.id, b.id]).await;
        engine.start_workflow(&w.id).await.unwrap();

        engine
            .complete_step(&a.id, StepOutcome::Completed { result: json!(1) })
            .await
            .unwrap();
        assert_eq!(status_of(&engine, &join.id).await, StepStatus::Pending);

        engine
            .complete_step(&b.id, StepOutcome::Completed { result: json!(2) })
            .await
            .unwrap();
        assert_eq!(status_of(&engine, &join.id).await, StepStatus::Scheduled);
    }

    #[tokio::test]
    async fn double_completion_is_rejected() {
        let (engine, events) = engine();
        let w = create(&engine).await;
        let a = add(&engine, &w.id, "A", vec![]).await;
        let b = add(&engine, &w.id, "B", vec![]).await;
        engine.start_workflow(&w.id).await.unwrap();

        engine
            .complete_step(&a.id, StepOutcome::Completed { result: json!(1) })
            .await
            .unwrap();
        let err = engine
            .complete_step(&a.id, failed("late duplicate"))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::StateConflict(_)));
        assert_eq!(status_of(&engine, &a.id).await, StepStatus::Completed);
        assert_eq!(events.count(WORKFLOW_STEP_COMPLETED), 1);

        let pending = add(&engine, &w.id, "C", vec![b.id]).await;
        let err = engine
            .complete_step(&pending.id, StepOutcome::Completed { result: json!(1) })
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::StateConflict(_)));
    }

    #[tokio::test]
    async fn repeated_evaluation_is_idempotent() {
        let (engine, events) = engine();
        let w = create(&engine).await;
        let a = add(&engine, &w.id, "A", vec![]).await;
        add(&engine, &w.id, "B", vec![a.id]).await;
        engine.start_workflow(&w.id).await.unwrap();

        let before = engine.get_workflow(&w.id).await.unwrap();
        let emitted = events.events().len();
        assert!(engine.schedule_ready_steps(&w.id).await.unwrap().is_empty());
        assert!(engine.schedule_ready_steps(&w.id).await.unwrap().is_empty());
        assert_eq!(events.events().len(), emitted);
        assert_eq!(engine.get_workflow(&w.id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn terminal_workflow_ignores_late_outcomes() {
        let (engine, events) = engine();
        let w = create(&engine).await;
        let a = add(&engine, &w.id, "A", vec![]).await;
        engine.start_workflow(&w.id).await.unwrap();
        let cancelled = engine.cancel_workflow(&w.id).await.unwrap();
        assert_eq!(cancelled.status, WorkflowStatus::Cancelled);

        // Cancellation leaves the in-flight step alone; its late outcome is
        // recorded but does not reopen the workflow.
        assert_eq!(status_of(&engine, &a.id).await, StepStatus::Scheduled);
        engine
            .complete_step(&a.id, StepOutcome::Completed { result: json!(1) })
            .await
            .unwrap();
        let w = engine.get_workflow(&w.id).await.unwrap();
        assert_eq!(w, cancelled);
        assert_eq!(events.count(WORKFLOW_COMPLETED), 0);

        let err = engine.cancel_workflow(&w.id).await.unwrap_err();
        assert!(matches!(err, WorkflowError::StateConflict(_)));
        let err = engine
            .add_step(
                &w.id,
                NewStep {
                    name: "late".to_string(),
                    agent_type: "analyst".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::StateConflict(_)));
    }

    #[tokio::test]
    async fn concurrent_completions_finalize_exactly_once() {
        let (engine, events) = engine();
        let w = create(&engine).await;
        let mut ids = Vec::new();
        for i in 0..16 {
            ids.push(add(&engine, &w.id, &format!("shard-{i}"), vec![]).await.id);
        }
        engine.start_workflow(&w.id).await.unwrap();

        let handles: Vec<_> = ids
            .iter()
            .map(|id| {
                let engine = engine.clone();
                let id = *id;
                tokio::spawn(async move {
                    engine
                        .complete_step(&id, StepOutcome::Completed { result: json!(id) })
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let w = engine.get_workflow(&w.id).await.unwrap();
        assert_eq!(w.status, WorkflowStatus::Completed);
        assert_eq!(w.output_data.len(), ids.len());
        assert_eq!(events.count(WORKFLOW_COMPLETED), 1);
        assert_eq!(engine.active_locks(), 0, "terminal workflow releases its lock");
    }

    #[tokio::test]
    async fn concurrent_duplicate_completions_only_one_wins() {
        let (engine, events) = engine();
        let w = create(&engine).await;
        let a = add(&engine, &w.id, "A", vec![]).await;
        engine.start_workflow(&w.id).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let engine = engine.clone();
                let id = a.id;
                tokio::spawn(async move {
                    engine
                        .complete_step(&id, StepOutcome::Completed { result: json!(i) })
                        .await
                })
            })
            .collect();
        let mut ok = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                ok += 1;
            }
        }

        assert_eq!(ok, 1);
        assert_eq!(events.count(WORKFLOW_STEP_COMPLETED), 1);
        assert_eq!(events.count(WORKFLOW_COMPLETED), 1);
    }

    #[tokio::test]
    async fn skip_dependents_policy_via_config() {
        let config = EngineConfig {
            failure_policy: FailurePolicy::SkipDependents,
            ..Default::default()
        };
        let (engine, _repo, _events) = engine_with(config);
        let w = create(&engine).await;
        let e = add(&engine, &w.id, "E", vec![]).await;
        let d = add(&engine, &w.id, "D", vec![e.id]).await;
        engine.start_workflow(&w.id).await.unwrap();

        engine.complete_step(&e.id, failed("down")).await.unwrap();

        assert_eq!(status_of(&engine, &d.id).await, StepStatus::Skipped);
        let w = engine.get_workflow(&w.id).await.unwrap();
        assert_eq!(w.status, WorkflowStatus::Failed);
        assert!(!engine.diagnose(&w.id).await.unwrap().stuck);
    }

    #[tokio::test]
    async fn retried_failure_reopens_the_steps_it_skipped() {
        let config = EngineConfig {
            failure_policy: FailurePolicy::SkipDependents,
            ..Default::default()
        };
        let (engine, _repo, _events) = engine_with(config);
        let w = create(&engine).await;
        let e = add(&engine, &w.id, "E", vec![]).await;
        let d = add(&engine, &w.id, "D", vec![e.id]).await;
        let y = add(&engine, &w.id, "Y", vec![]).await;
        engine.start_workflow(&w.id).await.unwrap();

        engine.complete_step(&e.id, failed("flaky upstream")).await.unwrap();
        let skipped = engine.get_step(&d.id).await.unwrap();
        assert_eq!(skipped.status, StepStatus::Skipped);
        assert_eq!(skipped.skipped_by, Some(e.id));

        // `Y` is still in flight, so the workflow is active and E can retry.
        engine.retry_step(&e.id).await.unwrap();
        let reopened = engine.get_step(&d.id).await.unwrap();
        assert_eq!(reopened.status, StepStatus::Pending);
        assert_eq!(reopened.skipped_by, None);
        assert!(reopened.completed_at.is_none());

        engine
            .complete_step(&e.id, StepOutcome::Completed { result: json!({"rows": 3}) })
            .await
            .unwrap();
        assert_eq!(status_of(&engine, &d.id).await, StepStatus::Scheduled);
        engine
            .complete_step(&y.id, StepOutcome::Completed { result: json!("y") })
            .await
            .unwrap();
        assert_eq!(
            engine.get_workflow(&w.id).await.unwrap().status,
            WorkflowStatus::Running
        );
        engine
            .complete_step(&d.id, StepOutcome::Completed { result: json!("d") })
            .await
            .unwrap();

        let w = engine.get_workflow(&w.id).await.unwrap();
        assert_eq!(w.status, WorkflowStatus::Completed);
        assert_eq!(w.output_data.len(), 3);
    }

    #[tokio::test]
    async fn lock_table_is_empty_between_operations() {
        let (engine, _events) = engine();
        let unknown = Uuid::now_v7();
        for _ in 0..5 {
            assert!(engine.diagnose(&unknown).await.is_err());
            assert!(engine.start_workflow(&unknown).await.is_err());
            assert!(engine.cancel_workflow(&unknown).await.is_err());
            assert!(engine.schedule_ready_steps(&unknown).await.is_err());
            let err = engine
                .add_step(
                    &unknown,
                    NewStep {
                        name: "orphan".to_string(),
                        agent_type: "analyst".to_string(),
                        ..Default::default()
                    },
                )
                .await
                .unwrap_err();
            assert!(matches!(err, WorkflowError::MissingReference(_)));
        }
        assert_eq!(engine.active_locks(), 0);

        let w = create(&engine).await;
        let a = add(&engine, &w.id, "A", vec![]).await;
        let b = add(&engine, &w.id, "B", vec![]).await;
        engine.start_workflow(&w.id).await.unwrap();
        engine.mark_step_running(&a.id).await.unwrap();
        engine.mark_step_waiting(&a.id).await.unwrap();
        engine.complete_step(&b.id, failed("boom")).await.unwrap();
        engine.retry_step(&b.id).await.unwrap();
        engine.diagnose(&w.id).await.unwrap();
        engine.schedule_ready_steps(&w.id).await.unwrap();
        assert_eq!(engine.active_locks(), 0, "an idle active workflow holds no entry");

        engine.cancel_workflow(&w.id).await.unwrap();
        for _ in 0..5 {
            engine.diagnose(&w.id).await.unwrap();
            assert!(engine.skip_step(&a.id).await.is_err());
        }
        assert_eq!(engine.active_locks(), 0);
    }

    #[tokio::test]
    async fn add_step_only_accepts_existing_dependencies() {
        let (engine, _events) = engine();
        let w = create(&engine).await;
        let a = add(&engine, &w.id, "A", vec![]).await;

        let err = engine
            .add_step(
                &w.id,
                NewStep {
                    name: "B".to_string(),
                    agent_type: "analyst".to_string(),
                    dependencies: vec![a.id, Uuid::now_v7()],
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::MissingReference(_)));
        assert_eq!(engine.list_steps(&w.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn transport_failure_propagates_from_step_operations() {
        let (engine, _repo, events) = engine_with(EngineConfig::default());
        let w = create(&engine).await;
        let a = add(&engine, &w.id, "A", vec![]).await;
        engine.start_workflow(&w.id).await.unwrap();

        events.fail.store(true, Ordering::SeqCst);
        let err = engine
            .complete_step(&a.id, StepOutcome::Completed { result: json!(1) })
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Transport(_)));
    }

    #[tokio::test]
    async fn unknown_ids_are_missing_references() {
        let (engine, _events) = engine();
        let unknown = Uuid::now_v7();
        for err in [
            engine.start_workflow(&unknown).await.unwrap_err(),
            engine.cancel_workflow(&unknown).await.unwrap_err(),
            engine.diagnose(&unknown).await.unwrap_err(),
        ] {
            assert!(matches!(err, WorkflowError::MissingReference(_)));
        }
        for err in [
            engine.complete_step(&unknown, failed("x")).await.unwrap_err(),
            engine.retry_step(&unknown).await.unwrap_err(),
            engine.skip_step(&unknown).await.unwrap_err(),
            engine.mark_step_running(&unknown).await.unwrap_err(),
        ] {
            assert!(matches!(err, WorkflowError::MissingReference(_)));
        }
    }

    #[tokio::test]
    async fn tasks_are_announced_once_per_admission() {
        let (engine, events) = engine();
        let w = create(&engine).await;
        let a = add(&engine, &w.id, "A", vec![]).await;
        add(&engine, &w.id, "B", vec![a.id]).await;
        engine.start_workflow(&w.id).await.unwrap();
        engine.mark_step_running(&a.id).await.unwrap();
        engine
            .complete_step(&a.id, StepOutcome::Completed { result: json!(1) })
            .await
            .unwrap();

        assert_eq!(events.count(TASK_CREATED), 2);
    }
}
