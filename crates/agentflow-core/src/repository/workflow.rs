//! Workflow repository trait definition.
//!
//! Defines the storage interface for workflow and step records. The
//! infrastructure layer (agentflow-infra) implements this trait with SQLite
//! persistence.
//!
//! Implementations must give strong read-after-write consistency for records
//! the caller just wrote; the scheduler reloads steps immediately after
//! updating them.

use agentflow_types::error::RepositoryError;
use agentflow_types::workflow::{Step, Workflow, WorkflowFilter};
use uuid::Uuid;

/// Repository trait for workflow persistence.
///
/// Covers two entity families:
/// - **Workflows:** create, read, replace, and filtered lookup.
/// - **Steps:** create, read, replace, and all steps of one workflow.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait WorkflowRepository: Send + Sync {
    // -----------------------------------------------------------------------
    // Workflows
    // -----------------------------------------------------------------------

    /// Insert a new workflow record. `Conflict` if the ID already exists.
    fn create_workflow(
        &self,
        workflow: &Workflow,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a workflow by its UUID.
    fn get_workflow(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Workflow>, RepositoryError>> + Send;

    /// Replace a workflow record by ID. `NotFound` if it does not exist.
    fn update_workflow(
        &self,
        workflow: &Workflow,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Filtered lookup ordered by `created_at` DESC, at most `limit` rows.
    fn find_workflows(
        &self,
        filter: &WorkflowFilter,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<Workflow>, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Steps
    // -----------------------------------------------------------------------

    /// Insert a new step record. `Conflict` if the ID already exists.
    fn create_step(
        &self,
        step: &Step,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a step by its UUID.
    fn get_step(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Step>, RepositoryError>> + Send;

    /// Replace a step record by ID. `NotFound` if it does not exist.
    fn update_step(
        &self,
        step: &Step,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// All steps of a workflow, ordered by `created_at` ASC.
    fn list_steps(
        &self,
        workflow_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<Step>, RepositoryError>> + Send;
}
