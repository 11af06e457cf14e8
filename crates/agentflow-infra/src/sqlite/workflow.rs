//! SQLite workflow repository implementation.
//!
//! Implements `WorkflowRepository` from `agentflow-core` using sqlx with split
//! read/write pools. Map- and list-valued fields are stored as JSON text;
//! statuses use their snake_case names so the CHECK constraints in the
//! migration apply.

use std::collections::{BTreeMap, HashMap};

use agentflow_core::repository::workflow::WorkflowRepository;
use agentflow_types::error::RepositoryError;
use agentflow_types::workflow::{
    RetryConfig, Step, StepStatus, Workflow, WorkflowFilter, WorkflowStatus,
};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, map_write_error, parse_datetime, parse_uuid};

/// SQLite-backed implementation of `WorkflowRepository`.
pub struct SqliteWorkflowRepository {
    pool: DatabasePool,
}

impl SqliteWorkflowRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct WorkflowRow {
    id: String,
    tenant_id: String,
    name: String,
    description: String,
    workflow_type: String,
    status: String,
    input_data: String,
    output_data: String,
    metadata: String,
    error: Option<String>,
    created_at: String,
    updated_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
}

impl WorkflowRow {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            workflow_type: row.try_get("workflow_type")?,
            status: row.try_get("status")?,
            input_data: row.try_get("input_data")?,
            output_data: row.try_get("output_data")?,
            metadata: row.try_get("metadata")?,
            error: row.try_get("error")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }

    fn into_workflow(self) -> Result<Workflow, RepositoryError> {
        let status: WorkflowStatus = self.status.parse().map_err(RepositoryError::Query)?;
        let input_data: HashMap<String, Value> = parse_json(&self.input_data, "input_data")?;
        let output_data: BTreeMap<Uuid, Value> = parse_json(&self.output_data, "output_data")?;
        let metadata: HashMap<String, Value> = parse_json(&self.metadata, "metadata")?;
        let error: Option<BTreeMap<Uuid, String>> = self
            .error
            .as_deref()
            .map(|s| parse_json(s, "error"))
            .transpose()?;

        Ok(Workflow {
            id: parse_uuid(&self.id)?,
            name: self.name,
            description: self.description,
            workflow_type: self.workflow_type,
            status,
            tenant_id: self.tenant_id,
            input_data,
            output_data,
            metadata,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
            started_at: self.started_at.as_deref().map(parse_datetime).transpose()?,
            completed_at: self.completed_at.as_deref().map(parse_datetime).transpose()?,
            error,
        })
    }
}

struct StepRow {
    id: String,
    workflow_id: String,
    name: String,
    description: String,
    agent_type: String,
    task_data: String,
    dependencies: String,
    status: String,
    created_at: String,
    updated_at: String,
    scheduled_at: Option<String>,
    started_at: Option<String>,
    completed_at: Option<String>,
    timeout_seconds: Option<i64>,
    max_retries: i64,
    retry_interval_seconds: i64,
    retry_count: i64,
    result: Option<String>,
    error: Option<String>,
    skipped_by: Option<String>,
}

impl StepRow {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            workflow_id: row.try_get("workflow_id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            agent_type: row.try_get("agent_type")?,
            task_data: row.try_get("task_data")?,
            dependencies: row.try_get("dependencies")?,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            scheduled_at: row.try_get("scheduled_at")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            timeout_seconds: row.try_get("timeout_seconds")?,
            max_retries: row.try_get("max_retries")?,
            retry_interval_seconds: row.try_get("retry_interval_seconds")?,
            retry_count: row.try_get("retry_count")?,
            result: row.try_get("result")?,
            error: row.try_get("error")?,
            skipped_by: row.try_get("skipped_by")?,
        })
    }

    fn into_step(self) -> Result<Step, RepositoryError> {
        let status: StepStatus = self.status.parse().map_err(RepositoryError::Query)?;
        let task_data: HashMap<String, Value> = parse_json(&self.task_data, "task_data")?;
        let dependencies: Vec<Uuid> = parse_json(&self.dependencies, "dependencies")?;
        let result: Option<Value> = self
            .result
            .as_deref()
            .map(|s| parse_json(s, "result"))
            .transpose()?;

        Ok(Step {
            id: parse_uuid(&self.id)?,
            workflow_id: parse_uuid(&self.workflow_id)?,
            name: self.name,
            description: self.description,
            agent_type: self.agent_type,
            task_data,
            dependencies,
            status,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
            scheduled_at: self.scheduled_at.as_deref().map(parse_datetime).transpose()?,
            started_at: self.started_at.as_deref().map(parse_datetime).transpose()?,
            completed_at: self.completed_at.as_deref().map(parse_datetime).transpose()?,
            timeout_seconds: self.timeout_seconds.map(to_u64).transpose()?,
            retry_config: RetryConfig {
                max_retries: to_u32(self.max_retries)?,
                retry_interval_seconds: to_u64(self.retry_interval_seconds)?,
            },
            retry_count: to_u32(self.retry_count)?,
            result,
            error: self.error,
            skipped_by: self.skipped_by.as_deref().map(parse_uuid).transpose()?,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_json<T: serde::de::DeserializeOwned>(s: &str, column: &str) -> Result<T, RepositoryError> {
    serde_json::from_str(s)
        .map_err(|e| RepositoryError::Query(format!("invalid {column} JSON: {e}")))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|e| RepositoryError::Query(e.to_string()))
}

fn to_u32(v: i64) -> Result<u32, RepositoryError> {
    u32::try_from(v).map_err(|_| RepositoryError::Query(format!("value out of range: {v}")))
}

fn to_u64(v: i64) -> Result<u64, RepositoryError> {
    u64::try_from(v).map_err(|_| RepositoryError::Query(format!("value out of range: {v}")))
}

fn to_i64(v: u64) -> Result<i64, RepositoryError> {
    i64::try_from(v).map_err(|_| RepositoryError::Query(format!("value out of range: {v}")))
}

/// JSON columns of a workflow, serialized once for INSERT and UPDATE.
struct WorkflowJson {
    input_data: String,
    output_data: String,
    metadata: String,
    error: Option<String>,
}

impl WorkflowJson {
    fn encode(workflow: &Workflow) -> Result<Self, RepositoryError> {
        Ok(Self {
            input_data: to_json(&workflow.input_data)?,
            output_data: to_json(&workflow.output_data)?,
            metadata: to_json(&workflow.metadata)?,
            error: workflow.error.as_ref().map(to_json).transpose()?,
        })
    }
}

struct StepJson {
    task_data: String,
    dependencies: String,
    result: Option<String>,
    timeout_seconds: Option<i64>,
    retry_interval_seconds: i64,
}

impl StepJson {
    fn encode(step: &Step) -> Result<Self, RepositoryError> {
        Ok(Self {
            task_data: to_json(&step.task_data)?,
            dependencies: to_json(&step.dependencies)?,
            result: step.result.as_ref().map(to_json).transpose()?,
            timeout_seconds: step.timeout_seconds.map(to_i64).transpose()?,
            retry_interval_seconds: to_i64(step.retry_config.retry_interval_seconds)?,
        })
    }
}

// ---------------------------------------------------------------------------
// WorkflowRepository impl
// ---------------------------------------------------------------------------

impl WorkflowRepository for SqliteWorkflowRepository {
    async fn create_workflow(&self, workflow: &Workflow) -> Result<(), RepositoryError> {
        let json = WorkflowJson::encode(workflow)?;

        sqlx::query(
            r#"INSERT INTO workflows
               (id, tenant_id, name, description, workflow_type, status, input_data,
                output_data, metadata, error, created_at, updated_at, started_at, completed_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(workflow.id.to_string())
        .bind(&workflow.tenant_id)
        .bind(&workflow.name)
        .bind(&workflow.description)
        .bind(&workflow.workflow_type)
        .bind(workflow.status.as_str())
        .bind(&json.input_data)
        .bind(&json.output_data)
        .bind(&json.metadata)
        .bind(&json.error)
        .bind(format_datetime(&workflow.created_at))
        .bind(format_datetime(&workflow.updated_at))
        .bind(workflow.started_at.as_ref().map(format_datetime))
        .bind(workflow.completed_at.as_ref().map(format_datetime))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| map_write_error(e, &format!("workflow {}", workflow.id)))?;

        Ok(())
    }

    async fn get_workflow(&self, id: &Uuid) -> Result<Option<Workflow>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM workflows WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r = WorkflowRow::from_row(&row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_workflow()?))
            }
            None => Ok(None),
        }
    }

    async fn update_workflow(&self, workflow: &Workflow) -> Result<(), RepositoryError> {
        let json = WorkflowJson::encode(workflow)?;

        // tenant_id and created_at are immutable and never rewritten.
        let result = sqlx::query(
            r#"UPDATE workflows SET
                 name = ?, description = ?, workflow_type = ?, status = ?,
                 input_data = ?, output_data = ?, metadata = ?, error = ?,
                 updated_at = ?, started_at = ?, completed_at = ?
               WHERE id = ?"#,
        )
        .bind(&workflow.name)
        .bind(&workflow.description)
        .bind(&workflow.workflow_type)
        .bind(workflow.status.as_str())
        .bind(&json.input_data)
        .bind(&json.output_data)
        .bind(&json.metadata)
        .bind(&json.error)
        .bind(format_datetime(&workflow.updated_at))
        .bind(workflow.started_at.as_ref().map(format_datetime))
        .bind(workflow.completed_at.as_ref().map(format_datetime))
        .bind(workflow.id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn find_workflows(
        &self,
        filter: &WorkflowFilter,
        limit: u32,
    ) -> Result<Vec<Workflow>, RepositoryError> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM workflows WHERE 1 = 1");

        if let Some(tenant_id) = &filter.tenant_id {
            query.push(" AND tenant_id = ").push_bind(tenant_id.clone());
        }
        if let Some(workflow_type) = &filter.workflow_type {
            query.push(" AND workflow_type = ").push_bind(workflow_type.clone());
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(after) = &filter.created_after {
            query.push(" AND created_at >= ").push_bind(format_datetime(after));
        }
        if let Some(before) = &filter.created_before {
            query.push(" AND created_at <= ").push_bind(format_datetime(before));
        }
        query
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(i64::from(limit));

        let rows = query
            .build()
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut workflows = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = WorkflowRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            workflows.push(r.into_workflow()?);
        }
        Ok(workflows)
    }

    async fn create_step(&self, step: &Step) -> Result<(), RepositoryError> {
        let json = StepJson::encode(step)?;

        sqlx::query(
            r#"INSERT INTO steps
               (id, workflow_id, name, description, agent_type, task_data, dependencies,
                status, created_at, updated_at, scheduled_at, started_at, completed_at,
                timeout_seconds, max_retries, retry_interval_seconds, retry_count, result, error,
                skipped_by)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(step.id.to_string())
        .bind(step.workflow_id.to_string())
        .bind(&step.name)
        .bind(&step.description)
        .bind(&step.agent_type)
        .bind(&json.task_data)
        .bind(&json.dependencies)
        .bind(step.status.as_str())
        .bind(format_datetime(&step.created_at))
        .bind(format_datetime(&step.updated_at))
        .bind(step.scheduled_at.as_ref().map(format_datetime))
        .bind(step.started_at.as_ref().map(format_datetime))
        .bind(step.completed_at.as_ref().map(format_datetime))
        .bind(json.timeout_seconds)
        .bind(i64::from(step.retry_config.max_retries))
        .bind(json.retry_interval_seconds)
        .bind(i64::from(step.retry_count))
        .bind(&json.result)
        .bind(&step.error)
        .bind(step.skipped_by.map(|id| id.to_string()))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| map_write_error(e, &format!("step {}", step.id)))?;

        Ok(())
    }

    async fn get_step(&self, id: &Uuid) -> Result<Option<Step>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM steps WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r = StepRow::from_row(&row).map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_step()?))
            }
            None => Ok(None),
        }
    }

    async fn update_step(&self, step: &Step) -> Result<(), RepositoryError> {
        let json = StepJson::encode(step)?;

        // workflow_id and created_at never change after insert.
        let result = sqlx::query(
            r#"UPDATE steps SET
                 name = ?, description = ?, agent_type = ?, task_data = ?, dependencies = ?,
                 status = ?, updated_at = ?, scheduled_at = ?, started_at = ?, completed_at = ?,
                 timeout_seconds = ?, max_retries = ?, retry_interval_seconds = ?,
                 retry_count = ?, result = ?, error = ?, skipped_by = ?
               WHERE id = ?"#,
        )
        .bind(&step.name)
        .bind(&step.description)
        .bind(&step.agent_type)
        .bind(&json.task_data)
        .bind(&json.dependencies)
        .bind(step.status.as_str())
        .bind(format_datetime(&step.updated_at))
        .bind(step.scheduled_at.as_ref().map(format_datetime))
        .bind(step.started_at.as_ref().map(format_datetime))
        .bind(step.completed_at.as_ref().map(format_datetime))
        .bind(json.timeout_seconds)
        .bind(i64::from(step.retry_config.max_retries))
        .bind(json.retry_interval_seconds)
        .bind(i64::from(step.retry_count))
        .bind(&json.result)
        .bind(&step.error)
        .bind(step.skipped_by.map(|id| id.to_string()))
        .bind(step.id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn list_steps(&self, workflow_id: &Uuid) -> Result<Vec<Step>, RepositoryError> {
        let rows =
            sqlx::query("SELECT * FROM steps WHERE workflow_id = ? ORDER BY created_at ASC, id ASC")
                .bind(workflow_id.to_string())
                .fetch_all(&self.pool.reader)
                .await
                .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut steps = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = StepRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            steps.push(r.into_step()?);
        }
        Ok(steps)
    }
}
