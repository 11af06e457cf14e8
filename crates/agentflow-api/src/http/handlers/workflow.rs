//! Workflow lifecycle handlers for the REST API.
//!
//! Create, start, cancel, inspect, and search workflows; attach steps and
//! diagnose progress.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use agentflow_types::workflow::{
    NewStep, NewWorkflow, Step, Workflow, WorkflowDiagnosis, WorkflowFilter,
};

use crate::http::error::AppError;
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

fn workflow_links(resp: ApiResponse<Workflow>, id: Uuid) -> ApiResponse<Workflow> {
    resp.with_link("self", &format!("/api/v1/workflows/{id}"))
        .with_link("steps", &format!("/api/v1/workflows/{id}/steps"))
        .with_link("events", &format!("/api/v1/workflows/{id}/events"))
}

/// POST /api/v1/workflows - Create a workflow in `created` status.
pub async fn create_workflow(
    State(state): State<AppState>,
    Json(body): Json<NewWorkflow>,
) -> Result<(StatusCode, Json<ApiResponse<Workflow>>), AppError> {
    let timer = RequestTimer::start();
    let workflow = state.engine.create_workflow(body).await?;
    let id = workflow.id;
    let resp = workflow_links(ApiResponse::success(workflow, &timer), id);
    Ok((StatusCode::CREATED, Json(resp)))
}

/// GET /api/v1/workflows - Filtered search, newest first.
///
/// Query parameters mirror `WorkflowFilter`: `tenant_id`, `type`, `status`,
/// `created_after`, `created_before`, `limit`.
pub async fn list_workflows(
    State(state): State<AppState>,
    Query(filter): Query<WorkflowFilter>,
) -> Result<Json<ApiResponse<Vec<Workflow>>>, AppError> {
    let timer = RequestTimer::start();
    let workflows = state.engine.find_workflows(&filter).await?;
    Ok(Json(
        ApiResponse::success(workflows, &timer).with_link("self", "/api/v1/workflows"),
    ))
}

/// GET /api/v1/workflows/{id}
pub async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Workflow>>, AppError> {
    let timer = RequestTimer::start();
    let workflow = state.engine.get_workflow(&id).await?;
    Ok(Json(workflow_links(ApiResponse::success(workflow, &timer), id)))
}

/// POST /api/v1/workflows/{id}/start - Begin execution and admit root steps.
pub async fn start_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Workflow>>, AppError> {
    let timer = RequestTimer::start();
    let workflow = state.engine.start_workflow(&id).await?;
    Ok(Json(workflow_links(ApiResponse::success(workflow, &timer), id)))
}

/// POST /api/v1/workflows/{id}/cancel
pub async fn cancel_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Workflow>>, AppError> {
    let timer = RequestTimer::start();
    let workflow = state.engine.cancel_workflow(&id).await?;
    Ok(Json(workflow_links(ApiResponse::success(workflow, &timer), id)))
}

/// GET /api/v1/workflows/{id}/diagnosis - Step counts, blocked steps, stuck flag.
pub async fn diagnose_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<WorkflowDiagnosis>>, AppError> {
    let timer = RequestTimer::start();
    let diagnosis = state.engine.diagnose(&id).await?;
    Ok(Json(
        ApiResponse::success(diagnosis, &timer)
            .with_link("workflow", &format!("/api/v1/workflows/{id}")),
    ))
}

/// POST /api/v1/workflows/{id}/schedule - Re-run admission; returns newly
/// scheduled steps.
pub async fn schedule_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<Step>>>, AppError> {
    let timer = RequestTimer::start();
    let scheduled = state.engine.schedule_ready_steps(&id).await?;
    Ok(Json(ApiResponse::success(scheduled, &timer)))
}

/// GET /api/v1/workflows/{id}/steps - All steps in creation order.
pub async fn list_steps(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<Step>>>, AppError> {
    let timer = RequestTimer::start();
    // Distinguish an unknown workflow from one without steps.
    state.engine.get_workflow(&id).await?;
    let steps = state.engine.list_steps(&id).await?;
    Ok(Json(
        ApiResponse::success(steps, &timer)
            .with_link("self", &format!("/api/v1/workflows/{id}/steps")),
    ))
}

/// POST /api/v1/workflows/{id}/steps - Attach a step.
pub async fn add_step(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<NewStep>,
) -> Result<(StatusCode, Json<ApiResponse<Step>>), AppError> {
    let timer = RequestTimer::start();
    let step = state.engine.add_step(&id, body).await?;
    let resp = ApiResponse::success(step, &timer)
        .with_link("workflow", &format!("/api/v1/workflows/{id}"));
    Ok((StatusCode::CREATED, Json(resp)))
}
