//! Step handlers: inspection, agent progress reports, and operator
//! interventions (retry, skip).

use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use agentflow_types::workflow::{Step, StepOutcome};

use crate::http::error::AppError;
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

fn step_response(step: Step, timer: &RequestTimer) -> Json<ApiResponse<Step>> {
    let (id, workflow_id) = (step.id, step.workflow_id);
    Json(
        ApiResponse::success(step, timer)
            .with_link("self", &format!("/api/v1/steps/{id}"))
            .with_link("workflow", &format!("/api/v1/workflows/{workflow_id}")),
    )
}

/// GET /api/v1/steps/{id}
pub async fn get_step(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Step>>, AppError> {
    let timer = RequestTimer::start();
    let step = state.engine.get_step(&id).await?;
    Ok(step_response(step, &timer))
}

/// POST /api/v1/steps/{id}/complete - Report a terminal outcome.
///
/// Body: `{"status": "completed", "result": {...}}` or
/// `{"status": "failed", "error": "..."}`.
pub async fn complete_step(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(outcome): Json<StepOutcome>,
) -> Result<Json<ApiResponse<Step>>, AppError> {
    let timer = RequestTimer::start();
    let step = state.engine.complete_step(&id, outcome).await?;
    Ok(step_response(step, &timer))
}

/// POST /api/v1/steps/{id}/running - An agent picked the task up.
pub async fn mark_running(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Step>>, AppError> {
    let timer = RequestTimer::start();
    let step = state.engine.mark_step_running(&id).await?;
    Ok(step_response(step, &timer))
}

/// POST /api/v1/steps/{id}/waiting - The agent is blocked on something external.
pub async fn mark_waiting(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Step>>, AppError> {
    let timer = RequestTimer::start();
    let step = state.engine.mark_step_waiting(&id).await?;
    Ok(step_response(step, &timer))
}

/// POST /api/v1/steps/{id}/retry
pub async fn retry_step(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Step>>, AppError> {
    let timer = RequestTimer::start();
    let step = state.engine.retry_step(&id).await?;
    Ok(step_response(step, &timer))
}

/// POST /api/v1/steps/{id}/skip
pub async fn skip_step(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Step>>, AppError> {
    let timer = RequestTimer::start();
    let step = state.engine.skip_step(&id).await?;
    Ok(step_response(step, &timer))
}
