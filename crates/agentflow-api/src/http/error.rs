//! Application error type mapping to HTTP status codes and envelope format.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use agentflow_types::error::{RepositoryError, WorkflowError};

use super::response::{ApiResponse, RequestTimer};

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Registry/scheduler errors.
    Workflow(WorkflowError),
    /// Malformed request (bad query parameter, unparsable ID, ...).
    Validation(String),
    /// Generic internal error.
    Internal(String),
}

impl From<WorkflowError> for AppError {
    fn from(e: WorkflowError) -> Self {
        AppError::Workflow(e)
    }
}

impl From<RepositoryError> for AppError {
    fn from(e: RepositoryError) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Workflow(WorkflowError::MissingReference(_)) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND")
            }
            AppError::Workflow(WorkflowError::StateConflict(_)) => {
                (StatusCode::CONFLICT, "STATE_CONFLICT")
            }
            AppError::Workflow(WorkflowError::RetryExhausted { .. }) => {
                (StatusCode::CONFLICT, "RETRY_EXHAUSTED")
            }
            AppError::Workflow(WorkflowError::CycleDetected(_)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "CYCLE_DETECTED")
            }
            AppError::Workflow(WorkflowError::InvalidInput(_)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR")
            }
            AppError::Workflow(WorkflowError::Storage(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR")
            }
            AppError::Workflow(WorkflowError::Transport(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "TRANSPORT_ERROR")
            }
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::Workflow(e) => e.to_string(),
            AppError::Validation(msg) | AppError::Internal(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.parts();
        let message = self.message();
        if status.is_server_error() {
            tracing::error!(code, %message, "request failed");
        }

        let body = ApiResponse::error(code, &message, &RequestTimer::start());
        (status, Json(body)).into_response()
    }
}
