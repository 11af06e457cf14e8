//! Recorded event history.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use agentflow_core::repository::event::EventStore;
use agentflow_types::event::{EventEnvelope, EventQuery};

use crate::http::error::AppError;
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

/// Query parameters for event listing.
#[derive(Debug, Deserialize, Default)]
pub struct EventsParams {
    /// Comma-separated event types (`workflow.completed,task.created`).
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub workflow_id: Option<Uuid>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

impl EventsParams {
    fn into_query(self) -> EventQuery {
        let defaults = EventQuery::default();
        EventQuery {
            event_types: self
                .event_type
                .map(|types| {
                    types
                        .split(',')
                        .map(str::trim)
                        .filter(|t| !t.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            correlation_id: self.workflow_id,
            since: self.since,
            until: self.until,
            limit: self.limit.unwrap_or(defaults.limit),
        }
    }
}

/// GET /api/v1/events - Recorded events, newest first.
pub async fn list_events(
    State(state): State<AppState>,
    Query(params): Query<EventsParams>,
) -> Result<Json<ApiResponse<Vec<EventEnvelope>>>, AppError> {
    let timer = RequestTimer::start();
    let events = state.event_store.history(&params.into_query()).await?;
    Ok(Json(
        ApiResponse::success(events, &timer).with_link("self", "/api/v1/events"),
    ))
}

/// GET /api/v1/workflows/{id}/events - One workflow's event history.
pub async fn workflow_events(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<EventsParams>,
) -> Result<Json<ApiResponse<Vec<EventEnvelope>>>, AppError> {
    let timer = RequestTimer::start();
    let query = EventsParams {
        workflow_id: Some(id),
        ..params
    }
    .into_query();
    let events = state.event_store.history(&query).await?;
    Ok(Json(
        ApiResponse::success(events, &timer)
            .with_link("workflow", &format!("/api/v1/workflows/{id}")),
    ))
}
