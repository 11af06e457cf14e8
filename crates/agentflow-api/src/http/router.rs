//! Axum router configuration with middleware.
//!
//! All resource routes are under `/api/v1/`; `/health` sits at the root.
//! Middleware: CORS, request tracing.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Workflows
        .route(
            "/workflows",
            post(handlers::workflow::create_workflow).get(handlers::workflow::list_workflows),
        )
        .route("/workflows/{id}", get(handlers::workflow::get_workflow))
        .route("/workflows/{id}/start", post(handlers::workflow::start_workflow))
        .route("/workflows/{id}/cancel", post(handlers::workflow::cancel_workflow))
        .route(
            "/workflows/{id}/diagnosis",
            get(handlers::workflow::diagnose_workflow),
        )
        .route(
            "/workflows/{id}/schedule",
            post(handlers::workflow::schedule_workflow),
        )
        .route(
            "/workflows/{id}/steps",
            get(handlers::workflow::list_steps).post(handlers::workflow::add_step),
        )
        .route("/workflows/{id}/events", get(handlers::event::workflow_events))
        // Steps
        .route("/steps/{id}", get(handlers::step::get_step))
        .route("/steps/{id}/complete", post(handlers::step::complete_step))
        .route("/steps/{id}/running", post(handlers::step::mark_running))
        .route("/steps/{id}/waiting", post(handlers::step::mark_waiting))
        .route("/steps/{id}/retry", post(handlers::step::retry_step))
        .route("/steps/{id}/skip", post(handlers::step::skip_step))
        // Event history
        .route("/events", get(handlers::event::list_events));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Liveness probe.
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
