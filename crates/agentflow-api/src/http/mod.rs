//! HTTP/REST API layer for agentflow.
//!
//! Axum-based REST API at `/api/v1/` with an envelope response format and
//! CORS support. Agents report step outcomes through the same API that
//! callers use to create and start workflows.

pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
