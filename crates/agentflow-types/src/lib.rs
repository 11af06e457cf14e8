//! Shared domain types for agentflow.
//!
//! This crate contains the domain types used across the workspace: Workflow,
//! Step, their status enums, lifecycle events, engine configuration, and the
//! associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod event;
pub mod workflow;
