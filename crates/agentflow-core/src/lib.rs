//! Workflow orchestration logic and port definitions for agentflow.
//!
//! This crate defines the "ports" (repository and event traits) that the
//! infrastructure layer implements, plus the registry, scheduler, and engine
//! that drive workflows through them. It depends only on `agentflow-types`
//! -- never on `agentflow-infra` or any database/IO crate.

pub mod event;
pub mod repository;
pub mod workflow;
