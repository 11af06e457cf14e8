//! Observability setup shared by the agentflow binaries.

pub mod tracing_setup;
