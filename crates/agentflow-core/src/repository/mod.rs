//! Repository trait definitions (ports).
//!
//! These traits define the storage interface that the infrastructure layer
//! (agentflow-infra) implements. The core crate never depends on any
//! specific storage technology.

pub mod event;
pub mod workflow;

#[cfg(test)]
pub(crate) mod memory;
