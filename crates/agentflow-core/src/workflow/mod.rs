//! Workflow orchestration core.
//!
//! - `engine` -- public facade; owns the per-workflow critical sections
//! - `registry` -- workflow records and lifecycle transitions
//! - `scheduler` -- step records, admission control, completion evaluation
//! - `completion` -- pure roll-up of step outcomes into a workflow outcome
//! - `dag` -- petgraph cycle detection and reachability over steps
//! - `lock` -- per-workflow async mutex table

pub mod completion;
pub mod dag;
pub mod engine;
pub mod lock;
mod registry;
mod scheduler;

pub use engine::WorkflowEngine;
pub use lock::WorkflowLocks;
