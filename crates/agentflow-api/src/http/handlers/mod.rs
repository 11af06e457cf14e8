//! Route handlers, one module per resource.

pub mod event;
pub mod step;
pub mod workflow;
