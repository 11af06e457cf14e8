//! Infrastructure layer for agentflow.
//!
//! Contains implementations of the ports defined in `agentflow-core`:
//! SQLite workflow and event storage, plus data-directory and `config.toml`
//! resolution.

pub mod config;
pub mod filesystem;
pub mod sqlite;
