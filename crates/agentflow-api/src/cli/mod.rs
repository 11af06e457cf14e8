//! CLI command definitions for the `agentflow` binary.
//!
//! Uses clap derive macros for argument parsing. Commands are grouped by
//! noun (`agentflow workflow create`, `agentflow step complete`).

pub mod event;
pub mod step;
pub mod workflow;

use std::collections::HashMap;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use comfy_table::{Cell, Color};
use serde::Serialize;
use serde_json::Value;

use agentflow_types::workflow::{StepStatus, WorkflowStatus};

/// Orchestrate multi-agent workflows as dependency graphs of steps.
#[derive(Parser)]
#[command(name = "agentflow", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create, start, cancel, and inspect workflows.
    #[command(alias = "wf")]
    Workflow {
        #[command(subcommand)]
        action: workflow::WorkflowCommand,
    },

    /// Attach steps and report step progress.
    Step {
        #[command(subcommand)]
        action: step::StepCommand,
    },

    /// Show recorded lifecycle events.
    Events(event::EventsArgs),

    /// Start the REST API server.
    Serve {
        /// Address to bind (defaults to `server.bind` from config.toml).
        #[arg(long)]
        bind: Option<String>,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

/// clap value parser for a JSON object argument.
pub(crate) fn parse_json_object(s: &str) -> Result<HashMap<String, Value>, String> {
    serde_json::from_str(s).map_err(|e| format!("expected a JSON object: {e}"))
}

/// clap value parser for any JSON value.
pub(crate) fn parse_json_value(s: &str) -> Result<Value, String> {
    serde_json::from_str(s).map_err(|e| format!("invalid JSON: {e}"))
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn workflow_status_cell(status: WorkflowStatus) -> Cell {
    let color = match status {
        WorkflowStatus::Created | WorkflowStatus::Scheduled => Color::White,
        WorkflowStatus::Running => Color::Cyan,
        WorkflowStatus::Waiting => Color::Yellow,
        WorkflowStatus::Completed => Color::Green,
        WorkflowStatus::Failed => Color::Red,
        WorkflowStatus::Cancelled => Color::DarkGrey,
    };
    Cell::new(status.as_str()).fg(color)
}

pub(crate) fn step_status_cell(status: StepStatus) -> Cell {
    let color = match status {
        StepStatus::Pending => Color::White,
        StepStatus::Scheduled | StepStatus::Running => Color::Cyan,
        StepStatus::Waiting => Color::Yellow,
        StepStatus::Completed => Color::Green,
        StepStatus::Failed => Color::Red,
        StepStatus::Skipped => Color::DarkGrey,
    };
    Cell::new(status.as_str()).fg(color)
}
