//! CLI step subcommands.
//!
//! Attach steps to a workflow and drive them the way an agent would:
//! mark running or waiting, then complete or fail. Operators retry and skip.

use std::collections::HashMap;

use anyhow::Result;
use clap::Subcommand;
use console::style;
use serde_json::Value;
use uuid::Uuid;

use agentflow_types::workflow::{NewStep, RetryConfig, Step, StepOutcome};

use super::{parse_json_object, parse_json_value, print_json};
use crate::state::AppState;

/// Step subcommands.
#[derive(Subcommand)]
pub enum StepCommand {
    /// Attach a step to a workflow.
    Add {
        /// Owning workflow.
        workflow_id: Uuid,

        #[arg(long)]
        name: String,

        /// Kind of agent that should execute the step.
        #[arg(long)]
        agent_type: String,

        #[arg(long, default_value = "")]
        description: String,

        /// Step parameters, as a JSON object.
        #[arg(long, value_parser = parse_json_object)]
        task: Option<HashMap<String, Value>>,

        /// Step that must complete first (repeatable).
        #[arg(long = "depends-on")]
        depends_on: Vec<Uuid>,

        /// Advisory timeout forwarded to the agent.
        #[arg(long)]
        timeout: Option<u64>,

        /// Retry budget (defaults to the engine config).
        #[arg(long)]
        max_retries: Option<u32>,

        /// Suggested delay between retries, in seconds.
        #[arg(long, requires = "max_retries")]
        retry_interval: Option<u64>,
    },

    /// Show one step.
    Show { id: Uuid },

    /// Report a successful outcome.
    Complete {
        id: Uuid,

        /// Result payload, as JSON.
        #[arg(long, value_parser = parse_json_value)]
        result: Option<Value>,
    },

    /// Report a failed outcome.
    Fail {
        id: Uuid,

        #[arg(long)]
        error: String,

        /// Partial result payload, as JSON.
        #[arg(long, value_parser = parse_json_value)]
        result: Option<Value>,
    },

    /// Mark a scheduled step as picked up by an agent.
    Running { id: Uuid },

    /// Mark an in-flight step as waiting on something external.
    Waiting { id: Uuid },

    /// Re-admit a failed step.
    Retry { id: Uuid },

    /// Skip a pending or failed step.
    Skip { id: Uuid },
}

/// Handle a step subcommand.
pub async fn handle_step_command(cmd: StepCommand, state: &AppState, json: bool) -> Result<()> {
    match cmd {
        StepCommand::Add {
            workflow_id,
            name,
            agent_type,
            description,
            task,
            depends_on,
            timeout,
            max_retries,
            retry_interval,
        } => {
            let retry_config = max_retries.map(|max_retries| RetryConfig {
                max_retries,
                retry_interval_seconds: retry_interval
                    .unwrap_or(state.config.default_retry.retry_interval_seconds),
            });
            let request = NewStep {
                name,
                description,
                agent_type,
                task_data: task.unwrap_or_default(),
                dependencies: depends_on,
                timeout_seconds: timeout,
                retry_config,
            };
            let step = state.engine.add_step(&workflow_id, request).await?;
            report(&step, "Added", json)
        }
        StepCommand::Show { id } => {
            let step = state.engine.get_step(&id).await?;
            if json {
                return print_json(&step);
            }
            show(&step);
            Ok(())
        }
        StepCommand::Complete { id, result } => {
            let outcome = StepOutcome::Completed {
                result: result.unwrap_or(Value::Null),
            };
            let step = state.engine.complete_step(&id, outcome).await?;
            report(&step, "Completed", json)
        }
        StepCommand::Fail { id, error, result } => {
            let step = state
                .engine
                .complete_step(&id, StepOutcome::Failed { error, result })
                .await?;
            report(&step, "Failed", json)
        }
        StepCommand::Running { id } => {
            let step = state.engine.mark_step_running(&id).await?;
            report(&step, "Running", json)
        }
        StepCommand::Waiting { id } => {
            let step = state.engine.mark_step_waiting(&id).await?;
            report(&step, "Waiting", json)
        }
        StepCommand::Retry { id } => {
            let step = state.engine.retry_step(&id).await?;
            report(&step, "Retried", json)
        }
        StepCommand::Skip { id } => {
            let step = state.engine.skip_step(&id).await?;
            report(&step, "Skipped", json)
        }
    }
}

fn report(step: &Step, verb: &str, json: bool) -> Result<()> {
    if json {
        return print_json(step);
    }
    println!();
    println!(
        "  {} {verb} step '{}'",
        style("*").green().bold(),
        style(&step.name).cyan()
    );
    println!("  ID:     {}", step.id);
    println!("  Status: {}", step.status);
    println!();
    Ok(())
}

fn show(step: &Step) {
    println!();
    println!("  {} ({})", style(&step.name).cyan().bold(), step.agent_type);
    println!("  ID:       {}", step.id);
    println!("  Workflow: {}", step.workflow_id);
    println!("  Status:   {}", step.status);
    println!(
        "  Retries:  {}/{} (every {}s)",
        step.retry_count, step.retry_config.max_retries, step.retry_config.retry_interval_seconds
    );
    if !step.dependencies.is_empty() {
        let deps: Vec<String> = step.dependencies.iter().map(Uuid::to_string).collect();
        println!("  Depends:  {}", deps.join(", "));
    }
    if let Some(timeout) = step.timeout_seconds {
        println!("  Timeout:  {timeout}s");
    }
    if let Some(result) = &step.result {
        println!("  Result:   {result}");
    }
    if let Some(error) = &step.error {
        println!("  Error:    {}", style(error).red());
    }
    if let Some(cause) = step.skipped_by {
        println!("  Skipped:  after step {cause} failed");
    }
    println!();
}
