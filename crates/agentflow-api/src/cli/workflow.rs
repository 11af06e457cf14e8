//! CLI workflow subcommands.
//!
//! Create, start, cancel, show, list, and diagnose workflows.

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde_json::Value;
use uuid::Uuid;

use agentflow_types::workflow::{NewWorkflow, Step, Workflow, WorkflowFilter, WorkflowStatus};

use super::{parse_json_object, print_json, step_status_cell, workflow_status_cell};
use crate::state::AppState;

/// Workflow management subcommands.
#[derive(Subcommand)]
pub enum WorkflowCommand {
    /// Create a workflow (status `created`).
    Create {
        /// Human-readable name.
        #[arg(long)]
        name: String,

        /// Category label used for routing and reporting.
        #[arg(long = "type")]
        workflow_type: String,

        /// Owning tenant.
        #[arg(long)]
        tenant: String,

        #[arg(long, default_value = "")]
        description: String,

        /// Input visible to every step, as a JSON object.
        #[arg(long, value_parser = parse_json_object)]
        input: Option<HashMap<String, Value>>,

        /// Free-form metadata, as a JSON object.
        #[arg(long, value_parser = parse_json_object)]
        metadata: Option<HashMap<String, Value>>,
    },

    /// Start a created workflow and admit its root steps.
    Start { id: Uuid },

    /// Cancel a workflow that has not finished.
    Cancel { id: Uuid },

    /// Show a workflow and its steps.
    Show { id: Uuid },

    /// List a workflow's steps in creation order.
    Steps { id: Uuid },

    /// Search workflows, newest first.
    #[command(alias = "ls")]
    List {
        #[arg(long)]
        tenant: Option<String>,

        #[arg(long = "type")]
        workflow_type: Option<String>,

        /// One of created, running, waiting, completed, failed, cancelled.
        #[arg(long)]
        status: Option<WorkflowStatus>,

        /// Only workflows created at or after this RFC 3339 time.
        #[arg(long)]
        after: Option<DateTime<Utc>>,

        /// Only workflows created at or before this RFC 3339 time.
        #[arg(long)]
        before: Option<DateTime<Utc>>,

        #[arg(long)]
        limit: Option<u32>,
    },

    /// Explain where a workflow stands: counts, blocked steps, stuck flag.
    Diagnose { id: Uuid },

    /// Re-run admission for a workflow's ready steps.
    Schedule { id: Uuid },
}

/// Handle a workflow subcommand.
pub async fn handle_workflow_command(
    cmd: WorkflowCommand,
    state: &AppState,
    json: bool,
) -> Result<()> {
    match cmd {
        WorkflowCommand::Create {
            name,
            workflow_type,
            tenant,
            description,
            input,
            metadata,
        } => {
            let request = NewWorkflow {
                name,
                description,
                workflow_type,
                tenant_id: tenant,
                input_data: input.unwrap_or_default(),
                metadata: metadata.unwrap_or_default(),
            };
            let workflow = state.engine.create_workflow(request).await?;
            report(&workflow, "Created", json)
        }
        WorkflowCommand::Start { id } => {
            let workflow = state.engine.start_workflow(&id).await?;
            report(&workflow, "Started", json)
        }
        WorkflowCommand::Cancel { id } => {
            let workflow = state.engine.cancel_workflow(&id).await?;
            report(&workflow, "Cancelled", json)
        }
        WorkflowCommand::Show { id } => handle_show(&id, state, json).await,
        WorkflowCommand::Steps { id } => {
            // Fail with a missing reference rather than an empty list.
            state.engine.get_workflow(&id).await?;
            let steps = state.engine.list_steps(&id).await?;
            if json {
                return print_json(&steps);
            }
            print_steps(&steps);
            Ok(())
        }
        WorkflowCommand::List {
            tenant,
            workflow_type,
            status,
            after,
            before,
            limit,
        } => {
            let filter = WorkflowFilter {
                tenant_id: tenant,
                workflow_type,
                status,
                created_after: after,
                created_before: before,
                limit,
            };
            handle_list(&filter, state, json).await
        }
        WorkflowCommand::Diagnose { id } => handle_diagnose(&id, state, json).await,
        WorkflowCommand::Schedule { id } => {
            let scheduled = state.engine.schedule_ready_steps(&id).await?;
            if json {
                return print_json(&scheduled);
            }
            println!();
            println!(
                "  {} {} step(s) scheduled",
                style("*").green().bold(),
                scheduled.len()
            );
            for step in &scheduled {
                println!("    {} {}", style(&step.name).cyan(), style(step.id).dim());
            }
            println!();
            Ok(())
        }
    }
}

fn report(workflow: &Workflow, verb: &str, json: bool) -> Result<()> {
    if json {
        return print_json(workflow);
    }
    println!();
    println!(
        "  {} {verb} workflow '{}'",
        style("*").green().bold(),
        style(&workflow.name).cyan()
    );
    println!("  ID:     {}", workflow.id);
    println!("  Status: {}", workflow.status);
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Show
// ---------------------------------------------------------------------------

async fn handle_show(id: &Uuid, state: &AppState, json: bool) -> Result<()> {
    let workflow = state.engine.get_workflow(id).await?;
    let steps = state.engine.list_steps(id).await?;

    if json {
        return print_json(&serde_json::json!({
            "workflow": workflow,
            "steps": steps,
        }));
    }

    println!();
    println!(
        "  {} ({})",
        style(&workflow.name).cyan().bold(),
        workflow.workflow_type
    );
    println!("  ID:      {}", workflow.id);
    println!("  Tenant:  {}", workflow.tenant_id);
    println!("  Status:  {}", workflow.status);
    println!("  Created: {}", workflow.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    if let Some(started) = workflow.started_at {
        println!("  Started: {}", started.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(done) = workflow.completed_at {
        println!("  Done:    {}", done.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(errors) = &workflow.error {
        println!();
        println!("  {}", style("Errors").red().bold());
        for (step_id, message) in errors {
            println!("    {step_id}: {message}");
        }
    }
    println!();

    print_steps(&steps);
    Ok(())
}

fn print_steps(steps: &[Step]) {
    if steps.is_empty() {
        println!("  {}", style("No steps.").dim());
        println!();
        return;
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Step").fg(Color::White),
        Cell::new("ID").fg(Color::White),
        Cell::new("Agent").fg(Color::White),
        Cell::new("Status").fg(Color::White),
        Cell::new("Deps").fg(Color::White),
        Cell::new("Retries").fg(Color::White),
    ]);
    for step in steps {
        table.add_row(vec![
            Cell::new(&step.name).fg(Color::Cyan),
            Cell::new(step.id.to_string()),
            Cell::new(&step.agent_type),
            step_status_cell(step.status),
            Cell::new(step.dependencies.len().to_string()),
            Cell::new(format!(
                "{}/{}",
                step.retry_count, step.retry_config.max_retries
            )),
        ]);
    }
    println!("{table}");
    println!();
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

async fn handle_list(filter: &WorkflowFilter, state: &AppState, json: bool) -> Result<()> {
    let workflows = state.engine.find_workflows(filter).await?;

    if json {
        return print_json(&workflows);
    }

    if workflows.is_empty() {
        println!();
        println!("  {}", style("No workflows found.").dim());
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Name").fg(Color::White),
        Cell::new("ID").fg(Color::White),
        Cell::new("Type").fg(Color::White),
        Cell::new("Tenant").fg(Color::White),
        Cell::new("Status").fg(Color::White),
        Cell::new("Created").fg(Color::White),
    ]);
    for workflow in &workflows {
        table.add_row(vec![
            Cell::new(&workflow.name).fg(Color::Cyan),
            Cell::new(workflow.id.to_string()),
            Cell::new(&workflow.workflow_type),
            Cell::new(&workflow.tenant_id),
            workflow_status_cell(workflow.status),
            Cell::new(workflow.created_at.format("%Y-%m-%d %H:%M").to_string()),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Diagnose
// ---------------------------------------------------------------------------

async fn handle_diagnose(id: &Uuid, state: &AppState, json: bool) -> Result<()> {
    let diagnosis = state.engine.diagnose(id).await?;

    if json {
        return print_json(&diagnosis);
    }

    println!();
    println!("  Workflow {} is {}", style(id).cyan(), diagnosis.status);
    println!(
        "  Steps: {} total, {} pending, {} in flight, {} completed, {} failed, {} skipped",
        diagnosis.total_steps,
        diagnosis.pending,
        diagnosis.in_flight,
        diagnosis.completed,
        diagnosis.failed,
        diagnosis.skipped
    );

    if diagnosis.stuck {
        println!();
        println!(
            "  {} No step can make progress; retry or skip a failed step.",
            style("!").yellow().bold()
        );
    }

    if !diagnosis.blocked.is_empty() {
        println!();
        println!("  {}", style("Blocked").yellow().bold());
        for blocked in &diagnosis.blocked {
            let blockers: Vec<String> = blocked.blocked_by.iter().map(Uuid::to_string).collect();
            println!(
                "    {} ({}) <- {}",
                style(&blocked.name).cyan(),
                blocked.step_id,
                blockers.join(", ")
            );
        }
    }
    println!();
    Ok(())
}
