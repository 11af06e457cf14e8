//! `agentflow events`: read back the recorded event stream.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use uuid::Uuid;

use agentflow_core::repository::event::EventStore;
use agentflow_types::event::EventQuery;

use super::print_json;
use crate::state::AppState;

#[derive(Args)]
pub struct EventsArgs {
    /// Only events of this workflow.
    #[arg(long)]
    pub workflow: Option<Uuid>,

    /// Only these event types (repeatable), e.g. `task.created`.
    #[arg(long = "type")]
    pub event_types: Vec<String>,

    #[arg(long)]
    pub since: Option<DateTime<Utc>>,

    #[arg(long)]
    pub until: Option<DateTime<Utc>>,

    #[arg(long, default_value = "50")]
    pub limit: u32,
}

pub async fn handle_events(args: EventsArgs, state: &AppState, json: bool) -> Result<()> {
    let query = EventQuery {
        event_types: args.event_types,
        correlation_id: args.workflow,
        since: args.since,
        until: args.until,
        limit: args.limit,
    };
    let events = state.event_store.history(&query).await?;

    if json {
        return print_json(&events);
    }

    if events.is_empty() {
        println!();
        println!("  {}", style("No events recorded.").dim());
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Time").fg(Color::White),
        Cell::new("Type").fg(Color::White),
        Cell::new("Workflow").fg(Color::White),
        Cell::new("Event ID").fg(Color::White),
    ]);
    for event in &events {
        table.add_row(vec![
            Cell::new(event.timestamp.format("%Y-%m-%d %H:%M:%S%.3f").to_string()),
            Cell::new(&event.event_type).fg(Color::Cyan),
            Cell::new(event.correlation_id.to_string()),
            Cell::new(event.id.to_string()).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}
