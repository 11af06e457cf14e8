//! agentflow CLI and REST API entry point.
//!
//! Binary name: `agentflow`
//!
//! Parses CLI arguments, opens the database and engine, then dispatches to
//! the command handler or starts the REST API server.

mod cli;
mod http;
mod state;

use std::time::Duration;

use clap::Parser;
use clap_complete::generate;

use agentflow_infra::config::load_engine_config;
use agentflow_infra::filesystem::{ensure_data_dir, resolve_data_dir};
use agentflow_observe::tracing_setup::{
    TracingOptions, filter_for_verbosity, init_tracing, shutdown_tracing,
};
use agentflow_types::config::LoggingConfig;
use cli::{Cli, Commands};
use state::AppState;

/// How long background event consumers get to drain on exit.
const DRAIN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "agentflow", &mut std::io::stdout());
        return Ok(());
    }

    let data_dir = resolve_data_dir();
    ensure_data_dir(&data_dir).await?;
    let config = load_engine_config(&data_dir).await;
    init_logging(&cli, &config.logging);

    let (state, background) = AppState::open(&data_dir, config).await?;

    let result = run(cli, state).await;

    background.shutdown(DRAIN_GRACE).await;
    shutdown_tracing();
    result
}

fn init_logging(cli: &Cli, logging: &LoggingConfig) {
    let options = TracingOptions {
        json: logging.json,
        otel: logging.otel,
        default_filter: filter_for_verbosity(cli.verbose, cli.quiet).to_string(),
    };
    if let Err(e) = init_tracing(&options) {
        eprintln!("Warning: failed to initialize tracing: {e}");
    }
}

/// Run one command. `state` is consumed so the event bus closes when the
/// command finishes.
async fn run(cli: Cli, state: AppState) -> anyhow::Result<()> {
    match cli.command {
        Commands::Workflow { action } => {
            cli::workflow::handle_workflow_command(action, &state, cli.json).await
        }
        Commands::Step { action } => cli::step::handle_step_command(action, &state, cli.json).await,
        Commands::Events(args) => cli::event::handle_events(args, &state, cli.json).await,
        Commands::Serve { bind } => {
            let addr = bind.unwrap_or_else(|| state.config.server.bind.clone());
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            tracing::info!(%addr, data_dir = %state.data_dir.display(), "API server listening");

            if !cli.quiet {
                println!(
                    "  {} agentflow API listening on {}",
                    console::style("*").green().bold(),
                    console::style(format!("http://{addr}")).cyan()
                );
                println!("  {}", console::style("Press Ctrl+C to stop").dim());
            }

            let router = http::router::build_router(state);
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            if !cli.quiet {
                println!("\n  Server stopped.");
            }
            Ok(())
        }
        Commands::Completions { .. } => Ok(()),
    }
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
