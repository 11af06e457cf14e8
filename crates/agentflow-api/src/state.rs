//! Application state wiring the engine to its infrastructure.
//!
//! `AppState` pins the generic `WorkflowEngine` to the SQLite repository and
//! the in-process broadcast bus, and starts the background consumers of that
//! bus: the event recorder and the logging dispatcher.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use agentflow_core::event::{EventBus, EventDispatcher, handler_fn, spawn_recorder};
use agentflow_core::workflow::WorkflowEngine;
use agentflow_infra::sqlite::event::SqliteEventStore;
use agentflow_infra::sqlite::pool::{DatabasePool, database_url};
use agentflow_infra::sqlite::workflow::SqliteWorkflowRepository;
use agentflow_types::config::EngineConfig;
use agentflow_types::event::{
    TASK_CREATED, WORKFLOW_CANCELLED, WORKFLOW_COMPLETED, WORKFLOW_FAILED, WorkflowEvent,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// The engine pinned to the concrete infra implementations.
pub type ConcreteEngine = WorkflowEngine<SqliteWorkflowRepository, EventBus>;

/// Shared application state used by both CLI commands and REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ConcreteEngine>,
    pub event_store: Arc<SqliteEventStore>,
    pub config: Arc<EngineConfig>,
    pub data_dir: PathBuf,
}

/// Bus consumers started alongside the state.
///
/// They stop on their own once every `AppState` clone (and with it the last
/// bus sender) is dropped, after draining what was already published.
pub struct BackgroundTasks {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl AppState {
    /// Open (creating if needed) the database in `data_dir` and wire the
    /// engine with `config`.
    pub async fn open(
        data_dir: &Path,
        config: EngineConfig,
    ) -> anyhow::Result<(Self, BackgroundTasks)> {
        let db_pool = DatabasePool::new(&database_url(data_dir)).await?;

        let bus = Arc::new(EventBus::new(config.event_capacity));
        let repo = Arc::new(SqliteWorkflowRepository::new(db_pool.clone()));
        let event_store = Arc::new(SqliteEventStore::new(db_pool));
        let engine = Arc::new(WorkflowEngine::new(repo, bus.clone(), &config));

        let cancel = CancellationToken::new();
        let recorder = spawn_recorder(&bus, event_store.clone(), cancel.clone());
        let dispatcher = Arc::new(logging_dispatcher()).spawn(&bus, cancel.clone());
        // The engine keeps its own Arc; drop ours so the bus closes with the state.
        drop(bus);

        let state = Self {
            engine,
            event_store,
            config: Arc::new(config),
            data_dir: data_dir.to_path_buf(),
        };
        let background = BackgroundTasks {
            cancel,
            handles: vec![recorder, dispatcher],
        };
        Ok((state, background))
    }
}

impl BackgroundTasks {
    /// Wait for the consumers to drain, cancelling them after `grace`.
    pub async fn shutdown(self, grace: Duration) {
        let cancel = self.cancel.clone();
        let drained = async {
            for handle in self.handles {
                if let Err(e) = handle.await {
                    tracing::warn!(error = %e, "background task panicked");
                }
            }
        };
        tokio::pin!(drained);

        tokio::select! {
            _ = &mut drained => {}
            _ = tokio::time::sleep(grace) => {
                tracing::warn!("background tasks did not drain in time, cancelling");
                cancel.cancel();
                drained.await;
            }
        }
    }
}

/// Log lifecycle milestones at info level.
fn logging_dispatcher() -> EventDispatcher {
    let dispatcher = EventDispatcher::new();

    dispatcher.subscribe(
        &[WORKFLOW_COMPLETED, WORKFLOW_FAILED, WORKFLOW_CANCELLED],
        handler_fn(|envelope| async move {
            tracing::info!(
                workflow_id = %envelope.correlation_id,
                event_type = %envelope.event_type,
                "workflow finished"
            );
            Ok(())
        }),
    );

    dispatcher.subscribe(
        &[TASK_CREATED],
        handler_fn(|envelope| async move {
            if let WorkflowEvent::TaskCreated(task) = &envelope.payload {
                tracing::info!(
                    workflow_id = %task.workflow_id,
                    step_id = %task.step_id,
                    agent_type = %task.agent_type,
                    attempt = task.attempt,
                    "task ready for an agent"
                );
            }
            Ok(())
        }),
    );

    dispatcher
}
