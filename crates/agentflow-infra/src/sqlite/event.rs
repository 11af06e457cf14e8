//! SQLite event store.
//!
//! Persists every `EventEnvelope` published on the bus so the lifecycle of a
//! workflow can be replayed after the broadcast channel has moved on. The
//! full envelope is kept as JSON; the indexed columns exist for filtering.

use std::collections::HashMap;

use agentflow_core::repository::event::EventStore;
use agentflow_types::error::RepositoryError;
use agentflow_types::event::{EventEnvelope, EventQuery, WorkflowEvent};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};

use super::pool::DatabasePool;
use super::{format_datetime, map_write_error, parse_datetime, parse_uuid};

/// SQLite-backed implementation of `EventStore`.
pub struct SqliteEventStore {
    pool: DatabasePool,
}

impl SqliteEventStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

struct EventRow {
    id: String,
    event_type: String,
    correlation_id: String,
    timestamp: String,
    payload: String,
    metadata: String,
}

impl EventRow {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            event_type: row.try_get("event_type")?,
            correlation_id: row.try_get("correlation_id")?,
            timestamp: row.try_get("timestamp")?,
            payload: row.try_get("payload")?,
            metadata: row.try_get("metadata")?,
        })
    }

    fn into_envelope(self) -> Result<EventEnvelope, RepositoryError> {
        let payload: WorkflowEvent = serde_json::from_str(&self.payload)
            .map_err(|e| RepositoryError::Query(format!("invalid event payload: {e}")))?;
        let metadata: HashMap<String, serde_json::Value> = serde_json::from_str(&self.metadata)
            .map_err(|e| RepositoryError::Query(format!("invalid event metadata: {e}")))?;

        Ok(EventEnvelope {
            id: parse_uuid(&self.id)?,
            event_type: self.event_type,
            timestamp: parse_datetime(&self.timestamp)?,
            correlation_id: parse_uuid(&self.correlation_id)?,
            payload,
            metadata,
        })
    }
}

impl EventStore for SqliteEventStore {
    async fn append(&self, event: &EventEnvelope) -> Result<(), RepositoryError> {
        let payload = serde_json::to_string(&event.payload)
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        let metadata = serde_json::to_string(&event.metadata)
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        sqlx::query(
            r#"INSERT INTO events (id, event_type, correlation_id, timestamp, payload, metadata)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(event.id.to_string())
        .bind(&event.event_type)
        .bind(event.correlation_id.to_string())
        .bind(format_datetime(&event.timestamp))
        .bind(&payload)
        .bind(&metadata)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| map_write_error(e, &format!("event {}", event.id)))?;

        Ok(())
    }

    async fn history(&self, query: &EventQuery) -> Result<Vec<EventEnvelope>, RepositoryError> {
        let mut sql: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM events WHERE 1 = 1");

        if !query.event_types.is_empty() {
            sql.push(" AND event_type IN (");
            let mut types = sql.separated(", ");
            for event_type in &query.event_types {
                types.push_bind(event_type.clone());
            }
            types.push_unseparated(")");
        }
        if let Some(correlation_id) = query.correlation_id {
            sql.push(" AND correlation_id = ")
                .push_bind(correlation_id.to_string());
        }
        if let Some(since) = &query.since {
            sql.push(" AND timestamp >= ").push_bind(format_datetime(since));
        }
        if let Some(until) = &query.until {
            sql.push(" AND timestamp <= ").push_bind(format_datetime(until));
        }
        sql.push(" ORDER BY timestamp DESC, id DESC LIMIT ")
            .push_bind(i64::from(query.limit));

        let rows = sql
            .build()
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut events = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = EventRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            events.push(r.into_envelope()?);
        }
        Ok(events)
    }
}
