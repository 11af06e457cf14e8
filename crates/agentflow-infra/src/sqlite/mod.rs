//! SQLite storage layer.
//!
//! Repository implementations backed by SQLite with WAL mode and split
//! read/write connection pools.

pub mod event;
pub mod pool;
pub mod workflow;

use agentflow_types::error::RepositoryError;
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid, RepositoryError> {
    Uuid::parse_str(s).map_err(|e| RepositoryError::Query(format!("invalid UUID '{s}': {e}")))
}

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime '{s}': {e}")))
}

/// Fixed-width RFC 3339 so stored timestamps sort lexically.
pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Map a sqlx error, turning primary-key violations into `Conflict`.
pub(crate) fn map_write_error(e: sqlx::Error, what: &str) -> RepositoryError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            RepositoryError::Conflict(format!("{what} already exists"))
        }
        _ => RepositoryError::Query(e.to_string()),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_datetime_round_trips_and_sorts() {
        let earlier = Utc::now();
        let later = earlier + chrono::Duration::nanoseconds(1);
        let a = format_datetime(&earlier);
        let b = format_datetime(&later);
        assert!(a < b);
        assert_eq!(a.len(), b.len());
        assert_eq!(parse_datetime(&a).unwrap(), earlier);
    }

    #[test]
    fn test_parse_uuid_rejects_garbage() {
        assert!(matches!(parse_uuid("nope"), Err(RepositoryError::Query(_))));
    }
}
