//! Shared error mapping for sqlx persistence layer

use application::error::ApplicationError;
use chrono::{DateTime, SecondsFormat, Utc};

/// Map a sqlx error to an application-layer error
pub fn map_sqlx_error(e: sqlx::Error) -> ApplicationError {
    match e {
        sqlx::Error::RowNotFound => {
            ApplicationError::NotFound("Database record not found".to_string())
        },
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            ApplicationError::Conflict(format!("Duplicate record: {db_err}"))
        },
        sqlx::Error::Database(db_err) => {
            ApplicationError::Internal(format!("Database error: {db_err}"))
        },
        other => ApplicationError::Internal(format!("Database error: {other}")),
    }
}

pub fn map_json_error(e: serde_json::Error) -> ApplicationError {
    ApplicationError::Internal(format!("Corrupt record: {e}"))
}

/// Fixed-width UTC timestamp, so text ordering matches time ordering
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}
