//! Repository Module
//!
//! Data access layer for the store.
//! Each repository runs the SQL for one table and returns raw rows; locking,
//! stamping and event emission live in the service layer.

pub mod execution;
pub mod log;
pub mod resource;

// Re-export for convenience
pub use execution as execution_repository;
pub use log as log_repository;
pub use resource as resource_repository;

use chrono::{DateTime, SecondsFormat, Utc};

/// Fixed-width RFC 3339 text, so lexical order in SQL matches time order
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|ts| ts.with_timezone(&Utc))
}
