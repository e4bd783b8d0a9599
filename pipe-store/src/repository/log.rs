//! Log Repository
//!
//! Handles all database operations related to execution logs.

use pipe_core::domain::log::ExecutionLog;
use sqlx::SqlitePool;

use super::{format_timestamp, parse_timestamp};
use crate::error::CodecError;

/// Append one log entry for an execution
pub async fn add_entry(
    pool: &SqlitePool,
    execution_id: &str,
    entry: &ExecutionLog,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO execution_logs (execution_id, timestamp, level, message, step)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(execution_id)
    .bind(format_timestamp(entry.timestamp))
    .bind(entry.level.as_str())
    .bind(&entry.message)
    .bind(i64::from(entry.step))
    .execute(pool)
    .await?;

    Ok(())
}

/// Append a batch of log entries in one transaction
pub async fn add_entries(
    pool: &SqlitePool,
    execution_id: &str,
    entries: &[ExecutionLog],
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    for entry in entries {
        sqlx::query(
            r#"
            INSERT INTO execution_logs (execution_id, timestamp, level, message, step)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(execution_id)
        .bind(format_timestamp(entry.timestamp))
        .bind(entry.level.as_str())
        .bind(&entry.message)
        .bind(i64::from(entry.step))
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await
}

/// Get all log entries for an execution, oldest first
pub async fn find_by_execution(
    pool: &SqlitePool,
    execution_id: &str,
) -> Result<Vec<LogRow>, sqlx::Error> {
    sqlx::query_as::<_, LogRow>(
        r#"
        SELECT timestamp, level, message, step
        FROM execution_logs
        WHERE execution_id = ?1
        ORDER BY timestamp ASC, id ASC
        "#,
    )
    .bind(execution_id)
    .fetch_all(pool)
    .await
}

/// Get log count for an execution
pub async fn count_by_execution(pool: &SqlitePool, execution_id: &str) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM execution_logs WHERE execution_id = ?1")
        .bind(execution_id)
        .fetch_one(pool)
        .await?;

    Ok(row.0)
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
pub struct LogRow {
    timestamp: String,
    level: String,
    message: String,
    step: i64,
}

impl TryFrom<LogRow> for ExecutionLog {
    type Error = CodecError;

    fn try_from(row: LogRow) -> Result<Self, Self::Error> {
        Ok(ExecutionLog {
            timestamp: parse_timestamp(&row.timestamp)?,
            level: row.level.parse()?,
            message: row.message,
            step: u32::try_from(row.step).map_err(|_| CodecError::OutOfRange("step"))?,
        })
    }
}
