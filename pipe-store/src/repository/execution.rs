//! Execution Repository
//!
//! Handles all database operations on the `executions` table, including the
//! checkpoint column which is written independently of the record payload.

use pipe_core::domain::execution::{ExecutionRecord, ExecutionState};
use sqlx::SqlitePool;

use super::format_timestamp;

/// Insert a new execution row
pub async fn insert(
    pool: &SqlitePool,
    record: &ExecutionRecord,
    data: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO executions (
            id, namespace, agent_name, pipeline_name, state,
            data, checkpoint, created_at, updated_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(&record.id)
    .bind(&record.namespace)
    .bind(&record.agent_name)
    .bind(record.pipeline_name.as_deref().unwrap_or_default())
    .bind(record.state.as_str())
    .bind(data)
    .bind(record.checkpoint.as_deref())
    .bind(format_timestamp(record.created_at))
    .bind(format_timestamp(record.updated_at))
    .execute(pool)
    .await?;

    Ok(())
}

/// Find an execution by ID
pub async fn find_by_id(pool: &SqlitePool, id: &str) -> Result<Option<ExecutionRow>, sqlx::Error> {
    sqlx::query_as::<_, ExecutionRow>(
        r#"
        SELECT data, checkpoint
        FROM executions
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Check whether an execution row exists
pub async fn exists(pool: &SqlitePool, id: &str) -> Result<bool, sqlx::Error> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM executions WHERE id = ?1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row.is_some())
}

/// Get the stored creation timestamp of an execution
pub async fn find_created_at(pool: &SqlitePool, id: &str) -> Result<Option<String>, sqlx::Error> {
    let row: Option<(String,)> = sqlx::query_as("SELECT created_at FROM executions WHERE id = ?1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|(created_at,)| created_at))
}

/// Overwrite the payload and indexed columns of an execution
///
/// The checkpoint column is left untouched.
pub async fn update(
    pool: &SqlitePool,
    record: &ExecutionRecord,
    data: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE executions
        SET namespace = ?1, agent_name = ?2, pipeline_name = ?3,
            state = ?4, data = ?5, updated_at = ?6
        WHERE id = ?7
        "#,
    )
    .bind(&record.namespace)
    .bind(&record.agent_name)
    .bind(record.pipeline_name.as_deref().unwrap_or_default())
    .bind(record.state.as_str())
    .bind(data)
    .bind(format_timestamp(record.updated_at))
    .bind(&record.id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// List executions newest first, optionally by namespace and capped
///
/// Rows created at the same instant fall back to insertion order.
pub async fn list(
    pool: &SqlitePool,
    namespace: Option<&str>,
    limit: Option<i64>,
) -> Result<Vec<ExecutionRow>, sqlx::Error> {
    sqlx::query_as::<_, ExecutionRow>(
        r#"
        SELECT data, checkpoint
        FROM executions
        WHERE ?1 IS NULL OR namespace = ?1
        ORDER BY created_at DESC, rowid DESC
        LIMIT ?2
        "#,
    )
    .bind(namespace)
    // SQLite treats a negative LIMIT as unbounded
    .bind(limit.unwrap_or(-1))
    .fetch_all(pool)
    .await
}

/// Find executions by state, oldest first
pub async fn find_by_state(
    pool: &SqlitePool,
    state: ExecutionState,
) -> Result<Vec<ExecutionRow>, sqlx::Error> {
    sqlx::query_as::<_, ExecutionRow>(
        r#"
        SELECT data, checkpoint
        FROM executions
        WHERE state = ?1
        ORDER BY created_at ASC, rowid ASC
        "#,
    )
    .bind(state.as_str())
    .fetch_all(pool)
    .await
}

/// Replace the checkpoint blob of an execution
pub async fn save_checkpoint(
    pool: &SqlitePool,
    id: &str,
    checkpoint: &[u8],
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE executions SET checkpoint = ?1 WHERE id = ?2")
        .bind(checkpoint)
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Load the checkpoint column
///
/// The outer `Option` is the row, the inner one the (possibly NULL) blob.
pub async fn load_checkpoint(
    pool: &SqlitePool,
    id: &str,
) -> Result<Option<Option<Vec<u8>>>, sqlx::Error> {
    let row: Option<(Option<Vec<u8>>,)> =
        sqlx::query_as("SELECT checkpoint FROM executions WHERE id = ?1")
            .bind(id)
            .fetch_optional(pool)
            .await?;

    Ok(row.map(|(checkpoint,)| checkpoint))
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
pub struct ExecutionRow {
    data: String,
    checkpoint: Option<Vec<u8>>,
}

impl TryFrom<ExecutionRow> for ExecutionRecord {
    type Error = serde_json::Error;

    fn try_from(row: ExecutionRow) -> Result<Self, Self::Error> {
        let mut record: ExecutionRecord = serde_json::from_str(&row.data)?;
        record.checkpoint = row.checkpoint;
        Ok(record)
    }
}
