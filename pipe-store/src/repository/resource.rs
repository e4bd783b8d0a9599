//! Resource Repository
//!
//! Handles all database operations on the `resources` table.

use pipe_core::domain::resource::{GenericResource, ResourceKey, ResourceKind};
use sqlx::SqlitePool;

/// Insert a resource row or overwrite the payload of an existing one
///
/// `uid` and `created_at` are only written on insert; a conflicting row keeps
/// its original identity columns.
pub async fn upsert(
    pool: &SqlitePool,
    key: &ResourceKey,
    uid: &str,
    data: &str,
    created_at: &str,
    updated_at: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO resources (kind, namespace, name, uid, data, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT (kind, namespace, name) DO UPDATE SET
            data = excluded.data,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(key.kind.as_str())
    .bind(&key.namespace)
    .bind(&key.name)
    .bind(uid)
    .bind(data)
    .bind(created_at)
    .bind(updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Find a resource by its composite key
pub async fn find(pool: &SqlitePool, key: &ResourceKey) -> Result<Option<ResourceRow>, sqlx::Error> {
    sqlx::query_as::<_, ResourceRow>(
        r#"
        SELECT data
        FROM resources
        WHERE kind = ?1 AND namespace = ?2 AND name = ?3
        "#,
    )
    .bind(key.kind.as_str())
    .bind(&key.namespace)
    .bind(&key.name)
    .fetch_optional(pool)
    .await
}

/// List resources of a kind, optionally restricted to one namespace
pub async fn list(
    pool: &SqlitePool,
    kind: &ResourceKind,
    namespace: Option<&str>,
) -> Result<Vec<ResourceRow>, sqlx::Error> {
    sqlx::query_as::<_, ResourceRow>(
        r#"
        SELECT data
        FROM resources
        WHERE kind = ?1 AND (?2 IS NULL OR namespace = ?2)
        ORDER BY namespace, name
        "#,
    )
    .bind(kind.as_str())
    .bind(namespace)
    .fetch_all(pool)
    .await
}

/// Delete a resource by its composite key
pub async fn delete(pool: &SqlitePool, key: &ResourceKey) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query("DELETE FROM resources WHERE kind = ?1 AND namespace = ?2 AND name = ?3")
            .bind(key.kind.as_str())
            .bind(&key.namespace)
            .bind(&key.name)
            .execute(pool)
            .await?;

    Ok(result.rows_affected() > 0)
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
pub struct ResourceRow {
    data: String,
}

impl TryFrom<ResourceRow> for GenericResource {
    type Error = serde_json::Error;

    fn try_from(row: ResourceRow) -> Result<Self, Self::Error> {
        serde_json::from_str(&row.data)
    }
}
