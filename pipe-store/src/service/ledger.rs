//! Execution Ledger
//!
//! Durable execution records, their append-only logs and their latest
//! checkpoint. The ledger stores whatever state it is handed; lifecycle rules
//! belong to the caller (see `ExecutionRecord::transition`).

use chrono::Utc;
use pipe_core::domain::execution::{ExecutionRecord, ExecutionState};
use pipe_core::domain::log::ExecutionLog;
use pipe_core::metrics::MetricsRegistry;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::repository::{execution_repository, log_repository, parse_timestamp};

const ENTITY: &str = "execution";

pub struct ExecutionLedger {
    pool: SqlitePool,
    lock: RwLock<()>,
    metrics: Arc<MetricsRegistry>,
}

impl ExecutionLedger {
    pub fn new(pool: SqlitePool, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            pool,
            lock: RwLock::new(()),
            metrics,
        }
    }

    /// Persist a new execution
    ///
    /// Assigns an id when the record has none and stamps both timestamps.
    /// Every call inserts a new row.
    pub async fn create_execution(&self, mut record: ExecutionRecord) -> Result<ExecutionRecord> {
        let _guard = self.lock.write().await;
        let started = Instant::now();

        if !record.has_id() {
            record.id = Uuid::new_v4().to_string();
        }
        let now = Utc::now();
        record.created_at = now;
        record.updated_at = now;

        let data = serde_json::to_string(&record).map_err(StoreError::encoding(ENTITY, &record.id))?;

        execution_repository::insert(&self.pool, &record, &data)
            .await
            .map_err(StoreError::storage("create", &record.id))?;

        self.metrics.counter("store.executions.created").inc();
        self.observe_write(started);

        tracing::info!(
            "Execution created: {} (agent: {}, namespace: {})",
            record.id,
            record.agent_name,
            record.namespace
        );

        Ok(record)
    }

    /// Get an execution by ID, including its checkpoint
    pub async fn get_execution(&self, id: &str) -> Result<ExecutionRecord> {
        let _guard = self.lock.read().await;

        let row = execution_repository::find_by_id(&self.pool, id)
            .await
            .map_err(StoreError::storage("get", id))?
            .ok_or_else(|| StoreError::not_found(ENTITY, id))?;

        ExecutionRecord::try_from(row).map_err(StoreError::encoding(ENTITY, id))
    }

    /// List executions newest first
    ///
    /// `limit` of `None` or `Some(0)` means unbounded.
    pub async fn list_executions(
        &self,
        namespace: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<ExecutionRecord>> {
        let _guard = self.lock.read().await;

        let limit = limit
            .filter(|&n| n > 0)
            .map(|n| i64::try_from(n).unwrap_or(i64::MAX));

        let rows = execution_repository::list(&self.pool, namespace, limit)
            .await
            .map_err(StoreError::storage("list", namespace.unwrap_or("*")))?;

        rows.into_iter()
            .map(|row| {
                ExecutionRecord::try_from(row)
                    .map_err(StoreError::encoding(ENTITY, namespace.unwrap_or("*")))
            })
            .collect()
    }

    /// List executions in one state, oldest first
    pub async fn list_executions_by_state(
        &self,
        state: ExecutionState,
    ) -> Result<Vec<ExecutionRecord>> {
        let _guard = self.lock.read().await;

        let rows = execution_repository::find_by_state(&self.pool, state)
            .await
            .map_err(StoreError::storage("list", state))?;

        rows.into_iter()
            .map(|row| ExecutionRecord::try_from(row).map_err(StoreError::encoding(ENTITY, state)))
            .collect()
    }

    /// Overwrite a stored execution with `record`
    ///
    /// No transition check is made. `created_at` keeps its stored value. The
    /// checkpoint column is not touched; use
    /// [`save_checkpoint`](Self::save_checkpoint) for that.
    pub async fn update_execution(&self, mut record: ExecutionRecord) -> Result<ExecutionRecord> {
        let _guard = self.lock.write().await;
        let started = Instant::now();

        let created_at = execution_repository::find_created_at(&self.pool, &record.id)
            .await
            .map_err(StoreError::storage("update", &record.id))?
            .ok_or_else(|| StoreError::not_found(ENTITY, &record.id))?;
        record.created_at =
            parse_timestamp(&created_at).map_err(StoreError::encoding(ENTITY, &record.id))?;
        record.updated_at = Utc::now();
        let data = serde_json::to_string(&record).map_err(StoreError::encoding(ENTITY, &record.id))?;

        let updated = execution_repository::update(&self.pool, &record, &data)
            .await
            .map_err(StoreError::storage("update", &record.id))?;
        if !updated {
            return Err(StoreError::not_found(ENTITY, &record.id));
        }

        self.metrics.counter("store.executions.updated").inc();
        self.observe_write(started);

        tracing::debug!("Execution {} updated to state {}", record.id, record.state);

        Ok(record)
    }

    /// Append one log entry to an execution
    pub async fn append_execution_log(&self, id: &str, entry: ExecutionLog) -> Result<()> {
        let _guard = self.lock.write().await;
        self.ensure_exists(id).await?;

        log_repository::add_entry(&self.pool, id, &entry)
            .await
            .map_err(StoreError::storage("append log", id))?;

        self.metrics.counter("store.logs.appended").inc();
        Ok(())
    }

    /// Append several log entries atomically
    pub async fn append_execution_logs(&self, id: &str, entries: &[ExecutionLog]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let _guard = self.lock.write().await;
        self.ensure_exists(id).await?;

        log_repository::add_entries(&self.pool, id, entries)
            .await
            .map_err(StoreError::storage("append logs", id))?;

        self.metrics
            .counter("store.logs.appended")
            .add(entries.len() as i64);

        tracing::debug!("Added {} log entries for execution: {}", entries.len(), id);

        Ok(())
    }

    /// All log entries of an execution, oldest first
    pub async fn get_execution_logs(&self, id: &str) -> Result<Vec<ExecutionLog>> {
        let _guard = self.lock.read().await;
        self.ensure_exists(id).await?;

        let rows = log_repository::find_by_execution(&self.pool, id)
            .await
            .map_err(StoreError::storage("get logs", id))?;

        rows.into_iter()
            .map(|row| ExecutionLog::try_from(row).map_err(StoreError::encoding("execution log", id)))
            .collect()
    }

    pub async fn count_execution_logs(&self, id: &str) -> Result<i64> {
        let _guard = self.lock.read().await;
        self.ensure_exists(id).await?;

        log_repository::count_by_execution(&self.pool, id)
            .await
            .map_err(StoreError::storage("count logs", id))
    }

    /// Replace the checkpoint of an execution (last write wins)
    ///
    /// Only the checkpoint column changes; the record and its `updated_at`
    /// stay as the last `update_execution` left them.
    pub async fn save_checkpoint(&self, id: &str, checkpoint: &[u8]) -> Result<()> {
        let _guard = self.lock.write().await;
        let started = Instant::now();

        let saved = execution_repository::save_checkpoint(&self.pool, id, checkpoint)
            .await
            .map_err(StoreError::storage("save checkpoint", id))?;
        if !saved {
            return Err(StoreError::not_found(ENTITY, id));
        }

        self.metrics.counter("store.checkpoints.saved").inc();
        self.observe_write(started);

        tracing::debug!("Checkpoint saved for execution {} ({} bytes)", id, checkpoint.len());

        Ok(())
    }

    /// Latest checkpoint of an execution
    ///
    /// `Ok(None)` means the execution exists but was never checkpointed; an
    /// empty checkpoint comes back as `Ok(Some(vec![]))`.
    pub async fn load_checkpoint(&self, id: &str) -> Result<Option<Vec<u8>>> {
        let _guard = self.lock.read().await;

        execution_repository::load_checkpoint(&self.pool, id)
            .await
            .map_err(StoreError::storage("load checkpoint", id))?
            .ok_or_else(|| StoreError::not_found(ENTITY, id))
    }

    async fn ensure_exists(&self, id: &str) -> Result<()> {
        let exists = execution_repository::exists(&self.pool, id)
            .await
            .map_err(StoreError::storage("get", id))?;

        if exists {
            Ok(())
        } else {
            Err(StoreError::not_found(ENTITY, id))
        }
    }

    fn observe_write(&self, started: Instant) {
        self.metrics
            .histogram("store.write_ms")
            .observe(started.elapsed().as_secs_f64() * 1000.0);
    }
}
