//! Store handle
//!
//! Owns the connection pool, the watch bus and the two services built on
//! top of them. One `Store` per database file.

use pipe_core::domain::resource::ResourceKind;
use pipe_core::metrics::MetricsRegistry;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::config::Config;
use crate::db;
use crate::error::{Result, StoreError};
use crate::service::{ExecutionLedger, ResourceCatalog};
use crate::watch::{SubscriberId, WatchBus, Watcher};

pub struct Store {
    pool: SqlitePool,
    catalog: ResourceCatalog,
    ledger: ExecutionLedger,
    bus: WatchBus,
    metrics: Arc<MetricsRegistry>,
}

impl Store {
    /// Open (or create) the database described by `config`
    ///
    /// The schema is not touched; call [`migrate`](Self::migrate) before use.
    pub async fn open(config: &Config, metrics: Arc<MetricsRegistry>) -> Result<Self> {
        let path = config.database_path.display().to_string();

        let pool = db::create_pool(config)
            .await
            .map_err(StoreError::storage("open", &path))?;

        let bus = WatchBus::new(config.watch_capacity, Arc::clone(&metrics));
        let catalog = ResourceCatalog::new(pool.clone(), bus.clone(), Arc::clone(&metrics));
        let ledger = ExecutionLedger::new(pool.clone(), Arc::clone(&metrics));

        tracing::info!("Store opened at {}", path);

        Ok(Self {
            pool,
            catalog,
            ledger,
            bus,
            metrics,
        })
    }

    /// Create the schema if missing; safe to call on every start
    pub async fn migrate(&self) -> Result<()> {
        db::run_migrations(&self.pool)
            .await
            .map_err(StoreError::storage("migrate", "schema"))
    }

    pub fn catalog(&self) -> &ResourceCatalog {
        &self.catalog
    }

    pub fn ledger(&self) -> &ExecutionLedger {
        &self.ledger
    }

    /// Subscribe to change events for one resource kind
    pub fn watch(&self, kind: ResourceKind) -> Watcher {
        self.bus.watch(kind)
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.bus.unsubscribe(id)
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Close the pool, waiting for in-flight queries
    ///
    /// Outstanding watchers see their stream end once they drain.
    pub async fn close(self) {
        self.pool.close().await;
        tracing::info!("Store closed");
    }
}
