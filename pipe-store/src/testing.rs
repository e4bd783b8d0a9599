//! Test fixture: a migrated store backed by a throwaway database file

use pipe_core::metrics::MetricsRegistry;
use std::sync::Arc;
use tempfile::TempDir;

use crate::config::Config;
use crate::store::Store;

pub struct TestStore {
    pub store: Store,
    dir: TempDir,
}

impl TestStore {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let store = open(&dir).await;
        Self { store, dir }
    }

    /// Drops the store without closing it and opens the same file again
    pub async fn reopen(self) -> Self {
        let Self { store, dir } = self;
        drop(store);
        let store = open(&dir).await;
        Self { store, dir }
    }
}

async fn open(dir: &TempDir) -> Store {
    let config = Config::new(dir.path().join("pipe.db"));
    let store = Store::open(&config, Arc::new(MetricsRegistry::new()))
        .await
        .expect("open store");
    store.migrate().await.expect("migrate store");
    store
}
