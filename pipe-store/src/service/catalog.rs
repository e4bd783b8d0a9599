//! Resource Catalog
//!
//! Upsert, lookup, listing and deletion of resources keyed by
//! `(kind, namespace, name)`. Every successful mutation is published on the
//! watch bus while the write lock is still held, so watchers observe changes
//! to a kind in commit order.

use chrono::{DateTime, Utc};
use pipe_core::domain::event::{EventType, ResourceEvent};
use pipe_core::domain::resource::{GenericResource, ResourceKey, ResourceKind, ResourceStatus};
use pipe_core::metrics::MetricsRegistry;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::repository::{format_timestamp, resource_repository};
use crate::watch::WatchBus;

const ENTITY: &str = "resource";

pub struct ResourceCatalog {
    pool: SqlitePool,
    lock: RwLock<()>,
    bus: WatchBus,
    metrics: Arc<MetricsRegistry>,
}

impl ResourceCatalog {
    pub fn new(pool: SqlitePool, bus: WatchBus, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            pool,
            lock: RwLock::new(()),
            bus,
            metrics,
        }
    }

    /// Create or overwrite a resource
    ///
    /// A key seen for the first time gets a `uid` (unless one is supplied),
    /// `created_at` set to the write time, and the default status when none
    /// is set; it is announced as `CREATED`. An existing key keeps its stored `uid` and `created_at`
    /// and is announced as `UPDATED`. Returns the resource as stored.
    pub async fn put(&self, resource: GenericResource) -> Result<GenericResource> {
        let _guard = self.lock.write().await;

        let existing = self.find_unlocked(&resource.key()).await?;
        self.put_unlocked(resource, existing).await
    }

    /// Get a resource by key
    pub async fn get(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<GenericResource> {
        let _guard = self.lock.read().await;

        let key = ResourceKey::new(kind.clone(), namespace, name);
        self.find_unlocked(&key)
            .await?
            .ok_or_else(|| StoreError::not_found(ENTITY, &key))
    }

    /// List resources of a kind, optionally restricted to one namespace
    pub async fn list(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
    ) -> Result<Vec<GenericResource>> {
        let _guard = self.lock.read().await;

        let rows = resource_repository::list(&self.pool, kind, namespace)
            .await
            .map_err(StoreError::storage("list", kind))?;

        rows.into_iter()
            .map(|row| GenericResource::try_from(row).map_err(StoreError::encoding(ENTITY, kind)))
            .collect()
    }

    /// Delete a resource, returning it as it was just before removal
    ///
    /// A missing key fails with `NotFound` and publishes nothing.
    pub async fn delete(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<GenericResource> {
        let _guard = self.lock.write().await;

        let key = ResourceKey::new(kind.clone(), namespace, name);
        let existing = self
            .find_unlocked(&key)
            .await?
            .ok_or_else(|| StoreError::not_found(ENTITY, &key))?;

        let deleted = resource_repository::delete(&self.pool, &key)
            .await
            .map_err(StoreError::storage("delete", &key))?;
        if !deleted {
            return Err(StoreError::not_found(ENTITY, &key));
        }

        self.bus
            .publish(&ResourceEvent::new(EventType::Deleted, existing.clone()));
        self.metrics.counter("store.resources.deleted").inc();

        tracing::info!("Resource deleted: {}", key);

        Ok(existing)
    }

    /// Replace the status of a stored resource
    ///
    /// The read and the write happen under one hold of the write lock, so a
    /// concurrent `put` on the same key cannot interleave between them.
    pub async fn update_status(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
        status: ResourceStatus,
    ) -> Result<GenericResource> {
        let _guard = self.lock.write().await;

        let key = ResourceKey::new(kind.clone(), namespace, name);
        let existing = self
            .find_unlocked(&key)
            .await?
            .ok_or_else(|| StoreError::not_found(ENTITY, &key))?;

        let mut resource = existing.clone();
        resource.status = status;

        self.put_unlocked(resource, Some(existing)).await
    }

    // =========================================================================
    // Helpers (caller holds the lock)
    // =========================================================================

    async fn find_unlocked(&self, key: &ResourceKey) -> Result<Option<GenericResource>> {
        let row = resource_repository::find(&self.pool, key)
            .await
            .map_err(StoreError::storage("get", key))?;

        row.map(GenericResource::try_from)
            .transpose()
            .map_err(StoreError::encoding(ENTITY, key))
    }

    async fn put_unlocked(
        &self,
        mut resource: GenericResource,
        existing: Option<GenericResource>,
    ) -> Result<GenericResource> {
        let started = Instant::now();
        let key = resource.key();
        let now = Utc::now();

        let event_type = match &existing {
            Some(prev) => {
                let meta = &mut resource.metadata;
                meta.uid = prev.metadata.uid.or(meta.uid).or_else(|| Some(Uuid::new_v4()));
                meta.created_at = prev.metadata.created_at.or(Some(now));
                meta.updated_at = Some(advance(now, prev.metadata.updated_at));
                EventType::Updated
            }
            None => {
                let meta = &mut resource.metadata;
                meta.uid = meta.uid.or_else(|| Some(Uuid::new_v4()));
                meta.created_at = Some(now);
                meta.updated_at = Some(now);
                EventType::Created
            }
        };

        if resource.status.is_unset() {
            resource.status = ResourceStatus::registered();
        }
        resource.status.last_updated = resource.metadata.updated_at;

        let data = serde_json::to_string(&resource).map_err(StoreError::encoding(ENTITY, &key))?;

        let uid = resource.metadata.uid.unwrap_or_default().to_string();
        let created_at = format_timestamp(resource.metadata.created_at.unwrap_or(now));
        let updated_at = format_timestamp(resource.metadata.updated_at.unwrap_or(now));

        resource_repository::upsert(&self.pool, &key, &uid, &data, &created_at, &updated_at)
            .await
            .map_err(StoreError::storage("put", &key))?;

        self.bus
            .publish(&ResourceEvent::new(event_type, resource.clone()));

        self.metrics.counter("store.resources.put").inc();
        self.metrics
            .histogram("store.write_ms")
            .observe(started.elapsed().as_secs_f64() * 1000.0);

        match event_type {
            EventType::Created => tracing::info!("Resource created: {} ({})", key, uid),
            _ => tracing::debug!("Resource updated: {}", key),
        }

        Ok(resource)
    }
}

/// `now`, nudged past `prev` if the clock has not moved beyond it
fn advance(now: DateTime<Utc>, prev: Option<DateTime<Utc>>) -> DateTime<Utc> {
    match prev {
        Some(prev) if now <= prev => prev + chrono::Duration::nanoseconds(1),
        _ => now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestStore;
    use pipe_core::domain::pipeline::{PipelineSpec, PipelineStep};
    use serde_json::json;

    fn agent(name: &str) -> GenericResource {
        GenericResource::new(ResourceKind::agent(), "default", name)
            .with_spec(&json!({ "model": "small", "tools": ["search"] }))
            .unwrap()
    }

    #[test]
    fn test_advance_is_strictly_monotonic() {
        let now = Utc::now();
        assert_eq!(advance(now, None), now);
        assert!(advance(now, Some(now)) > now);
        let future = now + chrono::Duration::seconds(5);
        assert!(advance(now, Some(future)) > future);
    }

    #[tokio::test]
    async fn test_put_assigns_identity_and_defaults() {
        let t = TestStore::new().await;
        let stored = t.store.catalog().put(agent("summarizer")).await.unwrap();

        assert!(stored.metadata.uid.is_some());
        assert!(stored.metadata.created_at.is_some());
        assert_eq!(stored.metadata.created_at, stored.metadata.updated_at);
        assert_eq!(stored.status.state, "Registered");
        assert_eq!(stored.status.health, "Unknown");
        assert_eq!(stored.status.last_updated, stored.metadata.updated_at);
    }

    #[tokio::test]
    async fn test_get_returns_what_put_stored() {
        let t = TestStore::new().await;
        let catalog = t.store.catalog();
        let stored = catalog.put(agent("summarizer")).await.unwrap();

        let fetched = catalog
            .get(&ResourceKind::agent(), "default", "summarizer")
            .await
            .unwrap();
        assert_eq!(fetched, stored);
        assert_eq!(fetched.spec["tools"][0], "search");
    }

    #[tokio::test]
    async fn test_repeated_put_keeps_identity_and_single_row() {
        let t = TestStore::new().await;
        let catalog = t.store.catalog();

        let first = catalog.put(agent("a")).await.unwrap();
        // a caller that never saw the stored uid still updates the same row
        let second = catalog.put(agent("a")).await.unwrap();

        assert_eq!(second.metadata.uid, first.metadata.uid);
        assert_eq!(second.metadata.created_at, first.metadata.created_at);
        assert!(second.metadata.updated_at > first.metadata.updated_at);

        let all = catalog.list(&ResourceKind::agent(), None).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_stored_identity_wins_over_caller_values() {
        let t = TestStore::new().await;
        let catalog = t.store.catalog();
        let first = catalog.put(agent("a")).await.unwrap();

        let mut forged = agent("a");
        forged.metadata.uid = Some(Uuid::new_v4());
        forged.metadata.created_at = Some(Utc::now() - chrono::Duration::days(30));
        let second = catalog.put(forged).await.unwrap();

        assert_eq!(second.metadata.uid, first.metadata.uid);
        assert_eq!(second.metadata.created_at, first.metadata.created_at);

        let fetched = catalog
            .get(&ResourceKind::agent(), "default", "a")
            .await
            .unwrap();
        assert_eq!(fetched.metadata.uid, first.metadata.uid);
        assert_eq!(fetched.metadata.created_at, first.metadata.created_at);
    }

    #[tokio::test]
    async fn test_new_key_created_at_is_write_time() {
        let t = TestStore::new().await;
        let stale = Utc::now() - chrono::Duration::days(365);

        let mut res = agent("fresh");
        res.metadata.created_at = Some(stale);
        let before = Utc::now();
        let stored = t.store.catalog().put(res).await.unwrap();

        let created_at = stored.metadata.created_at.unwrap();
        assert!(created_at >= before);
        assert_eq!(stored.metadata.created_at, stored.metadata.updated_at);
    }

    #[tokio::test]
    async fn test_explicit_status_is_kept() {
        let t = TestStore::new().await;
        let mut res = agent("a");
        res.status = ResourceStatus::new("Ready", "Healthy");

        let stored = t.store.catalog().put(res).await.unwrap();
        assert_eq!(stored.status.state, "Ready");
        assert_eq!(stored.status.health, "Healthy");
    }

    #[tokio::test]
    async fn test_list_filters_by_kind_and_namespace() {
        let t = TestStore::new().await;
        let catalog = t.store.catalog();

        catalog.put(agent("a")).await.unwrap();
        catalog
            .put(GenericResource::new(ResourceKind::agent(), "prod", "b"))
            .await
            .unwrap();
        catalog
            .put(GenericResource::new(ResourceKind::pipeline(), "default", "p"))
            .await
            .unwrap();

        let agents = catalog.list(&ResourceKind::agent(), None).await.unwrap();
        assert_eq!(agents.len(), 2);

        let prod = catalog
            .list(&ResourceKind::agent(), Some("prod"))
            .await
            .unwrap();
        assert_eq!(prod.len(), 1);
        assert_eq!(prod[0].metadata.name, "b");

        let none = catalog
            .list(&ResourceKind::new("Tool"), None)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_delete_then_get_is_not_found() {
        let t = TestStore::new().await;
        let catalog = t.store.catalog();
        let kind = ResourceKind::agent();
        catalog.put(agent("a")).await.unwrap();

        let removed = catalog.delete(&kind, "default", "a").await.unwrap();
        assert_eq!(removed.metadata.name, "a");

        let err = catalog.get(&kind, "default", "a").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found_and_silent() {
        let t = TestStore::new().await;
        let mut watcher = t.store.watch(ResourceKind::agent());

        let err = t
            .store
            .catalog()
            .delete(&ResourceKind::agent(), "default", "ghost")
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert!(watcher.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_events_follow_write_order() {
        let t = TestStore::new().await;
        let catalog = t.store.catalog();
        let kind = ResourceKind::agent();
        let mut watcher = t.store.watch(kind.clone());

        catalog.put(agent("a")).await.unwrap();
        catalog.put(agent("b")).await.unwrap();
        catalog.put(agent("a")).await.unwrap();
        catalog.delete(&kind, "default", "a").await.unwrap();
        catalog.put(agent("a")).await.unwrap();

        let seen: Vec<_> = watcher
            .drain()
            .into_iter()
            .map(|e| (e.event_type, e.resource.metadata.name))
            .collect();

        assert_eq!(
            seen,
            vec![
                (EventType::Created, "a".to_string()),
                (EventType::Created, "b".to_string()),
                (EventType::Updated, "a".to_string()),
                (EventType::Deleted, "a".to_string()),
                (EventType::Created, "a".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_deleted_event_carries_last_state() {
        let t = TestStore::new().await;
        let catalog = t.store.catalog();
        let kind = ResourceKind::agent();

        let stored = catalog.put(agent("a")).await.unwrap();
        let mut watcher = t.store.watch(kind.clone());
        catalog.delete(&kind, "default", "a").await.unwrap();

        let event = watcher.try_recv().unwrap();
        assert_eq!(event.event_type, EventType::Deleted);
        assert_eq!(event.resource, stored);
    }

    #[tokio::test]
    async fn test_update_status_refreshes_timestamps() {
        let t = TestStore::new().await;
        let catalog = t.store.catalog();
        let kind = ResourceKind::agent();
        let stored = catalog.put(agent("a")).await.unwrap();

        let updated = catalog
            .update_status(&kind, "default", "a", ResourceStatus::new("Ready", "Healthy"))
            .await
            .unwrap();

        assert_eq!(updated.status.state, "Ready");
        assert_eq!(updated.metadata.uid, stored.metadata.uid);
        assert_eq!(updated.spec, stored.spec);
        assert!(updated.status.last_updated > stored.status.last_updated);

        let err = catalog
            .update_status(&kind, "default", "ghost", ResourceStatus::registered())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_pipeline_spec_stored_verbatim() {
        let t = TestStore::new().await;
        let spec = PipelineSpec {
            description: "two steps".to_string(),
            steps: vec![
                PipelineStep {
                    name: "fetch".to_string(),
                    agent: "fetcher".to_string(),
                    timeout: Some("30s".to_string()),
                    ..Default::default()
                },
                PipelineStep {
                    name: "summarize".to_string(),
                    agent: "summarizer".to_string(),
                    depends_on: vec!["fetch".to_string()],
                    retry_count: Some(2),
                    ..Default::default()
                },
            ],
            on_failure: "abort".to_string(),
            max_retries: 1,
        };

        let res = GenericResource::new(ResourceKind::pipeline(), "default", "digest")
            .with_spec(&spec)
            .unwrap();
        t.store.catalog().put(res).await.unwrap();

        let fetched = t
            .store
            .catalog()
            .get(&ResourceKind::pipeline(), "default", "digest")
            .await
            .unwrap();
        assert_eq!(fetched.spec_as::<PipelineSpec>().unwrap(), spec);
    }

    #[tokio::test]
    async fn test_slow_watcher_never_blocks_writers() {
        let t = TestStore::new().await;
        let catalog = t.store.catalog();
        let _stalled = t.store.watch(ResourceKind::agent());

        let writes = 250;
        let result = tokio::time::timeout(std::time::Duration::from_secs(30), async {
            for i in 0..writes {
                catalog.put(agent(&format!("agent-{i}"))).await?;
            }
            Ok::<_, StoreError>(())
        })
        .await;

        assert!(matches!(result, Ok(Ok(()))));
        let snapshot = t.store.metrics().snapshot();
        assert_eq!(
            snapshot["counter.watch.events.dropped"],
            pipe_core::metrics::MetricValue::Int(writes - 100)
        );
    }

    #[tokio::test]
    async fn test_concurrent_puts_are_serialized() {
        let t = TestStore::new().await;
        let store = Arc::new(t.store);

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    for j in 0..5 {
                        store
                            .catalog()
                            .put(agent(&format!("w{i}-{j}")))
                            .await
                            .unwrap();
                        // everyone also hammers one shared key
                        store.catalog().put(agent("shared")).await.unwrap();
                    }
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        let all = store
            .catalog()
            .list(&ResourceKind::agent(), None)
            .await
            .unwrap();
        assert_eq!(all.len(), 8 * 5 + 1);
    }
}
