//! Watch bus
//!
//! Per-kind fan-out of resource change events. Every subscriber owns a
//! bounded queue; publishing never waits on a subscriber. When a queue is
//! full the event is dropped for that subscriber only, so watchers get
//! best-effort, at-most-once delivery with no replay.

use pipe_core::domain::event::ResourceEvent;
use pipe_core::domain::resource::ResourceKind;
use pipe_core::metrics::MetricsRegistry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use tokio::sync::mpsc::{self, error::TrySendError};

/// Queue capacity of a subscriber unless configured otherwise
pub const DEFAULT_WATCH_CAPACITY: usize = 100;

/// Identifies one registration on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

/// Outcome of publishing one event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub dropped: usize,
}

struct Subscriber {
    id: SubscriberId,
    tx: mpsc::Sender<ResourceEvent>,
}

struct BusInner {
    capacity: usize,
    next_id: AtomicU64,
    subscribers: RwLock<HashMap<ResourceKind, Vec<Subscriber>>>,
    metrics: Arc<MetricsRegistry>,
}

impl BusInner {
    fn remove(&self, id: SubscriberId) -> bool {
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let mut removed = false;
        subscribers.retain(|_, subs| {
            let before = subs.len();
            subs.retain(|s| s.id != id);
            removed |= subs.len() != before;
            !subs.is_empty()
        });

        self.record_subscriber_count(&subscribers);
        removed
    }

    fn record_subscriber_count(&self, subscribers: &HashMap<ResourceKind, Vec<Subscriber>>) {
        let total: usize = subscribers.values().map(Vec::len).sum();
        self.metrics
            .gauge("watch.subscribers")
            .set(i64::try_from(total).unwrap_or(i64::MAX));
    }
}

/// Fan-out hub shared by the catalog and its watchers
///
/// Cloning is cheap; clones share the same subscriber lists. Once the last
/// clone is dropped every outstanding [`Watcher`] sees its stream end.
#[derive(Clone)]
pub struct WatchBus {
    inner: Arc<BusInner>,
}

impl WatchBus {
    pub fn new(capacity: usize, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            inner: Arc::new(BusInner {
                capacity: capacity.max(1),
                next_id: AtomicU64::new(1),
                subscribers: RwLock::new(HashMap::new()),
                metrics,
            }),
        }
    }

    /// Registers a subscriber for events of `kind`
    pub fn watch(&self, kind: ResourceKind) -> Watcher {
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        let id = SubscriberId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));

        {
            let mut subscribers = self
                .inner
                .subscribers
                .write()
                .unwrap_or_else(PoisonError::into_inner);

            // Prune registrations whose receiver is gone
            subscribers.retain(|_, subs| {
                subs.retain(|s| !s.tx.is_closed());
                !subs.is_empty()
            });

            subscribers
                .entry(kind.clone())
                .or_default()
                .push(Subscriber { id, tx });

            self.inner.record_subscriber_count(&subscribers);
        }

        tracing::debug!("Watcher {:?} registered for kind {}", id, kind);

        Watcher {
            id,
            kind,
            rx,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Removes a subscriber; returns false if it was not registered
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.inner.remove(id)
    }

    /// Offers `event` to every subscriber of its kind without waiting
    pub fn publish(&self, event: &ResourceEvent) -> PublishReport {
        let subscribers = self
            .inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let mut report = PublishReport::default();
        let Some(subs) = subscribers.get(&event.resource.kind) else {
            return report;
        };

        for sub in subs {
            match sub.tx.try_send(event.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::debug!(
                        "Watcher {:?} queue full, dropping {:?} event for {}",
                        sub.id,
                        event.event_type,
                        event.resource.key()
                    );
                    report.dropped += 1;
                }
                Err(TrySendError::Closed(_)) => report.dropped += 1,
            }
        }

        let metrics = &self.inner.metrics;
        metrics
            .counter("watch.events.delivered")
            .add(report.delivered as i64);
        if report.dropped > 0 {
            metrics
                .counter("watch.events.dropped")
                .add(report.dropped as i64);
        }

        report
    }

    /// Number of live registrations for `kind`
    pub fn subscriber_count(&self, kind: &ResourceKind) -> usize {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(kind)
            .map_or(0, Vec::len)
    }
}

/// Receiving end of a watch registration
///
/// Dropping the watcher unregisters it.
pub struct Watcher {
    id: SubscriberId,
    kind: ResourceKind,
    rx: mpsc::Receiver<ResourceEvent>,
    bus: Weak<BusInner>,
}

impl Watcher {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    /// Waits for the next event; `None` once the bus is gone and the queue is drained
    pub async fn recv(&mut self) -> Option<ResourceEvent> {
        self.rx.recv().await
    }

    /// Takes the next queued event without waiting
    pub fn try_recv(&mut self) -> Option<ResourceEvent> {
        self.rx.try_recv().ok()
    }

    /// Drains everything currently queued
    pub fn drain(&mut self) -> Vec<ResourceEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(self.id);
        }
    }
}
