//! Price store: latest accepted record per canonical id
//!
//! Readers take a shared lock and clone an `Arc`; the writer holds the
//! exclusive lock only long enough to swap one `Arc`. Listeners run after
//! the lock is released, so a slow or panicking listener never blocks
//! readers and never reaches the writer.

use crate::core::{FixedPoint8, InstrumentId, PriceRecord, RecordRejection};
use crossbeam::channel::{self, Receiver, TrySendError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Change listener, invoked synchronously after each accepted upsert
pub type Listener = Arc<dyn Fn(&Arc<PriceRecord>) + Send + Sync>;

/// Outcome of one upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// Stored and listeners notified
    Accepted,
    /// Same price as stored; only `observed_at`/`source` refreshed
    Unchanged,
    Rejected(RecordRejection),
}

/// Read-only price access used by the alert evaluator
pub trait PriceLookup {
    fn price_of(&self, id: &InstrumentId) -> Option<FixedPoint8>;
}

#[derive(Default)]
struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(u64, Listener)>>,
}

impl ListenerRegistry {
    fn remove(&self, id: u64) {
        self.listeners.write().retain(|(lid, _)| *lid != id);
    }
}

/// Handle returned by `subscribe`; dropping it also unsubscribes
pub struct Subscription {
    id: u64,
    registry: Weak<ListenerRegistry>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        // Drop does the work
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

/// Point-in-time copy of the store
#[derive(Debug, Clone, Default)]
pub struct PriceSnapshot {
    records: HashMap<InstrumentId, Arc<PriceRecord>>,
}

impl PriceSnapshot {
    pub fn get(&self, id: &InstrumentId) -> Option<&Arc<PriceRecord>> {
        self.records.get(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl PriceLookup for PriceSnapshot {
    fn price_of(&self, id: &InstrumentId) -> Option<FixedPoint8> {
        self.records.get(id).map(|r| r.price)
    }
}

/// Concurrent map from canonical id to latest price record
#[derive(Default)]
pub struct PriceStore {
    records: RwLock<HashMap<InstrumentId, Arc<PriceRecord>>>,
    ordering: RwLock<Vec<InstrumentId>>,
    registry: Arc<ListenerRegistry>,
}

impl PriceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with a canonical ordering for paged listing
    pub fn with_ordering(ordering: Vec<InstrumentId>) -> Self {
        let store = Self::new();
        store.configure(ordering);
        store
    }

    /// Replace the canonical ordering used by `list_by_page`
    pub fn configure(&self, ordering: Vec<InstrumentId>) {
        *self.ordering.write() = ordering;
    }

    /// Validate and store; `true` only when the record was accepted
    #[inline]
    pub fn upsert(&self, record: PriceRecord) -> bool {
        self.upsert_outcome(record) == UpsertOutcome::Accepted
    }

    /// Like `upsert` but reports why a record was not accepted
    pub fn upsert_outcome(&self, record: PriceRecord) -> UpsertOutcome {
        if let Err(rejection) = record.validate() {
            tracing::debug!(target: "store", "Rejected {} update: {}", record.id, rejection);
            return UpsertOutcome::Rejected(rejection);
        }

        let accepted = {
            let mut records = self.records.write();
            match records.get_mut(&record.id) {
                Some(existing) if existing.price == record.price => {
                    let mut refreshed = PriceRecord::clone(existing);
                    refreshed.observed_at = record.observed_at;
                    refreshed.source = record.source;
                    *existing = Arc::new(refreshed);
                    None
                }
                _ => {
                    let record = Arc::new(record);
                    records.insert(record.id.clone(), Arc::clone(&record));
                    Some(record)
                }
            }
        };

        match accepted {
            Some(record) => {
                self.notify(&record);
                UpsertOutcome::Accepted
            }
            None => UpsertOutcome::Unchanged,
        }
    }

    pub fn get(&self, id: &InstrumentId) -> Option<Arc<PriceRecord>> {
        self.records.read().get(id).cloned()
    }

    /// Records for page `page` of the canonical ordering (ids without a
    /// record yet are skipped)
    pub fn list_by_page(&self, page: usize, page_size: usize) -> Vec<Arc<PriceRecord>> {
        let ordering = self.ordering.read();
        let start = page.saturating_mul(page_size).min(ordering.len());
        let end = start.saturating_add(page_size).min(ordering.len());

        let records = self.records.read();
        ordering[start..end]
            .iter()
            .filter_map(|id| records.get(id).cloned())
            .collect()
    }

    /// Register a listener for accepted upserts
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Arc<PriceRecord>) + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry.listeners.write().push((id, Arc::new(listener)));
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Queued variant for thread-based consumers. A full queue drops the
    /// notification rather than blocking the writer.
    pub fn subscribe_channel(&self, capacity: usize) -> (Subscription, Receiver<Arc<PriceRecord>>) {
        let (tx, rx) = channel::bounded(capacity);
        let subscription = self.subscribe(move |record| match tx.try_send(Arc::clone(record)) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
            Err(TrySendError::Full(_)) => {
                tracing::debug!(target: "store", "Listener queue full, dropped {} update", record.id);
            }
        });
        (subscription, rx)
    }

    pub fn listener_count(&self) -> usize {
        self.registry.listeners.read().len()
    }

    /// Consistent copy for one evaluation pass
    pub fn snapshot(&self) -> PriceSnapshot {
        PriceSnapshot {
            records: self.records.read().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Drop every record (full engine reset only)
    pub fn reset(&self) {
        self.records.write().clear();
    }

    fn notify(&self, record: &Arc<PriceRecord>) {
        let listeners: Vec<Listener> = self
            .registry
            .listeners
            .read()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();

        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(record))).is_err() {
                tracing::warn!(target: "store", "Price listener panicked on {} update", record.id);
            }
        }
    }
}

impl PriceLookup for PriceStore {
    fn price_of(&self, id: &InstrumentId) -> Option<FixedPoint8> {
        self.records.read().get(id).map(|r| r.price)
    }
}
