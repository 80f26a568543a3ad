//! Retry queue in front of the event store
//!
//! In-memory state advances before persistence. Events whose append failed
//! wait here and are retried in order; duplicates are collapsed by key, and
//! the store itself ignores keys it has already seen. The queue is bounded:
//! during a long outage the oldest pending events are dropped.

use std::collections::{HashSet, VecDeque};
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};
use crate::store::{EventStore, StoredEvent};

const DEFAULT_CAPACITY: usize = 10_000;

pub struct PersistJournal {
    pending: VecDeque<StoredEvent>,
    pending_keys: HashSet<String>,
    capacity: usize,
    dropped: u64,
}

impl Default for PersistJournal {
    fn default() -> Self {
        Self::new()
    }
}

impl PersistJournal {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            pending_keys: HashSet::new(),
            capacity: capacity.max(1),
            dropped: 0,
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Events discarded because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn enqueue(&mut self, event: StoredEvent) {
        if !self.pending_keys.insert(event.key.clone()) {
            return;
        }
        if self.pending.len() >= self.capacity {
            if let Some(oldest) = self.pending.pop_front() {
                self.pending_keys.remove(&oldest.key);
                self.dropped += 1;
                warn!(
                    key = %oldest.key,
                    capacity = self.capacity,
                    dropped = self.dropped,
                    "Persist journal full, dropping oldest event"
                );
            }
        }
        self.pending.push_back(event);
    }

    /// Queue `events` behind anything already pending, then flush.
    pub async fn persist(
        &mut self,
        store: &dyn EventStore,
        events: Vec<StoredEvent>,
    ) -> EngineResult<usize> {
        for event in events {
            self.enqueue(event);
        }
        self.flush(store).await
    }

    /// Append pending events in order, stopping at the first failure. Returns
    /// how many were written.
    pub async fn flush(&mut self, store: &dyn EventStore) -> EngineResult<usize> {
        let mut written = 0;
        while let Some(event) = self.pending.front() {
            match store.append(event).await {
                Ok(()) => {
                    self.pending_keys.remove(&event.key);
                    self.pending.pop_front();
                    written += 1;
                }
                Err(e) => {
                    warn!(
                        pending = self.pending.len(),
                        error = %e,
                        "Event store append failed, will retry"
                    );
                    return Err(match e {
                        EngineError::PersistenceFailure(_) => e,
                        other => EngineError::PersistenceFailure(other.to_string()),
                    });
                }
            }
        }
        if written > 0 {
            debug!(written, "Journal flushed");
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{EventFilter, EventKind, MemoryEventStore};
    use chrono::{Duration, Utc};

    fn event(secs: i64) -> StoredEvent {
        StoredEvent::new(
            EventKind::Detection,
            "A/B",
            Utc::now() + Duration::seconds(secs),
            &secs,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_failed_events_retried_in_order() {
        let store = MemoryEventStore::new();
        let mut journal = PersistJournal::new();

        store.set_available(false);
        let err = journal
            .persist(&store, vec![event(0), event(1)])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::PersistenceFailure(_)));
        assert_eq!(journal.pending(), 2);

        store.set_available(true);
        assert_eq!(journal.persist(&store, vec![event(2)]).await.unwrap(), 3);
        assert_eq!(journal.pending(), 0);

        let stored = store.query(&EventFilter::default()).await.unwrap();
        let order: Vec<i64> = stored
            .iter()
            .map(|e| e.payload.as_i64().unwrap())
            .collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_full_journal_drops_oldest() {
        let store = MemoryEventStore::new();
        let mut journal = PersistJournal::with_capacity(3);

        store.set_available(false);
        let events: Vec<StoredEvent> = (0..5).map(event).collect();
        journal.persist(&store, events).await.unwrap_err();
        assert_eq!(journal.pending(), 3);
        assert_eq!(journal.dropped(), 2);

        store.set_available(true);
        assert_eq!(journal.flush(&store).await.unwrap(), 3);
        let stored = store.query(&EventFilter::default()).await.unwrap();
        let order: Vec<i64> = stored
            .iter()
            .map(|e| e.payload.as_i64().unwrap())
            .collect();
        assert_eq!(order, vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn test_requeued_event_not_duplicated() {
        let store = MemoryEventStore::new();
        let mut journal = PersistJournal::new();
        let e = event(0);

        store.set_available(false);
        let _ = journal.persist(&store, vec![e.clone()]).await;
        let _ = journal.persist(&store, vec![e.clone()]).await;
        assert_eq!(journal.pending(), 1);

        store.set_available(true);
        journal.flush(&store).await.unwrap();
        // Appending an already-stored key again is absorbed by the store
        journal.persist(&store, vec![e]).await.unwrap();
        assert_eq!(store.len(), 1);
    }
}
