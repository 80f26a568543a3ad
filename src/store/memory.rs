//! In-process event store

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{EngineError, EngineResult};
use crate::store::{EventFilter, EventStore, StoredEvent};

#[derive(Default)]
struct Inner {
    events: Vec<StoredEvent>,
    keys: HashSet<String>,
}

pub struct MemoryEventStore {
    inner: Mutex<Inner>,
    /// When false every append fails, for outage drills
    available: AtomicBool,
}

impl Default for MemoryEventStore {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            available: AtomicBool::new(true),
        }
    }
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn append(&self, event: &StoredEvent) -> EngineResult<()> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(EngineError::PersistenceFailure("store unavailable".into()));
        }
        let mut inner = self.inner.lock();
        if inner.keys.insert(event.key.clone()) {
            inner.events.push(event.clone());
        }
        Ok(())
    }

    async fn query(&self, filter: &EventFilter) -> EngineResult<Vec<StoredEvent>> {
        let inner = self.inner.lock();
        let matched = inner.events.iter().filter(|e| filter.matches(e)).cloned();
        Ok(match filter.limit {
            Some(limit) => matched.take(limit).collect(),
            None => matched.collect(),
        })
    }
}
