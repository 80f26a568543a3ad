//! Latest raw price snapshot per (pair, source)

use std::collections::HashMap;

use crate::error::{EngineError, EngineResult};
use crate::models::PriceSnapshot;

#[derive(Debug, Default)]
pub struct SnapshotStore {
    slots: HashMap<(String, String), PriceSnapshot>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the (pair, dex) slot. A snapshot older than the one already
    /// held is rejected so each source stream stays monotonic.
    pub fn record(&mut self, snapshot: PriceSnapshot) -> EngineResult<()> {
        if snapshot.pair_id.trim().is_empty() || snapshot.dex_name.trim().is_empty() {
            return Err(EngineError::invalid("snapshot needs pairId and dexName"));
        }
        if !(snapshot.price.is_finite() && snapshot.price > 0.0) {
            return Err(EngineError::invalid(format!(
                "snapshot price must be positive, got {}",
                snapshot.price
            )));
        }

        let key = (snapshot.pair_id.clone(), snapshot.dex_name.clone());
        if let Some(existing) = self.slots.get(&key) {
            if snapshot.timestamp < existing.timestamp {
                return Err(EngineError::invalid(format!(
                    "out-of-order snapshot for {} on {}: {} < {}",
                    key.0, key.1, snapshot.timestamp, existing.timestamp
                )));
            }
        }

        self.slots.insert(key, snapshot);
        Ok(())
    }

    /// All slots, ordered by pair then source name
    pub fn all(&self) -> Vec<PriceSnapshot> {
        let mut out: Vec<PriceSnapshot> = self.slots.values().cloned().collect();
        out.sort_by(|a, b| {
            a.pair_id
                .cmp(&b.pair_id)
                .then_with(|| a.dex_name.cmp(&b.dex_name))
        });
        out
    }

    /// Snapshots for one pair, newest first
    pub fn for_pair(&self, pair_id: &str) -> Vec<PriceSnapshot> {
        let mut out: Vec<PriceSnapshot> = self
            .slots
            .values()
            .filter(|s| s.pair_id == pair_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| a.dex_name.cmp(&b.dex_name))
        });
        out
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
