//! Detection event log
//!
//! Append-only from the outside; oldest events fall off once the configured
//! capacity is reached.

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

use crate::models::SignalDetectionEvent;

pub struct DetectionLog {
    events: VecDeque<SignalDetectionEvent>,
    max_size: usize,
}

impl DetectionLog {
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            events: VecDeque::with_capacity(max_size.min(10_000)),
            max_size,
        }
    }

    pub fn append(&mut self, event: SignalDetectionEvent) {
        if self.events.len() >= self.max_size {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    /// Events for `pair_id` with timestamp in `(now - window, now]`
    pub fn count_in_window(&self, pair_id: &str, now: DateTime<Utc>, window: Duration) -> usize {
        let cutoff = now - window;
        self.events
            .iter()
            .rev()
            .take_while(|e| e.timestamp > cutoff)
            .filter(|e| e.pair_id == pair_id && e.timestamp <= now)
            .count()
    }

    /// All events in insertion order
    pub fn all(&self) -> Vec<SignalDetectionEvent> {
        self.events.iter().cloned().collect()
    }

    /// Events that never tripped a risk rule
    pub fn safe(&self) -> Vec<SignalDetectionEvent> {
        self.events.iter().filter(|e| !e.high_risk).cloned().collect()
    }

    pub fn get_recent(&self, limit: usize) -> Vec<SignalDetectionEvent> {
        self.events.iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
