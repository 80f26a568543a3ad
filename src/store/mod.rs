//! Append-only event persistence
//! Mission: Every detection, trade transition and decision survives a restart

pub mod journal;
pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineResult;

pub use journal::PersistJournal;
pub use memory::MemoryEventStore;
pub use sqlite::SqliteEventStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Detection,
    TradeOpened,
    TradeResolved,
    Decision,
    Snapshot,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Detection => "detection",
            EventKind::TradeOpened => "trade_opened",
            EventKind::TradeResolved => "trade_resolved",
            EventKind::Decision => "decision",
            EventKind::Snapshot => "snapshot",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "detection" => Some(EventKind::Detection),
            "trade_opened" => Some(EventKind::TradeOpened),
            "trade_resolved" => Some(EventKind::TradeResolved),
            "decision" => Some(EventKind::Decision),
            "snapshot" => Some(EventKind::Snapshot),
            _ => None,
        }
    }
}

/// One persisted fact. `key` is the idempotency key: re-appending an event
/// with a known key is a no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEvent {
    pub key: String,
    pub kind: EventKind,
    /// Pair id, or the decision step for decision events
    pub scope: String,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl StoredEvent {
    pub fn new<T: Serialize>(
        kind: EventKind,
        scope: impl Into<String>,
        timestamp: DateTime<Utc>,
        payload: &T,
    ) -> EngineResult<Self> {
        let scope = scope.into();
        Ok(Self {
            key: event_key(kind, &scope, timestamp),
            kind,
            scope,
            timestamp,
            payload: serde_json::to_value(payload)?,
        })
    }
}

/// `kind:scope:timestamp` with fixed-width nanosecond timestamps
pub fn event_key(kind: EventKind, scope: &str, timestamp: DateTime<Utc>) -> String {
    format!("{}:{}:{}", kind.as_str(), scope, format_ts(timestamp))
}

/// Fixed-width RFC 3339 so stored timestamps sort lexically
pub fn format_ts(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFilter {
    pub kind: Option<EventKind>,
    pub scope: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl EventFilter {
    pub fn kind(kind: EventKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    pub fn matches(&self, event: &StoredEvent) -> bool {
        self.kind.map_or(true, |k| k == event.kind)
            && self.scope.as_ref().map_or(true, |s| *s == event.scope)
            && self.since.map_or(true, |t| event.timestamp >= t)
    }
}

/// Durable event log. Implementations return events in insertion order and
/// ignore duplicate keys.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append(&self, event: &StoredEvent) -> EngineResult<()>;

    async fn query(&self, filter: &EventFilter) -> EngineResult<Vec<StoredEvent>>;
}
