//! SQLite-backed event store
//!
//! - WAL mode so dashboard reads don't block tick writes
//! - `INSERT OR IGNORE` on the event key makes re-appends idempotent
//! - Insertion order preserved through the rowid sequence

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, OpenFlags};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{EngineError, EngineResult};
use crate::store::{format_ts, EventFilter, EventKind, EventStore, StoredEvent};

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA temp_store = MEMORY;

CREATE TABLE IF NOT EXISTS engine_events (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    event_key TEXT NOT NULL UNIQUE,
    kind TEXT NOT NULL,
    scope TEXT NOT NULL,
    ts TEXT NOT NULL,
    payload_json TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_engine_events_kind
    ON engine_events(kind, seq);

CREATE INDEX IF NOT EXISTS idx_engine_events_scope
    ON engine_events(scope, seq);
"#;

pub struct SqliteEventStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteEventStore {
    pub fn new(db_path: &str) -> anyhow::Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX; // guarded by our own lock

        let conn = Connection::open_with_flags(db_path, flags)
            .with_context(|| format!("Failed to open event store at {}", db_path))?;

        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to initialize event store schema")?;

        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap_or_default();
        if !journal_mode.eq_ignore_ascii_case("wal") {
            warn!("WAL mode not active, journal_mode = {}", journal_mode);
        }

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM engine_events", [], |row| row.get(0))
            .unwrap_or(0);
        info!("📊 Event store ready at {} ({} events)", db_path, count);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn count(&self) -> EngineResult<u64> {
        let conn = self.conn.lock();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM engine_events", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn append(&self, event: &StoredEvent) -> EngineResult<()> {
        let payload = serde_json::to_string(&event.payload)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR IGNORE INTO engine_events (event_key, kind, scope, ts, payload_json)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.key,
                event.kind.as_str(),
                event.scope,
                format_ts(event.timestamp),
                payload
            ],
        )?;
        Ok(())
    }

    async fn query(&self, filter: &EventFilter) -> EngineResult<Vec<StoredEvent>> {
        let mut sql = String::from(
            "SELECT event_key, kind, scope, ts, payload_json FROM engine_events WHERE 1 = 1",
        );
        let mut args: Vec<String> = Vec::new();

        if let Some(kind) = filter.kind {
            args.push(kind.as_str().to_string());
            sql.push_str(&format!(" AND kind = ?{}", args.len()));
        }
        if let Some(scope) = &filter.scope {
            args.push(scope.clone());
            sql.push_str(&format!(" AND scope = ?{}", args.len()));
        }
        if let Some(since) = filter.since {
            args.push(format_ts(since));
            sql.push_str(&format!(" AND ts >= ?{}", args.len()));
        }
        sql.push_str(" ORDER BY seq ASC");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (key, kind, scope, ts, payload) = row?;
            let kind = EventKind::parse(&kind).ok_or_else(|| {
                EngineError::PersistenceFailure(format!("unknown event kind '{}'", kind))
            })?;
            let timestamp = DateTime::parse_from_rfc3339(&ts)
                .map_err(|e| EngineError::PersistenceFailure(format!("bad timestamp: {e}")))?
                .with_timezone(&Utc);
            events.push(StoredEvent {
                key,
                kind,
                scope,
                timestamp,
                payload: serde_json::from_str(&payload)?,
            });
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn open() -> (TempDir, SqliteEventStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.db");
        let store = SqliteEventStore::new(path.to_str().unwrap()).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_append_is_idempotent() {
        let (_dir, store) = open();
        let event = StoredEvent::new(
            EventKind::Detection,
            "ICP/ckBTC",
            Utc::now(),
            &serde_json::json!({"priceDelta": 0.6}),
        )
        .unwrap();

        store.append(&event).await.unwrap();
        store.append(&event).await.unwrap();
        assert_eq!(store.count().unwrap(), 1);

        let back = store.query(&EventFilter::default()).await.unwrap();
        assert_eq!(back, vec![event]);
    }

    #[tokio::test]
    async fn test_query_filters_and_keeps_insertion_order() {
        let (_dir, store) = open();
        let start = Utc::now();
        for i in 0..4 {
            let kind = if i % 2 == 0 {
                EventKind::Detection
            } else {
                EventKind::Decision
            };
            let event =
                StoredEvent::new(kind, "A/B", start + Duration::seconds(i), &i).unwrap();
            store.append(&event).await.unwrap();
        }

        let detections = store
            .query(&EventFilter::kind(EventKind::Detection))
            .await
            .unwrap();
        assert_eq!(detections.len(), 2);
        assert!(detections[0].timestamp < detections[1].timestamp);

        let recent = store
            .query(&EventFilter {
                since: Some(start + Duration::seconds(2)),
                limit: Some(1),
                ..EventFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].payload, serde_json::json!(2));
    }

    #[tokio::test]
    async fn test_events_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.db");
        let path = path.to_str().unwrap();
        {
            let store = SqliteEventStore::new(path).unwrap();
            let event = StoredEvent::new(EventKind::Snapshot, "A/B", Utc::now(), &1).unwrap();
            store.append(&event).await.unwrap();
        }
        let reopened = SqliteEventStore::new(path).unwrap();
        assert_eq!(reopened.count().unwrap(), 1);
    }
}
