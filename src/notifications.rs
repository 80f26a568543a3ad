//! Dashboard warning center
//!
//! Injected, not global: each engine owns one `NotificationCenter`, and
//! subscribers get a broadcast receiver (drop it to unsubscribe).

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

pub const SOURCE_UNAVAILABLE: &str = "source-unavailable";
pub const TIMER_START_FAILED: &str = "timer-start-failed";
pub const PERSISTENCE_FAILURE: &str = "persistence-failure";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Warning {
    pub id: String,
    pub message: String,
    /// Persistent warnings stay until removed explicitly
    pub persistent: bool,
    pub raised_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    Added { warning: Warning },
    Removed { id: String },
    Cleared,
}

#[derive(Clone)]
pub struct NotificationCenter {
    event_tx: broadcast::Sender<NotificationEvent>,
    warnings: Arc<RwLock<Vec<Warning>>>,
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationCenter {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            event_tx,
            warnings: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Raise a warning. A second warning with the same id is ignored.
    pub fn add_warning(&self, id: &str, message: impl Into<String>, persistent: bool) -> bool {
        let warning = {
            let mut warnings = self.warnings.write();
            if warnings.iter().any(|w| w.id == id) {
                return false;
            }
            let warning = Warning {
                id: id.to_string(),
                message: message.into(),
                persistent,
                raised_at: Utc::now(),
            };
            warnings.push(warning.clone());
            warning
        };

        warn!(id, message = %warning.message, "⚠️ Warning raised");
        // No subscribers is fine
        let _ = self.event_tx.send(NotificationEvent::Added { warning });
        true
    }

    pub fn remove_warning(&self, id: &str) -> bool {
        let removed = {
            let mut warnings = self.warnings.write();
            let before = warnings.len();
            warnings.retain(|w| w.id != id);
            warnings.len() != before
        };
        if removed {
            info!(id, "Warning cleared");
            let _ = self.event_tx.send(NotificationEvent::Removed { id: id.to_string() });
        }
        removed
    }

    pub fn clear_all(&self) {
        self.warnings.write().clear();
        let _ = self.event_tx.send(NotificationEvent::Cleared);
    }

    pub fn warnings(&self) -> Vec<Warning> {
        self.warnings.read().clone()
    }

    pub fn has_warning(&self, id: &str) -> bool {
        self.warnings.read().iter().any(|w| w.id == id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.event_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_is_idempotent_per_id() {
        let center = NotificationCenter::new();
        assert!(center.add_warning(SOURCE_UNAVAILABLE, "ICPSwap down", false));
        assert!(!center.add_warning(SOURCE_UNAVAILABLE, "ICPSwap still down", false));
        assert_eq!(center.warnings().len(), 1);
        assert_eq!(center.warnings()[0].message, "ICPSwap down");
    }

    #[tokio::test]
    async fn test_subscribers_see_lifecycle() {
        let center = NotificationCenter::new();
        let mut rx = center.subscribe();

        center.add_warning(TIMER_START_FAILED, "timer failed", true);
        center.remove_warning(TIMER_START_FAILED);
        center.clear_all();

        assert!(matches!(rx.recv().await.unwrap(), NotificationEvent::Added { .. }));
        assert_eq!(
            rx.recv().await.unwrap(),
            NotificationEvent::Removed {
                id: TIMER_START_FAILED.to_string()
            }
        );
        assert_eq!(rx.recv().await.unwrap(), NotificationEvent::Cleared);
    }

    #[test]
    fn test_instances_are_isolated() {
        let a = NotificationCenter::new();
        let b = NotificationCenter::new();
        a.add_warning(PERSISTENCE_FAILURE, "disk full", true);
        assert!(b.warnings().is_empty());
        assert!(!a.remove_warning("unknown"));
    }
}
