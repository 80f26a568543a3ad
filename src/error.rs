//! Engine error taxonomy
//!
//! Nothing in here is fatal to the process: callers log, record a decision
//! event and keep the loop alive.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed numeric input (e.g. zero reference price). Rejected locally,
    /// never recorded as a signal.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A price-source collaborator failed for one pair.
    #[error("price source {source_name} unavailable for {pair_id}: {reason}")]
    SourceUnavailable {
        source_name: String,
        pair_id: String,
        reason: String,
    },

    /// The event store rejected an append. In-memory state has already
    /// advanced; the event sits in the retry journal.
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    /// Invalid configuration (pair definitions, intervals).
    #[error("config error: {0}")]
    Config(String),
}

impl EngineError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        EngineError::InvalidInput(msg.into())
    }

    pub fn source_unavailable(
        source_name: impl Into<String>,
        pair_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        EngineError::SourceUnavailable {
            source_name: source_name.into(),
            pair_id: pair_id.into(),
            reason: reason.into(),
        }
    }

    /// Short machine label used as `DecisionEvent.result`.
    pub fn decision_result(&self) -> &'static str {
        match self {
            EngineError::InvalidInput(_) => "invalid-input",
            EngineError::SourceUnavailable { .. } => "source-error",
            EngineError::PersistenceFailure(_) => "persistence-error",
            EngineError::Config(_) => "config-error",
        }
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        EngineError::PersistenceFailure(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::PersistenceFailure(format!("serialization: {err}"))
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
