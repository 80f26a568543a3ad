//! ArbWatch Backend Library
//!
//! Watches paired DEX pools for price moves, scores each detection for risk,
//! paper-trades the safe ones and exposes the whole pipeline over HTTP.
//! The binary in main.rs only wires configuration, tracing and the server.

pub mod agent;
pub mod api;
pub mod arbitrage;
pub mod config;
pub mod error;
pub mod latency;
pub mod middleware;
pub mod models;
pub mod notifications;
pub mod pairs;
pub mod shadow;
pub mod signals;
pub mod sources;
pub mod store;

pub use agent::{ArbitrageAgent, SchedulerLoop, TickReport};
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
