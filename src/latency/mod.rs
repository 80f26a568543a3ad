//! Latency instrumentation and adaptive polling cadence

pub mod monitor;
pub mod smart_delay;

pub use monitor::{LatencyMonitor, LatencySummary, StageTimer};
pub use smart_delay::SmartDelay;
