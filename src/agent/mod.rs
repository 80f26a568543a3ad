//! Arbitrage agent
//! Mission: Sense -> Analyze Routes -> Risk Sandbox -> Schedule, every tick

pub mod engine;
pub mod scheduler;
pub mod state;

pub use engine::{ArbitrageAgent, TickReport};
pub use scheduler::SchedulerLoop;
