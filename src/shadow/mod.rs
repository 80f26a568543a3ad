//! Shadow execution
//! Mission: Paper-trade every safe signal to resolution and keep score

pub mod engine;

pub use engine::{ShadowExecutionEngine, ShadowStats};
