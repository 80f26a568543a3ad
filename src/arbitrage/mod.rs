//! Arbitrage analysis
//! Mission: Quantify cross-source price mismatches against trading costs

pub mod engine;
pub mod snapshots;
pub mod spread;

pub use engine::run_arbitrage_analysis;
pub use snapshots::SnapshotStore;
pub use spread::{analyze_spread, AnalysisParams, SpreadAnalysis, SpreadAnalyzer, SpreadSignal};
