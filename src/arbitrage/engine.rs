//! On-demand arbitrage analysis over recorded snapshots
//! Mission: Answer "is there a spread on this pair right now?" from the
//! freshest quote of each source

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::arbitrage::snapshots::SnapshotStore;
use crate::arbitrage::spread::SpreadAnalyzer;
use crate::error::{EngineError, EngineResult};
use crate::models::ArbitrageSignal;

/// Compare the two most recent snapshots from distinct sources for `pair_id`.
///
/// The pair of quotes is ordered by source name so the reference price does
/// not flip between calls when both sources report in the same second.
pub fn run_arbitrage_analysis(
    pair_id: &str,
    fee_percent: f64,
    snapshots: &SnapshotStore,
    analyzer: &SpreadAnalyzer,
    now: DateTime<Utc>,
) -> EngineResult<ArbitrageSignal> {
    let recent = snapshots.for_pair(pair_id);
    if recent.len() < 2 {
        return Err(EngineError::invalid(format!(
            "need snapshots from two sources for {}, have {}",
            pair_id,
            recent.len()
        )));
    }

    let mut quotes = [&recent[0], &recent[1]];
    quotes.sort_by(|a, b| a.dex_name.cmp(&b.dex_name));
    let [reference, other] = quotes;

    let has_reserves = reference.reserves.is_some() && other.reserves.is_some();
    let analysis = analyzer.analyze(reference.price, other.price, fee_percent, has_reserves)?;

    debug!(
        pair_id,
        reference = %reference.dex_name,
        other = %other.dex_name,
        spread_pct = analysis.spread_percent,
        signal = analysis.signal.as_str(),
        "Arbitrage analysis"
    );

    Ok(ArbitrageSignal {
        pair_id: pair_id.to_string(),
        action: analysis.signal.as_str().to_string(),
        reasoning: analysis.reasoning,
        spread_percent: analysis.spread_percent,
        fees_considered: fee_percent,
        timestamp: now,
    })
}
