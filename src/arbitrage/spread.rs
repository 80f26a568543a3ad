//! Spread viability analysis
//!
//! Pure classification of a two-source price pair against trading costs.

use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;
use crate::error::{EngineError, EngineResult};

const REDUCED_CONFIDENCE_NOTE: &str = "Reduced confidence: liquidity data unavailable. ";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisParams {
    pub fee_percent: f64,
    pub slippage_percent: f64,
    pub min_profit_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpreadSignal {
    #[serde(rename = "No Signal")]
    NoSignal,
    Watch,
    Actionable,
}

impl SpreadSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpreadSignal::NoSignal => "No Signal",
            SpreadSignal::Watch => "Watch",
            SpreadSignal::Actionable => "Actionable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpreadAnalysis {
    pub spread_percent: f64,
    pub net_profit_percent: f64,
    pub signal: SpreadSignal,
    pub reasoning: String,
    pub has_liquidity_data: bool,
}

/// Classify the spread between `price1` (reference) and `price2`.
///
/// Missing reserves only change the reasoning text, never the thresholds.
pub fn analyze_spread(
    price1: f64,
    price2: f64,
    params: &AnalysisParams,
    has_reserves: bool,
) -> EngineResult<SpreadAnalysis> {
    if !price1.is_finite() || price1 == 0.0 {
        return Err(EngineError::invalid(format!(
            "reference price must be finite and non-zero, got {}",
            price1
        )));
    }
    if !price2.is_finite() {
        return Err(EngineError::invalid(format!(
            "comparison price must be finite, got {}",
            price2
        )));
    }
    if !(params.fee_percent.is_finite()
        && params.slippage_percent.is_finite()
        && params.min_profit_percent.is_finite())
    {
        return Err(EngineError::invalid("analysis parameters must be finite"));
    }

    let spread_percent = ((price2 - price1) / price1 * 100.0).abs();
    let total_cost_percent = params.fee_percent + params.slippage_percent;
    let net_profit_percent = spread_percent - total_cost_percent;

    let mut reasoning = String::new();
    if !has_reserves {
        reasoning.push_str(REDUCED_CONFIDENCE_NOTE);
    }

    let signal = if net_profit_percent >= params.min_profit_percent {
        reasoning.push_str(&format!(
            "Net profit {:.2}% exceeds minimum threshold {}%.",
            net_profit_percent, params.min_profit_percent
        ));
        SpreadSignal::Actionable
    } else if spread_percent >= params.fee_percent {
        reasoning.push_str(&format!(
            "Spread {:.2}% covers fees but below profit threshold.",
            spread_percent
        ));
        SpreadSignal::Watch
    } else {
        reasoning.push_str(&format!(
            "Spread {:.2}% insufficient to cover costs {:.2}%.",
            spread_percent, total_cost_percent
        ));
        SpreadSignal::NoSignal
    };

    Ok(SpreadAnalysis {
        spread_percent,
        net_profit_percent,
        signal,
        reasoning,
        has_liquidity_data: has_reserves,
    })
}

/// Analyzer bound to configured slippage / profit thresholds
#[derive(Debug, Clone)]
pub struct SpreadAnalyzer {
    slippage_percent: f64,
    min_profit_percent: f64,
    require_liquidity_for_actionable: bool,
}

impl SpreadAnalyzer {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            slippage_percent: config.slippage_pct,
            min_profit_percent: config.min_profit_pct,
            require_liquidity_for_actionable: config.require_liquidity_for_actionable,
        }
    }

    pub fn params(&self, fee_percent: f64) -> AnalysisParams {
        AnalysisParams {
            fee_percent,
            slippage_percent: self.slippage_percent,
            min_profit_percent: self.min_profit_percent,
        }
    }

    pub fn analyze(
        &self,
        price1: f64,
        price2: f64,
        fee_percent: f64,
        has_reserves: bool,
    ) -> EngineResult<SpreadAnalysis> {
        let mut analysis = analyze_spread(price1, price2, &self.params(fee_percent), has_reserves)?;

        if self.require_liquidity_for_actionable
            && !has_reserves
            && analysis.signal == SpreadSignal::Actionable
        {
            analysis.signal = SpreadSignal::Watch;
            analysis
                .reasoning
                .push_str(" Held at Watch until liquidity data is available.");
        }

        Ok(analysis)
    }
}

impl Default for SpreadAnalyzer {
    fn default() -> Self {
        Self::new(&AnalysisConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(fee: f64, slip: f64, min: f64) -> AnalysisParams {
        AnalysisParams {
            fee_percent: fee,
            slippage_percent: slip,
            min_profit_percent: min,
        }
    }

    #[test]
    fn test_net_profit_is_spread_minus_costs() {
        let p = params(0.3, 0.2, 0.5);
        let a = analyze_spread(100.0, 101.5, &p, true).unwrap();
        assert!((a.spread_percent - 1.5).abs() < 1e-9);
        assert_eq!(a.net_profit_percent, a.spread_percent - (0.3 + 0.2));
        assert_eq!(a.signal, SpreadSignal::Actionable);
        assert!(a.reasoning.starts_with("Net profit 1.00%"));
    }

    #[test]
    fn test_watch_and_no_signal_bands() {
        let p = params(0.3, 0.2, 0.5);

        // 0.4% spread: covers the fee, not the profit floor
        let watch = analyze_spread(100.0, 100.4, &p, true).unwrap();
        assert_eq!(watch.signal, SpreadSignal::Watch);

        // 0.1% spread: below fee
        let none = analyze_spread(100.0, 99.9, &p, true).unwrap();
        assert_eq!(none.signal, SpreadSignal::NoSignal);
        assert!(none.reasoning.contains("insufficient to cover costs 0.50%"));
    }

    #[test]
    fn test_missing_reserves_only_changes_reasoning() {
        let p = params(0.3, 0.2, 0.5);
        let with = analyze_spread(100.0, 102.0, &p, true).unwrap();
        let without = analyze_spread(100.0, 102.0, &p, false).unwrap();

        assert_eq!(with.signal, without.signal);
        assert_eq!(with.net_profit_percent, without.net_profit_percent);
        assert!(without.reasoning.starts_with(REDUCED_CONFIDENCE_NOTE));
        assert!(!without.has_liquidity_data);
    }

    #[test]
    fn test_zero_reference_price_rejected() {
        let p = params(0.3, 0.2, 0.5);
        let err = analyze_spread(0.0, 1.0, &p, true).unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
        assert!(analyze_spread(f64::NAN, 1.0, &p, true).is_err());
    }

    #[test]
    fn test_deterministic() {
        let p = params(0.25, 0.1, 0.2);
        let a = analyze_spread(0.00025, 0.000252, &p, false).unwrap();
        let b = analyze_spread(0.00025, 0.000252, &p, false).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_liquidity_policy_demotes_actionable() {
        let config = AnalysisConfig {
            slippage_pct: 0.2,
            min_profit_pct: 0.5,
            require_liquidity_for_actionable: true,
        };
        let analyzer = SpreadAnalyzer::new(&config);
        let a = analyzer.analyze(100.0, 102.0, 0.3, false).unwrap();
        assert_eq!(a.signal, SpreadSignal::Watch);

        let b = analyzer.analyze(100.0, 102.0, 0.3, true).unwrap();
        assert_eq!(b.signal, SpreadSignal::Actionable);
    }
}
