use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};

/// One observation in a per-pair ring buffer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

impl PricePoint {
    pub fn new(timestamp: DateTime<Utc>, price: f64) -> Self {
        Self { timestamp, price }
    }
}

/// Raw, source-attributed price observation. `reserves` is only present for
/// AMM sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceSnapshot {
    pub timestamp: DateTime<Utc>,
    pub dex_name: String,
    pub pair_id: String,
    pub price: f64,
    #[serde(default)]
    pub reserves: Option<(f64, f64)>,
    #[serde(default)]
    pub raw_response: String,
}

/// Which risk rule(s) flagged a detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskCategory {
    Safe,
    LowLiquidity,
    HighFrequency,
    LowLiquidityHighFrequency,
}

impl RiskCategory {
    pub fn classify(low_liquidity: bool, high_frequency: bool) -> Self {
        match (low_liquidity, high_frequency) {
            (false, false) => RiskCategory::Safe,
            (true, false) => RiskCategory::LowLiquidity,
            (false, true) => RiskCategory::HighFrequency,
            (true, true) => RiskCategory::LowLiquidityHighFrequency,
        }
    }

    pub fn is_high_risk(&self) -> bool {
        !matches!(self, RiskCategory::Safe)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskCategory::Safe => "safe",
            RiskCategory::LowLiquidity => "low_liquidity",
            RiskCategory::HighFrequency => "high_frequency",
            RiskCategory::LowLiquidityHighFrequency => "low_liquidity_high_frequency",
        }
    }
}

/// Immutable fact produced by the signal detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalDetectionEvent {
    pub timestamp: DateTime<Utc>,
    pub pair_id: String,
    /// Instantaneous % change vs. the previous buffered sample (signed)
    pub price_delta: f64,
    /// Rolling volatility of the pair's buffer, % of mean
    pub avg_price_deviation: f64,
    pub tvl: f64,
    /// Fees (USD) on `safe_order_size`
    pub fees: f64,
    /// Net expected return (USD) on `safe_order_size`
    pub estimated_return: f64,
    pub safe_order_size: f64,
    pub signals_per_hour: u32,
    pub high_risk: bool,
    pub risk_category: RiskCategory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShadowTradeStatus {
    Active,
    Success,
    Timeout,
    Failed,
}

impl ShadowTradeStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ShadowTradeStatus::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ShadowTradeStatus::Active => "active",
            ShadowTradeStatus::Success => "success",
            ShadowTradeStatus::Timeout => "timeout",
            ShadowTradeStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeDirection {
    Long,
    Short,
}

impl TradeDirection {
    /// Follow the move that fired the signal
    pub fn from_delta(price_delta: f64) -> Self {
        if price_delta >= 0.0 {
            TradeDirection::Long
        } else {
            TradeDirection::Short
        }
    }

    pub fn sign(&self) -> f64 {
        match self {
            TradeDirection::Long => 1.0,
            TradeDirection::Short => -1.0,
        }
    }
}

/// Full lifecycle of one shadow trade. Exit fields are only populated on the
/// transition out of `Active`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeLogEntry {
    pub id: Uuid,
    pub pair_id: String,
    pub timestamp: DateTime<Utc>,
    pub direction: TradeDirection,
    pub entry_price: f64,
    /// Favorable move (%) required for success
    pub target_spread_pct: f64,
    pub exit_price: Option<f64>,
    pub status: ShadowTradeStatus,
    /// Signed return in percent
    pub realized_return: Option<f64>,
    pub resolution_reason: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShadowExecutionMetrics {
    pub total_opportunities: u64,
    pub success_rate: f64,
    pub avg_spread_captured: f64,
    pub shadow_execution_log: Vec<TradeLogEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencyMetric {
    pub operation: String,
    pub stage: String,
    pub duration_ns: u64,
    pub timestamp: DateTime<Utc>,
    pub details: String,
}

/// The four stages of one scheduler tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionStep {
    Sense,
    #[serde(rename = "Analyze Routes")]
    AnalyzeRoutes,
    #[serde(rename = "Risk Sandbox")]
    RiskSandbox,
    Schedule,
}

impl DecisionStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionStep::Sense => "Sense",
            DecisionStep::AnalyzeRoutes => "Analyze Routes",
            DecisionStep::RiskSandbox => "Risk Sandbox",
            DecisionStep::Schedule => "Schedule",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionEvent {
    pub step: DecisionStep,
    pub result: String,
    pub timestamp: DateTime<Utc>,
    pub details: String,
}

impl DecisionEvent {
    pub fn new(
        step: DecisionStep,
        result: impl Into<String>,
        timestamp: DateTime<Utc>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            step,
            result: result.into(),
            timestamp,
            details: details.into(),
        }
    }
}

/// Result of a one-off spread analysis between two sources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArbitrageSignal {
    pub pair_id: String,
    pub action: String,
    pub reasoning: String,
    pub spread_percent: f64,
    pub fees_considered: f64,
    pub timestamp: DateTime<Utc>,
}

/// Trading pair definition served by the config collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairConfig {
    pub pair_id: String,
    pub base_symbol: String,
    pub quote_symbol: String,
    pub pool_id: String,
    #[serde(default)]
    pub fee_bps: u32,
    /// USD value of one quote unit, for TVL estimation from reserves
    #[serde(default = "default_quote_usd")]
    pub quote_usd: f64,
}

fn default_quote_usd() -> f64 {
    1.0
}

impl PairConfig {
    pub fn new(base_symbol: &str, quote_symbol: &str, pool_id: &str, fee_bps: u32) -> Self {
        Self {
            pair_id: format!("{}/{}", base_symbol, quote_symbol),
            base_symbol: base_symbol.to_string(),
            quote_symbol: quote_symbol.to_string(),
            pool_id: pool_id.to_string(),
            fee_bps,
            quote_usd: default_quote_usd(),
        }
    }

    pub fn fee_percent(&self) -> f64 {
        self.fee_bps as f64 / 100.0
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.base_symbol.trim().is_empty() {
            return Err(EngineError::Config("Base symbol is required".into()));
        }
        if self.quote_symbol.trim().is_empty() {
            return Err(EngineError::Config("Quote symbol is required".into()));
        }
        if self.pool_id.trim().is_empty() {
            return Err(EngineError::Config("Pool ID is required".into()));
        }
        if !(self.quote_usd.is_finite() && self.quote_usd > 0.0) {
            return Err(EngineError::Config(format!(
                "quote_usd for {} must be positive",
                self.pair_id
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub is_mainnet: bool,
    pub live_source_enabled: bool,
    pub timer_running: bool,
    pub system_ready: bool,
    pub last_update_id: u64,
}

impl SystemStatus {
    pub fn new(is_mainnet: bool, live_source_enabled: bool, timer_running: bool, last_update_id: u64) -> Self {
        Self {
            is_mainnet,
            live_source_enabled,
            timer_running,
            system_ready: is_mainnet && live_source_enabled && timer_running,
            last_update_id,
        }
    }
}
