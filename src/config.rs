//! Engine configuration
//!
//! Loaded from TOML (every field has a serde default), then overridden by
//! environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{EngineError, EngineResult};
use crate::models::PairConfig;

/// Upper bound for `shadow.resolution_deadline_secs` (one week)
pub const MAX_RESOLUTION_DEADLINE_SECS: u64 = 7 * 24 * 60 * 60;
/// Upper bound for `detection.window_minutes` (one week)
pub const MAX_WINDOW_MINUTES: i64 = 7 * 24 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    Staging,
    Local,
}

impl Environment {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" | "mainnet" => Some(Environment::Production),
            "staging" => Some(Environment::Staging),
            "local" | "dev" | "development" => Some(Environment::Local),
            _ => None,
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Environment::Local
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub environment: Environment,

    /// Start with the live price sources instead of the simulated ones
    #[serde(default)]
    pub live_source_enabled: bool,

    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default)]
    pub pairs: Vec<PairConfig>,

    #[serde(default)]
    pub sources: Vec<SourceConfig>,

    #[serde(default)]
    pub analysis: AnalysisConfig,

    #[serde(default)]
    pub detection: DetectionConfig,

    #[serde(default)]
    pub shadow: ShadowConfig,

    #[serde(default)]
    pub latency: LatencyConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Events held for retry while the store is down; oldest dropped first
    #[serde(default = "default_journal_capacity")]
    pub journal_capacity: usize,
}

fn default_db_path() -> String {
    "arbwatch_events.db".to_string()
}

fn default_journal_capacity() -> usize {
    10_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            live_source_enabled: false,
            db_path: default_db_path(),
            pairs: vec![PairConfig::new("ICP", "ckBTC", "icp-ckbtc", 30)],
            sources: vec![
                SourceConfig::simulated("ICPSwap"),
                SourceConfig::simulated("KongSwap"),
            ],
            analysis: AnalysisConfig::default(),
            detection: DetectionConfig::default(),
            shadow: ShadowConfig::default(),
            latency: LatencyConfig::default(),
            scheduler: SchedulerConfig::default(),
            journal_capacity: default_journal_capacity(),
        }
    }
}

impl EngineConfig {
    /// Load from TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load from `ARBWATCH_CONFIG` (or `arbwatch.toml`), falling back to
    /// defaults, then apply env overrides.
    pub fn from_env() -> Self {
        let path =
            std::env::var("ARBWATCH_CONFIG").unwrap_or_else(|_| "arbwatch.toml".to_string());

        let mut config = Self::load(&path).unwrap_or_else(|e| {
            tracing::debug!("Using default engine config ({}): {}", path, e);
            Self::default()
        });
        config.apply_env_overrides();
        config
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(env) = std::env::var("ARBWATCH_ENV")
            .ok()
            .and_then(|v| Environment::parse(&v))
        {
            self.environment = env;
        }
        if let Ok(v) = std::env::var("ARBWATCH_LIVE_SOURCE") {
            self.live_source_enabled = matches!(v.as_str(), "1" | "true" | "TRUE" | "on" | "ON");
        }
        if let Ok(v) = std::env::var("ARBWATCH_DB_PATH") {
            if !v.trim().is_empty() {
                self.db_path = v;
            }
        }
    }

    pub fn is_mainnet(&self) -> bool {
        self.environment == Environment::Production
    }

    pub fn validate(&self) -> EngineResult<()> {
        for pair in &self.pairs {
            pair.validate()?;
        }
        let mut ids: Vec<&str> = self.pairs.iter().map(|p| p.pair_id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.len() != self.pairs.len() {
            return Err(EngineError::Config("duplicate pair_id in pairs".into()));
        }
        self.scheduler.validate()?;
        if !(self.detection.threshold_pct > 0.0) {
            return Err(EngineError::Config(
                "detection.threshold_pct must be positive".into(),
            ));
        }
        if !(self.detection.max_order_fraction > 0.0 && self.detection.max_order_fraction <= 1.0) {
            return Err(EngineError::Config(
                "detection.max_order_fraction must be in (0, 1]".into(),
            ));
        }
        if !(1..=MAX_WINDOW_MINUTES).contains(&self.detection.window_minutes) {
            return Err(EngineError::Config(format!(
                "detection.window_minutes must be in 1..={}",
                MAX_WINDOW_MINUTES
            )));
        }
        if !(1..=MAX_RESOLUTION_DEADLINE_SECS).contains(&self.shadow.resolution_deadline_secs) {
            return Err(EngineError::Config(format!(
                "shadow.resolution_deadline_secs must be in 1..={}",
                MAX_RESOLUTION_DEADLINE_SECS
            )));
        }
        if !(self.shadow.stop_loss_pct.is_finite() && self.shadow.stop_loss_pct > 0.0) {
            return Err(EngineError::Config(
                "shadow.stop_loss_pct must be positive".into(),
            ));
        }
        if !(self.shadow.target_capture_ratio.is_finite() && self.shadow.target_capture_ratio > 0.0)
        {
            return Err(EngineError::Config(
                "shadow.target_capture_ratio must be positive".into(),
            ));
        }
        if self.journal_capacity == 0 {
            return Err(EngineError::Config("journal_capacity must be non-zero".into()));
        }
        Ok(())
    }

    /// Save to TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Simulated,
    Http,
}

/// One price source (a DEX). `live` sources are used only when the live flag
/// is on; simulated sources otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub kind: SourceKind,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_source_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_source_timeout_ms() -> u64 {
    5_000
}

impl SourceConfig {
    pub fn simulated(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: SourceKind::Simulated,
            base_url: None,
            timeout_ms: default_source_timeout_ms(),
        }
    }

    pub fn http(name: &str, base_url: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: SourceKind::Http,
            base_url: Some(base_url.to_string()),
            timeout_ms: default_source_timeout_ms(),
        }
    }
}

/// Spread analyzer cost parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_slippage_pct")]
    pub slippage_pct: f64,
    #[serde(default = "default_min_profit_pct")]
    pub min_profit_pct: f64,
    /// Demote `Actionable` to `Watch` when no reserve data is available
    #[serde(default)]
    pub require_liquidity_for_actionable: bool,
}

fn default_slippage_pct() -> f64 {
    0.5
}

fn default_min_profit_pct() -> f64 {
    0.3
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            slippage_pct: default_slippage_pct(),
            min_profit_pct: default_min_profit_pct(),
            require_liquidity_for_actionable: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    #[serde(default = "default_threshold_pct")]
    pub threshold_pct: f64,
    #[serde(default = "default_min_tvl_usd")]
    pub min_tvl_usd: f64,
    #[serde(default = "default_max_signals_per_hour")]
    pub max_signals_per_hour: u32,
    #[serde(default = "default_window_minutes")]
    pub window_minutes: i64,
    /// Fee used when the pair config has none
    #[serde(default = "default_fee_pct")]
    pub default_fee_pct: f64,
    #[serde(default = "default_slippage_tolerance_pct")]
    pub slippage_tolerance_pct: f64,
    #[serde(default = "default_max_order_fraction")]
    pub max_order_fraction: f64,
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,
}

fn default_threshold_pct() -> f64 {
    0.5
}
fn default_min_tvl_usd() -> f64 {
    50_000.0
}
fn default_max_signals_per_hour() -> u32 {
    5
}
fn default_window_minutes() -> i64 {
    60
}
fn default_fee_pct() -> f64 {
    0.3
}
fn default_slippage_tolerance_pct() -> f64 {
    0.5
}
fn default_max_order_fraction() -> f64 {
    0.10
}
fn default_log_capacity() -> usize {
    10_000
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            threshold_pct: default_threshold_pct(),
            min_tvl_usd: default_min_tvl_usd(),
            max_signals_per_hour: default_max_signals_per_hour(),
            window_minutes: default_window_minutes(),
            default_fee_pct: default_fee_pct(),
            slippage_tolerance_pct: default_slippage_tolerance_pct(),
            max_order_fraction: default_max_order_fraction(),
            log_capacity: default_log_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShadowConfig {
    /// Target = |priceDelta| x ratio
    #[serde(default = "default_target_capture_ratio")]
    pub target_capture_ratio: f64,
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: f64,
    #[serde(default = "default_resolution_deadline_secs")]
    pub resolution_deadline_secs: u64,
    #[serde(default = "default_shadow_log_limit")]
    pub log_limit: usize,
    #[serde(default = "default_trade_capacity")]
    pub trade_capacity: usize,
}

fn default_target_capture_ratio() -> f64 {
    1.0
}
fn default_stop_loss_pct() -> f64 {
    1.0
}
fn default_resolution_deadline_secs() -> u64 {
    300
}
fn default_shadow_log_limit() -> usize {
    50
}
fn default_trade_capacity() -> usize {
    10_000
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            target_capture_ratio: default_target_capture_ratio(),
            stop_loss_pct: default_stop_loss_pct(),
            resolution_deadline_secs: default_resolution_deadline_secs(),
            log_limit: default_shadow_log_limit(),
            trade_capacity: default_trade_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencyConfig {
    #[serde(default = "default_latency_window")]
    pub window: usize,
    #[serde(default = "default_spike_ratio")]
    pub spike_ratio: f64,
    #[serde(default = "default_latency_capacity")]
    pub capacity: usize,
}

fn default_latency_window() -> usize {
    10
}
fn default_spike_ratio() -> f64 {
    1.5
}
fn default_latency_capacity() -> usize {
    1_000
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            window: default_latency_window(),
            spike_ratio: default_spike_ratio(),
            capacity: default_latency_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Sensory polling cadence
    #[serde(default = "default_base_interval_ms")]
    pub base_interval_ms: u64,
    /// Source refresh + shadow evaluation cadence
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "default_decision_capacity")]
    pub decision_capacity: usize,
}

fn default_base_interval_ms() -> u64 {
    2_000
}
fn default_refresh_interval_ms() -> u64 {
    10_000
}
fn default_min_interval_ms() -> u64 {
    2_000
}
fn default_max_interval_ms() -> u64 {
    30_000
}
fn default_backoff_factor() -> f64 {
    2.0
}
fn default_decision_capacity() -> usize {
    1_000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            base_interval_ms: default_base_interval_ms(),
            refresh_interval_ms: default_refresh_interval_ms(),
            min_interval_ms: default_min_interval_ms(),
            max_interval_ms: default_max_interval_ms(),
            backoff_factor: default_backoff_factor(),
            decision_capacity: default_decision_capacity(),
        }
    }
}

impl SchedulerConfig {
    pub fn base_interval(&self) -> Duration {
        Duration::from_millis(self.base_interval_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.base_interval_ms == 0 || self.refresh_interval_ms == 0 {
            return Err(EngineError::Config("scheduler intervals must be non-zero".into()));
        }
        if self.min_interval_ms > self.max_interval_ms {
            return Err(EngineError::Config(
                "scheduler.min_interval_ms exceeds max_interval_ms".into(),
            ));
        }
        if !(self.backoff_factor >= 1.0) {
            return Err(EngineError::Config(
                "scheduler.backoff_factor must be >= 1.0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.is_mainnet());
        assert_eq!(config.detection.max_signals_per_hour, 5);
        assert_eq!(config.scheduler.base_interval(), Duration::from_secs(2));
        assert_eq!(config.scheduler.refresh_interval(), Duration::from_secs(10));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let raw = r#"
            environment = "production"

            [[pairs]]
            pairId = "ICP/ckUSDC"
            baseSymbol = "ICP"
            quoteSymbol = "ckUSDC"
            poolId = "pool-7"
            feeBps = 30

            [shadow]
            stop_loss_pct = 2.0
        "#;
        let config: EngineConfig = toml::from_str(raw).unwrap();
        assert!(config.is_mainnet());
        assert_eq!(config.pairs.len(), 1);
        assert_eq!(config.pairs[0].quote_usd, 1.0);
        assert_eq!(config.shadow.stop_loss_pct, 2.0);
        assert_eq!(config.shadow.resolution_deadline_secs, 300);
        assert_eq!(config.detection.threshold_pct, 0.5);
        assert!(config.sources.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duplicate_pairs_rejected() {
        let mut config = EngineConfig::default();
        config.pairs.push(config.pairs[0].clone());
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_out_of_range_shadow_and_window_rejected() {
        let cases: [fn(&mut EngineConfig); 11] = [
            |c| c.shadow.resolution_deadline_secs = 10_000_000_000_000_000,
            |c| c.shadow.resolution_deadline_secs = u64::MAX,
            |c| c.shadow.resolution_deadline_secs = 0,
            |c| c.shadow.stop_loss_pct = -1.0,
            |c| c.shadow.stop_loss_pct = 0.0,
            |c| c.shadow.target_capture_ratio = 0.0,
            |c| c.shadow.target_capture_ratio = -0.5,
            |c| c.shadow.target_capture_ratio = f64::NAN,
            |c| c.detection.window_minutes = 0,
            |c| c.detection.window_minutes = i64::MAX,
            |c| c.journal_capacity = 0,
        ];
        for (i, mutate) in cases.iter().enumerate() {
            let mut config = EngineConfig::default();
            mutate(&mut config);
            assert!(
                matches!(config.validate(), Err(EngineError::Config(_))),
                "case {} should be rejected",
                i
            );
        }

        let mut config = EngineConfig::default();
        config.shadow.resolution_deadline_secs = MAX_RESOLUTION_DEADLINE_SECS;
        config.detection.window_minutes = MAX_WINDOW_MINUTES;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_environment_parse() {
        assert_eq!(Environment::parse("mainnet"), Some(Environment::Production));
        assert_eq!(Environment::parse("Local"), Some(Environment::Local));
        assert_eq!(Environment::parse("moon"), None);
    }

    #[test]
    fn test_save_and_load_round_trip_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arbwatch.toml");
        let mut config = EngineConfig::default();
        config.scheduler.base_interval_ms = 500;
        config.save(&path).unwrap();

        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded.scheduler.base_interval_ms, 500);
        assert_eq!(loaded.pairs, config.pairs);
    }
}
