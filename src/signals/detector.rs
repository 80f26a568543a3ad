//! Spread event detection and risk classification
//!
//! Every tick feeds one price per pair. A detection fires when the price moved
//! at least `threshold_pct` against the previous buffered sample; it is then
//! sized against pool liquidity and classified by the liquidity / frequency
//! rules before being appended to the detection log.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::config::{DetectionConfig, MAX_WINDOW_MINUTES};
use crate::error::{EngineError, EngineResult};
use crate::models::{PricePoint, RiskCategory, SignalDetectionEvent};
use crate::signals::price_buffer::PriceBuffer;
use crate::signals::storage::DetectionLog;

pub struct SignalDetector {
    config: DetectionConfig,
    buffer: PriceBuffer,
    log: DetectionLog,
    pair_fees: HashMap<String, f64>,
}

impl SignalDetector {
    pub fn new(config: DetectionConfig) -> Self {
        let log = DetectionLog::new(config.log_capacity);
        Self {
            config,
            buffer: PriceBuffer::new(),
            log,
            pair_fees: HashMap::new(),
        }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub fn buffer(&self) -> &PriceBuffer {
        &self.buffer
    }

    pub fn log(&self) -> &DetectionLog {
        &self.log
    }

    /// Register the pair's fee (percent) from the config collaborator
    pub fn set_pair_fee(&mut self, pair_id: &str, fee_percent: f64) {
        self.pair_fees.insert(pair_id.to_string(), fee_percent);
    }

    pub fn fee_percent(&self, pair_id: &str) -> f64 {
        self.pair_fees
            .get(pair_id)
            .copied()
            .unwrap_or(self.config.default_fee_pct)
    }

    /// Feed one price. Returns the detection if the move crossed the
    /// threshold; `Ok(None)` is a filter result, not a failure.
    pub fn detect(
        &mut self,
        pair_id: &str,
        current_price: f64,
        tvl_usd: f64,
        now: DateTime<Utc>,
    ) -> EngineResult<Option<SignalDetectionEvent>> {
        if !(current_price.is_finite() && current_price > 0.0) {
            return Err(EngineError::invalid(format!(
                "price for {} must be positive, got {}",
                pair_id, current_price
            )));
        }
        if !(tvl_usd.is_finite() && tvl_usd >= 0.0) {
            return Err(EngineError::invalid(format!(
                "tvl for {} must be non-negative, got {}",
                pair_id, tvl_usd
            )));
        }

        let previous = self.buffer.latest_price(pair_id);
        self.buffer.push(pair_id, PricePoint::new(now, current_price));

        let Some(previous) = previous else {
            return Ok(None);
        };

        let price_delta = (current_price - previous) / previous * 100.0;
        if price_delta.abs() < self.config.threshold_pct {
            debug!(
                pair_id,
                price_delta, "Move below detection threshold"
            );
            return Ok(None);
        }

        let avg_price_deviation = self.buffer.volatility(pair_id);
        let safe_order_size = safe_order_size(
            tvl_usd,
            price_delta,
            self.config.slippage_tolerance_pct,
            self.config.max_order_fraction,
        );
        let fee_percent = self.fee_percent(pair_id);
        let fees = safe_order_size * fee_percent / 100.0;
        let estimated_return = safe_order_size * (price_delta.abs() - fee_percent) / 100.0;

        let window = Duration::minutes(self.config.window_minutes.clamp(1, MAX_WINDOW_MINUTES));
        let signals_per_hour = (self.log.count_in_window(pair_id, now, window) + 1) as u32;

        let low_liquidity = tvl_usd < self.config.min_tvl_usd;
        let high_frequency = signals_per_hour > self.config.max_signals_per_hour;
        let risk_category = RiskCategory::classify(low_liquidity, high_frequency);

        let event = SignalDetectionEvent {
            timestamp: now,
            pair_id: pair_id.to_string(),
            price_delta,
            avg_price_deviation,
            tvl: tvl_usd,
            fees,
            estimated_return,
            safe_order_size,
            signals_per_hour,
            high_risk: risk_category.is_high_risk(),
            risk_category,
        };

        info!(
            pair_id,
            price_delta = %format!("{:.3}", price_delta),
            tvl_usd,
            signals_per_hour,
            risk = risk_category.as_str(),
            "📡 Spread signal detected"
        );

        self.log.append(event.clone());
        Ok(Some(event))
    }
}

/// Largest order (USD) whose constant-product price impact stays within
/// `min(slippage_tolerance_pct, |price_delta|)`, capped at
/// `max_order_fraction` of TVL.
pub fn safe_order_size(
    tvl_usd: f64,
    price_delta: f64,
    slippage_tolerance_pct: f64,
    max_order_fraction: f64,
) -> f64 {
    if !(tvl_usd > 0.0) {
        return 0.0;
    }
    let tolerance = (slippage_tolerance_pct.min(price_delta.abs()) / 100.0).clamp(0.0, 0.99);
    let pool_side = tvl_usd / 2.0;
    let size = pool_side * tolerance / (1.0 - tolerance);

    size.min(tvl_usd * max_order_fraction)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> SignalDetector {
        SignalDetector::new(DetectionConfig::default())
    }

    #[test]
    fn test_first_sample_never_fires() {
        let mut d = detector();
        let now = Utc::now();
        assert!(d.detect("A/B", 100.0, 60_000.0, now).unwrap().is_none());
        assert_eq!(d.buffer().len("A/B"), 1);
    }

    #[test]
    fn test_below_threshold_filtered() {
        let mut d = detector();
        let now = Utc::now();
        d.detect("A/B", 100.0, 60_000.0, now).unwrap();
        let out = d
            .detect("A/B", 100.49, 60_000.0, now + Duration::seconds(2))
            .unwrap();
        assert!(out.is_none());
        assert!(d.log().is_empty());
    }

    #[test]
    fn test_negative_move_fires() {
        let mut d = detector();
        let now = Utc::now();
        d.detect("A/B", 100.0, 60_000.0, now).unwrap();
        let event = d
            .detect("A/B", 99.0, 60_000.0, now + Duration::seconds(2))
            .unwrap()
            .unwrap();
        assert!((event.price_delta + 1.0).abs() < 1e-9);
        assert!(event.avg_price_deviation > 0.0);
    }

    #[test]
    fn test_risk_boundary_grid() {
        // tvl in {49_999, 50_000} x signals/hour in {5, 6}
        for (tvl, target_count, expect_high) in [
            (49_999.0, 5u32, true),
            (49_999.0, 6, true),
            (50_000.0, 5, false),
            (50_000.0, 6, true),
        ] {
            let mut d = detector();
            let start = Utc::now();
            d.detect("A/B", 100.0, tvl, start).unwrap();

            let mut last = None;
            for i in 1..=target_count {
                let price = if i % 2 == 1 { 101.0 } else { 100.0 };
                last = d
                    .detect("A/B", price, tvl, start + Duration::minutes(i as i64))
                    .unwrap();
            }
            let event = last.expect("every alternating move crosses 0.5%");
            assert_eq!(event.signals_per_hour, target_count);
            assert_eq!(event.high_risk, expect_high, "tvl={tvl} count={target_count}");
            assert_eq!(
                event.high_risk,
                event.tvl < 50_000.0 || event.signals_per_hour > 5
            );
        }
    }

    #[test]
    fn test_frequency_window_slides() {
        let mut d = detector();
        let start = Utc::now();
        d.detect("A/B", 100.0, 60_000.0, start).unwrap();
        d.detect("A/B", 101.0, 60_000.0, start + Duration::minutes(1))
            .unwrap();
        let later = d
            .detect("A/B", 100.0, 60_000.0, start + Duration::minutes(62))
            .unwrap()
            .unwrap();
        assert_eq!(later.signals_per_hour, 1);
    }

    #[test]
    fn test_oversized_window_is_capped_not_panicking() {
        let mut d = SignalDetector::new(DetectionConfig {
            window_minutes: i64::MAX,
            ..DetectionConfig::default()
        });
        let start = Utc::now();
        d.detect("A/B", 100.0, 60_000.0, start).unwrap();
        let event = d
            .detect("A/B", 101.0, 60_000.0, start + Duration::minutes(1))
            .unwrap()
            .unwrap();
        assert_eq!(event.signals_per_hour, 1);
    }

    #[test]
    fn test_risk_category_labels() {
        let mut d = detector();
        let now = Utc::now();
        d.detect("A/B", 100.0, 10_000.0, now).unwrap();
        let event = d
            .detect("A/B", 100.6, 10_000.0, now + Duration::seconds(2))
            .unwrap()
            .unwrap();
        assert_eq!(event.risk_category, RiskCategory::LowLiquidity);
    }

    #[test]
    fn test_safe_order_size_bounds() {
        // 0.6% move, 0.5% tolerance -> tolerance 0.5%
        let size = safe_order_size(60_000.0, 0.6, 0.5, 0.10);
        let expected = 30_000.0 * 0.005 / 0.995;
        assert!((size - expected).abs() < 1e-6);

        // Fraction cap dominates on a huge tolerance
        let capped = safe_order_size(60_000.0, 50.0, 50.0, 0.10);
        assert!((capped - 6_000.0).abs() < 1e-9);

        assert_eq!(safe_order_size(0.0, 1.0, 0.5, 0.1), 0.0);
    }

    #[test]
    fn test_fee_and_return_use_pair_fee() {
        let mut d = detector();
        d.set_pair_fee("A/B", 0.1);
        let now = Utc::now();
        d.detect("A/B", 100.0, 60_000.0, now).unwrap();
        let event = d
            .detect("A/B", 101.0, 60_000.0, now + Duration::seconds(2))
            .unwrap()
            .unwrap();
        assert!((event.fees - event.safe_order_size * 0.001).abs() < 1e-9);
        assert!(event.estimated_return > 0.0);
    }

    #[test]
    fn test_invalid_price_rejected_and_not_buffered() {
        let mut d = detector();
        let err = d.detect("A/B", 0.0, 60_000.0, Utc::now()).unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
        assert_eq!(d.buffer().len("A/B"), 0);
    }
}
