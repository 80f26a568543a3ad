//! End-to-end detection and shadow-execution scenarios
//!
//! Drives the detector, shadow engine and scheduler through their public
//! API with explicit timestamps, so no test depends on wall-clock timing
//! except the scheduler ones.

use chrono::{Duration, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use arbwatch_backend::agent::{ArbitrageAgent, SchedulerLoop};
use arbwatch_backend::config::{DetectionConfig, EngineConfig, ShadowConfig, SourceConfig};
use arbwatch_backend::models::{PairConfig, RiskCategory, ShadowTradeStatus};
use arbwatch_backend::notifications::NotificationCenter;
use arbwatch_backend::pairs::StaticPairConfigs;
use arbwatch_backend::shadow::ShadowExecutionEngine;
use arbwatch_backend::signals::SignalDetector;
use arbwatch_backend::sources::{PriceSource, ScriptedPriceSource, SourceSet};
use arbwatch_backend::store::MemoryEventStore;

const PAIR: &str = "A/B";

fn t0() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

fn prices(price: f64) -> HashMap<String, f64> {
    HashMap::from([(PAIR.to_string(), price)])
}

#[test]
fn test_deep_pool_move_is_safe_signal() {
    let mut detector = SignalDetector::new(DetectionConfig::default());

    assert!(detector.detect(PAIR, 100.0, 60_000.0, t0()).unwrap().is_none());
    let event = detector
        .detect(PAIR, 100.6, 60_000.0, t0() + Duration::seconds(2))
        .unwrap()
        .expect("0.6% move should cross the 0.5% threshold");

    assert!((event.price_delta - 0.6).abs() < 1e-9);
    assert!(!event.high_risk);
    assert_eq!(event.risk_category, RiskCategory::Safe);
    assert_eq!(event.signals_per_hour, 1);
    assert!(event.safe_order_size > 0.0);
    assert_eq!(detector.log().safe().len(), 1);
}

#[test]
fn test_shallow_pool_move_is_high_risk_and_never_traded() {
    let mut detector = SignalDetector::new(DetectionConfig::default());
    let mut shadow = ShadowExecutionEngine::new(ShadowConfig::default());

    detector.detect(PAIR, 100.0, 10_000.0, t0()).unwrap();
    let event = detector
        .detect(PAIR, 100.6, 10_000.0, t0() + Duration::seconds(2))
        .unwrap()
        .unwrap();

    assert!(event.high_risk);
    assert_eq!(event.risk_category, RiskCategory::LowLiquidity);
    assert!(detector.log().safe().is_empty());
    assert!(shadow.on_safe_signal(&event, 100.6, t0()).unwrap().is_none());
    assert_eq!(shadow.metrics().total_opportunities, 0);
}

#[test]
fn test_risk_grid() {
    // (tvl, moves before the checked one) -> category of the last detection
    let cases = [
        (60_000.0, 1, RiskCategory::Safe),
        (10_000.0, 1, RiskCategory::LowLiquidity),
        (60_000.0, 6, RiskCategory::HighFrequency),
        (10_000.0, 6, RiskCategory::LowLiquidityHighFrequency),
    ];

    for (tvl, moves, expected) in cases {
        let mut detector = SignalDetector::new(DetectionConfig::default());
        detector.detect(PAIR, 100.0, tvl, t0()).unwrap();

        let mut last = None;
        for i in 1..=moves {
            // Alternate 100 <-> 101 so every step is a ~1% move
            let price = if i % 2 == 1 { 101.0 } else { 100.0 };
            let at = t0() + Duration::minutes(i as i64);
            last = detector.detect(PAIR, price, tvl, at).unwrap();
        }

        let event = last.expect("every step should fire");
        assert_eq!(event.risk_category, expected, "tvl={} moves={}", tvl, moves);
        assert_eq!(event.high_risk, expected != RiskCategory::Safe);
    }
}

#[test]
fn test_price_reaching_target_resolves_success() {
    let mut detector = SignalDetector::new(DetectionConfig::default());
    let mut shadow = ShadowExecutionEngine::new(ShadowConfig::default());

    detector.detect(PAIR, 100.0, 60_000.0, t0()).unwrap();
    let event = detector
        .detect(PAIR, 100.6, 60_000.0, t0() + Duration::seconds(1))
        .unwrap()
        .unwrap();

    let opened_at = t0() + Duration::seconds(1);
    let trade = shadow
        .on_safe_signal(&event, 100.0, opened_at)
        .unwrap()
        .unwrap();
    let target = trade.target_spread_pct;

    // Halfway there: still active
    assert!(shadow
        .on_tick(opened_at + Duration::seconds(10), &prices(100.3))
        .is_empty());

    let resolved = shadow.on_tick(
        opened_at + Duration::seconds(20),
        &prices(100.0 * (1.0 + target / 100.0)),
    );
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].status, ShadowTradeStatus::Success);
    assert!((resolved[0].realized_return.unwrap() - target).abs() < 1e-6);

    let metrics = shadow.metrics();
    assert_eq!(metrics.total_opportunities, 1);
    assert_eq!(metrics.success_rate, 1.0);
}

#[test]
fn test_flat_price_past_deadline_times_out() {
    let config = ShadowConfig::default();
    let deadline = Duration::seconds(config.resolution_deadline_secs as i64);
    let mut detector = SignalDetector::new(DetectionConfig::default());
    let mut shadow = ShadowExecutionEngine::new(config);

    detector.detect(PAIR, 100.0, 60_000.0, t0()).unwrap();
    let event = detector
        .detect(PAIR, 100.6, 60_000.0, t0())
        .unwrap()
        .unwrap();
    shadow.on_safe_signal(&event, 100.6, t0()).unwrap().unwrap();

    assert!(shadow
        .on_tick(t0() + deadline - Duration::seconds(1), &prices(100.6))
        .is_empty());

    let resolved = shadow.on_tick(t0() + deadline, &prices(100.6));
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].status, ShadowTradeStatus::Timeout);
    assert_ne!(resolved[0].status, ShadowTradeStatus::Failed);
    assert_eq!(resolved[0].realized_return, Some(0.0));
}

fn scheduler() -> SchedulerLoop {
    let mut config = EngineConfig::default();
    config.pairs = vec![PairConfig::new("A", "B", "pool-ab", 30)];
    config.sources = vec![SourceConfig::simulated("replay")];
    config.scheduler.base_interval_ms = 20;
    config.scheduler.min_interval_ms = 20;
    config.scheduler.refresh_interval_ms = 50;

    let source = Arc::new(ScriptedPriceSource::new("replay"));
    source.push_prices(PAIR, &[100.0], None);
    let sources = SourceSet {
        live: Vec::new(),
        simulated: vec![source as Arc<dyn PriceSource>],
    };
    let pairs = Arc::new(StaticPairConfigs::new(&config.pairs).unwrap());
    let agent = ArbitrageAgent::new(
        config,
        sources,
        pairs,
        Arc::new(MemoryEventStore::new()),
        NotificationCenter::new(),
    )
    .unwrap();
    SchedulerLoop::new(Arc::new(agent))
}

#[tokio::test]
async fn test_start_twice_arms_one_timer() {
    let scheduler = scheduler();

    assert!(scheduler.start().unwrap());
    assert!(!scheduler.start().unwrap());
    assert_eq!(scheduler.armed_timers(), 1);
    assert!(scheduler.status().timer_running);

    assert!(scheduler.stop());
    assert!(!scheduler.stop());
    assert!(!scheduler.is_running());
}

#[tokio::test]
async fn test_running_scheduler_advances_update_id() {
    let scheduler = scheduler();
    scheduler.start().unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    scheduler.stop();

    let ticks = scheduler.agent().last_update_id();
    assert!(ticks >= 1, "expected at least one tick, got {}", ticks);
    // Not production, so never ready
    assert!(!scheduler.system_ready());
}
