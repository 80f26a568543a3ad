//! In-memory engine state
//!
//! Everything a tick mutates lives in one struct behind one lock, so a
//! dashboard read never sees half of a tick.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};

use crate::arbitrage::{SnapshotStore, SpreadAnalyzer};
use crate::config::EngineConfig;
use crate::latency::{LatencyMonitor, SmartDelay};
use crate::models::{DecisionEvent, DecisionStep};
use crate::shadow::ShadowExecutionEngine;
use crate::signals::SignalDetector;

/// Non-decreasing wall clock. Two reads never return the same instant, so
/// `kind:pair:timestamp` event keys stay unique across ticks.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: Option<DateTime<Utc>>,
}

impl MonotonicClock {
    pub fn now(&mut self) -> DateTime<Utc> {
        let wall = Utc::now();
        let next = match self.last {
            Some(last) if wall <= last => last + Duration::nanoseconds(1),
            _ => wall,
        };
        self.last = Some(next);
        next
    }
}

pub struct EngineState {
    pub detector: SignalDetector,
    pub analyzer: SpreadAnalyzer,
    pub shadow: ShadowExecutionEngine,
    pub latency: LatencyMonitor,
    pub smart_delay: SmartDelay,
    pub snapshots: SnapshotStore,
    pub last_prices: HashMap<String, f64>,
    pub last_update_id: u64,
    pub clock: MonotonicClock,
    decisions: VecDeque<DecisionEvent>,
    decision_capacity: usize,
    decision_seq: u64,
}

impl EngineState {
    pub fn new(config: &EngineConfig) -> Self {
        let mut detector = SignalDetector::new(config.detection.clone());
        for pair in &config.pairs {
            detector.set_pair_fee(&pair.pair_id, pair.fee_percent());
        }

        Self {
            detector,
            analyzer: SpreadAnalyzer::new(&config.analysis),
            shadow: ShadowExecutionEngine::new(config.shadow.clone()),
            latency: LatencyMonitor::new(&config.latency),
            smart_delay: SmartDelay::new(&config.scheduler),
            snapshots: SnapshotStore::new(),
            last_prices: HashMap::new(),
            last_update_id: 0,
            clock: MonotonicClock::default(),
            decisions: VecDeque::new(),
            decision_capacity: config.scheduler.decision_capacity.max(1),
            decision_seq: 0,
        }
    }

    /// Append to the audit trail; returns the event and its sequence number
    pub fn record_decision(
        &mut self,
        step: DecisionStep,
        result: &str,
        timestamp: DateTime<Utc>,
        details: impl Into<String>,
    ) -> (u64, DecisionEvent) {
        let event = DecisionEvent::new(step, result, timestamp, details);
        if self.decisions.len() >= self.decision_capacity {
            self.decisions.pop_front();
        }
        self.decisions.push_back(event.clone());
        self.decision_seq += 1;
        (self.decision_seq, event)
    }

    pub fn decisions(&self) -> Vec<DecisionEvent> {
        self.decisions.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_strictly_increases() {
        let mut clock = MonotonicClock::default();
        let mut last = clock.now();
        for _ in 0..1_000 {
            let next = clock.now();
            assert!(next > last);
            last = next;
        }
    }

    #[test]
    fn test_decision_log_capped() {
        let mut config = EngineConfig::default();
        config.scheduler.decision_capacity = 2;
        let mut state = EngineState::new(&config);
        let now = Utc::now();
        state.record_decision(DecisionStep::Sense, "success", now, "a");
        state.record_decision(DecisionStep::AnalyzeRoutes, "success", now, "b");
        let (seq, _) = state.record_decision(DecisionStep::Schedule, "success", now, "c");

        assert_eq!(seq, 3);
        let decisions = state.decisions();
        assert_eq!(decisions.len(), 2);
        assert_eq!(decisions[0].step, DecisionStep::AnalyzeRoutes);
    }

    #[test]
    fn test_pair_fees_registered() {
        let state = EngineState::new(&EngineConfig::default());
        assert!((state.detector.fee_percent("ICP/ckBTC") - 0.30).abs() < 1e-12);
    }
}
