//! Rolling stage-latency window with spike detection

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Instant;

use crate::config::LatencyConfig;
use crate::models::LatencyMetric;

/// Latency panel summary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencySummary {
    pub latest_ms: f64,
    pub rolling_average_ms: f64,
    pub is_spike: bool,
    pub count: usize,
}

/// Wall-clock timer for one pipeline stage
#[derive(Debug, Clone, Copy)]
pub struct StageTimer(Instant);

impl StageTimer {
    pub fn start() -> Self {
        Self(Instant::now())
    }

    pub fn elapsed_ns(&self) -> u64 {
        u64::try_from(self.0.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}

pub struct LatencyMonitor {
    metrics: VecDeque<LatencyMetric>,
    capacity: usize,
    window: usize,
    spike_ratio: f64,
}

impl LatencyMonitor {
    pub fn new(config: &LatencyConfig) -> Self {
        Self {
            metrics: VecDeque::new(),
            capacity: config.capacity.max(1),
            window: config.window.max(1),
            spike_ratio: config.spike_ratio,
        }
    }

    pub fn record(
        &mut self,
        operation: &str,
        stage: &str,
        duration_ns: u64,
        details: impl Into<String>,
        now: DateTime<Utc>,
    ) {
        if self.metrics.len() >= self.capacity {
            self.metrics.pop_front();
        }
        self.metrics.push_back(LatencyMetric {
            operation: operation.to_string(),
            stage: stage.to_string(),
            duration_ns,
            timestamp: now,
            details: details.into(),
        });
    }

    /// Mean duration (ns) of the newest `n` samples; 0 when empty
    pub fn rolling_average(&self, n: usize) -> f64 {
        let n = n.min(self.metrics.len());
        if n == 0 {
            return 0.0;
        }
        let sum: f64 = self
            .metrics
            .iter()
            .rev()
            .take(n)
            .map(|m| m.duration_ns as f64)
            .sum();
        sum / n as f64
    }

    /// Latest sample exceeds `spike_ratio` x the rolling average
    pub fn is_spike(&self) -> bool {
        match self.metrics.back() {
            Some(latest) => {
                latest.duration_ns as f64 > self.spike_ratio * self.rolling_average(self.window)
            }
            None => false,
        }
    }

    /// Rolling average over the newest `n` samples of one operation
    pub fn rolling_average_for(&self, operation: &str, n: usize) -> f64 {
        let samples: Vec<f64> = self
            .metrics
            .iter()
            .rev()
            .filter(|m| m.operation == operation)
            .take(n)
            .map(|m| m.duration_ns as f64)
            .collect();
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().sum::<f64>() / samples.len() as f64
    }

    pub fn is_spike_for(&self, operation: &str) -> bool {
        match self.metrics.iter().rev().find(|m| m.operation == operation) {
            Some(latest) => {
                latest.duration_ns as f64
                    > self.spike_ratio * self.rolling_average_for(operation, self.window)
            }
            None => false,
        }
    }

    /// Panel summary for one operation
    pub fn summary_for(&self, operation: &str) -> LatencySummary {
        let latest = self.metrics.iter().rev().find(|m| m.operation == operation);
        LatencySummary {
            latest_ms: latest.map(|m| m.duration_ns as f64 / 1e6).unwrap_or(0.0),
            rolling_average_ms: self.rolling_average_for(operation, self.window) / 1e6,
            is_spike: self.is_spike_for(operation),
            count: self
                .metrics
                .iter()
                .filter(|m| m.operation == operation)
                .count(),
        }
    }

    pub fn latest(&self) -> Option<&LatencyMetric> {
        self.metrics.back()
    }

    pub fn all(&self) -> Vec<LatencyMetric> {
        self.metrics.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn summary(&self) -> LatencySummary {
        LatencySummary {
            latest_ms: self
                .latest()
                .map(|m| m.duration_ns as f64 / 1e6)
                .unwrap_or(0.0),
            rolling_average_ms: self.rolling_average(self.window) / 1e6,
            is_spike: self.is_spike(),
            count: self.metrics.len(),
        }
    }
}
