//! Adaptive tick interval
//!
//! Backs off multiplicatively while stages are spiking, then relaxes halfway
//! toward the floor on each stable tick.

use std::time::Duration;

use crate::config::SchedulerConfig;

#[derive(Debug, Clone)]
pub struct SmartDelay {
    current: Duration,
    floor: Duration,
    ceiling: Duration,
    backoff_factor: f64,
}

impl SmartDelay {
    pub fn new(config: &SchedulerConfig) -> Self {
        let floor = Duration::from_millis(config.min_interval_ms);
        let ceiling = Duration::from_millis(config.max_interval_ms.max(config.min_interval_ms));
        Self {
            current: config.base_interval().clamp(floor, ceiling),
            floor,
            ceiling,
            backoff_factor: config.backoff_factor.max(1.0),
        }
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    /// Recompute after a tick. Returns the new interval.
    pub fn next(&mut self, is_spike: bool) -> Duration {
        self.current = if is_spike {
            self.current.mul_f64(self.backoff_factor).min(self.ceiling)
        } else {
            let excess = self.current.saturating_sub(self.floor);
            self.floor + excess / 2
        };
        self.current
    }
}
