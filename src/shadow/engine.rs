//! Shadow trade state machine and scorekeeping
//!
//! One trade per pair may be `active` at a time. Resolution counters are kept
//! incrementally so the aggregate metrics stay exact even after old log
//! entries are evicted.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{ShadowConfig, MAX_RESOLUTION_DEADLINE_SECS};
use crate::error::{EngineError, EngineResult};
use crate::models::{
    ShadowExecutionMetrics, ShadowTradeStatus, SignalDetectionEvent, TradeDirection,
    TradeLogEntry,
};

/// Float slack when comparing a realized move against its target
const RETURN_EPSILON: f64 = 1e-9;

pub const REASON_TARGET: &str = "target reached";
pub const REASON_STOP: &str = "stop triggered";
pub const REASON_DEADLINE: &str = "deadline exceeded";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShadowStats {
    pub opened: u64,
    pub success_count: u64,
    pub failed_count: u64,
    pub timeout_count: u64,
    /// Sum of realized return (%) over successful trades
    pub success_return_sum: f64,
}

impl ShadowStats {
    pub fn resolved(&self) -> u64 {
        self.success_count + self.failed_count + self.timeout_count
    }

    pub fn success_rate(&self) -> f64 {
        let resolved = self.resolved();
        if resolved > 0 {
            self.success_count as f64 / resolved as f64
        } else {
            0.0
        }
    }

    pub fn avg_spread_captured(&self) -> f64 {
        if self.success_count > 0 {
            self.success_return_sum / self.success_count as f64
        } else {
            0.0
        }
    }
}

pub struct ShadowExecutionEngine {
    config: ShadowConfig,
    /// Every trade in open order, oldest terminal entries evicted past capacity
    trades: VecDeque<TradeLogEntry>,
    /// pair_id -> id of its active trade
    active: HashMap<String, Uuid>,
    stats: ShadowStats,
}

impl ShadowExecutionEngine {
    pub fn new(config: ShadowConfig) -> Self {
        Self {
            config,
            trades: VecDeque::new(),
            active: HashMap::new(),
            stats: ShadowStats::default(),
        }
    }

    pub fn config(&self) -> &ShadowConfig {
        &self.config
    }

    pub fn stats(&self) -> &ShadowStats {
        &self.stats
    }

    pub fn has_active(&self, pair_id: &str) -> bool {
        self.active.contains_key(pair_id)
    }

    pub fn active_trades(&self) -> Vec<TradeLogEntry> {
        self.trades
            .iter()
            .filter(|t| t.status == ShadowTradeStatus::Active)
            .cloned()
            .collect()
    }

    /// Open a trade for a safe detection.
    ///
    /// Returns `Ok(None)` when the pair already has an active trade or the
    /// event is high-risk; neither is an error.
    pub fn on_safe_signal(
        &mut self,
        event: &SignalDetectionEvent,
        entry_price: f64,
        now: DateTime<Utc>,
    ) -> EngineResult<Option<TradeLogEntry>> {
        if event.high_risk {
            debug!(pair_id = %event.pair_id, "High-risk signal never shadow-traded");
            return Ok(None);
        }
        if !(entry_price.is_finite() && entry_price > 0.0) {
            return Err(EngineError::invalid(format!(
                "entry price for {} must be positive, got {}",
                event.pair_id, entry_price
            )));
        }
        if self.active.contains_key(&event.pair_id) {
            debug!(pair_id = %event.pair_id, "Shadow trade already active, signal ignored");
            return Ok(None);
        }

        let entry = TradeLogEntry {
            id: Uuid::new_v4(),
            pair_id: event.pair_id.clone(),
            timestamp: now,
            direction: TradeDirection::from_delta(event.price_delta),
            entry_price,
            target_spread_pct: event.price_delta.abs() * self.config.target_capture_ratio,
            exit_price: None,
            status: ShadowTradeStatus::Active,
            realized_return: None,
            resolution_reason: None,
            resolved_at: None,
        };

        self.active.insert(entry.pair_id.clone(), entry.id);
        self.trades.push_back(entry.clone());
        self.stats.opened += 1;
        self.evict_terminal();

        info!(
            pair_id = %entry.pair_id,
            direction = ?entry.direction,
            entry_price,
            target_pct = entry.target_spread_pct,
            "👻 Shadow trade opened"
        );

        Ok(Some(entry))
    }

    /// Step every active trade against the latest prices. Returns the trades
    /// that resolved on this step.
    pub fn on_tick(
        &mut self,
        now: DateTime<Utc>,
        prices: &HashMap<String, f64>,
    ) -> Vec<TradeLogEntry> {
        let deadline_secs = self
            .config
            .resolution_deadline_secs
            .min(MAX_RESOLUTION_DEADLINE_SECS);
        let deadline = Duration::seconds(deadline_secs as i64);
        let stop = self.config.stop_loss_pct;
        let mut resolved = Vec::new();

        for trade in self
            .trades
            .iter_mut()
            .filter(|t| t.status == ShadowTradeStatus::Active)
        {
            let current = prices
                .get(&trade.pair_id)
                .copied()
                .filter(|p| p.is_finite() && *p > 0.0);

            let outcome = match current {
                Some(price) => {
                    let signed_return = signed_return_pct(trade.direction, trade.entry_price, price);
                    if signed_return + RETURN_EPSILON >= trade.target_spread_pct {
                        Some((ShadowTradeStatus::Success, price, REASON_TARGET))
                    } else if -signed_return >= stop {
                        Some((ShadowTradeStatus::Failed, price, REASON_STOP))
                    } else if now - trade.timestamp >= deadline {
                        Some((ShadowTradeStatus::Timeout, price, REASON_DEADLINE))
                    } else {
                        None
                    }
                }
                // No quote this tick: only the clock can resolve it
                None if now - trade.timestamp >= deadline => {
                    Some((ShadowTradeStatus::Timeout, trade.entry_price, REASON_DEADLINE))
                }
                None => None,
            };

            let Some((status, exit_price, reason)) = outcome else {
                continue;
            };

            let realized = signed_return_pct(trade.direction, trade.entry_price, exit_price);
            trade.exit_price = Some(exit_price);
            trade.realized_return = Some(realized);
            trade.resolution_reason = Some(reason.to_string());
            trade.resolved_at = Some(now);
            trade.status = status;

            match status {
                ShadowTradeStatus::Success => {
                    self.stats.success_count += 1;
                    self.stats.success_return_sum += realized;
                }
                ShadowTradeStatus::Failed => self.stats.failed_count += 1,
                ShadowTradeStatus::Timeout => self.stats.timeout_count += 1,
                ShadowTradeStatus::Active => {}
            }

            info!(
                pair_id = %trade.pair_id,
                status = status.as_str(),
                realized_return = realized,
                reason,
                "Shadow trade resolved"
            );
            resolved.push(trade.clone());
        }

        for trade in &resolved {
            self.active.remove(&trade.pair_id);
        }
        self.evict_terminal();

        resolved
    }

    /// Aggregates over every trade ever opened, plus the newest `log_limit`
    /// log entries (timestamp descending).
    pub fn metrics(&self) -> ShadowExecutionMetrics {
        let mut log: Vec<TradeLogEntry> = self.trades.iter().cloned().collect();
        log.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        log.truncate(self.config.log_limit);

        ShadowExecutionMetrics {
            total_opportunities: self.stats.opened,
            success_rate: self.stats.success_rate(),
            avg_spread_captured: self.stats.avg_spread_captured(),
            shadow_execution_log: log,
        }
    }

    fn evict_terminal(&mut self) {
        while self.trades.len() > self.config.trade_capacity.max(1) {
            let Some(idx) = self.trades.iter().position(|t| t.status.is_terminal()) else {
                break;
            };
            self.trades.remove(idx);
        }
    }
}

fn signed_return_pct(direction: TradeDirection, entry: f64, current: f64) -> f64 {
    direction.sign() * (current - entry) / entry * 100.0
}
