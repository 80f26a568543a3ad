//! Arbitrage agent: the tick pipeline and every query the dashboard makes
//!
//! A tick runs Sense -> Analyze Routes -> Risk Sandbox -> Schedule. Source
//! I/O happens first with no lock held; all state transitions are then
//! applied under one lock, and the resulting facts are handed to the
//! persistence journal.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::agent::state::EngineState;
use crate::arbitrage;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::latency::{LatencySummary, StageTimer};
use crate::models::{
    ArbitrageSignal, DecisionEvent, DecisionStep, LatencyMetric, PriceSnapshot,
    ShadowExecutionMetrics, SignalDetectionEvent, SystemStatus, TradeLogEntry,
};
use crate::notifications::{NotificationCenter, PERSISTENCE_FAILURE, SOURCE_UNAVAILABLE};
use crate::pairs::{PairConfigProvider, StaticPairConfigs};
use crate::sources::{PriceQuote, PriceSource, SourceSet};
use crate::store::{EventKind, EventStore, PersistJournal, SqliteEventStore, StoredEvent};

/// Latency operation names
pub const OP_FETCH: &str = "fetch_prices";
pub const OP_ANALYZE: &str = "analyze_routes";
pub const OP_RISK: &str = "risk_sandbox";
/// Whole-tick duration; drives the smart delay
pub const OP_TICK: &str = "tick";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickReport {
    pub update_id: u64,
    /// Another tick was in flight; nothing ran
    pub skipped: bool,
    pub quotes: usize,
    pub source_errors: usize,
    pub signals: Vec<SignalDetectionEvent>,
    pub opened: Vec<TradeLogEntry>,
    pub resolved: Vec<TradeLogEntry>,
    pub next_delay_ms: u64,
}

impl TickReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

struct PairQuotes {
    pair_id: String,
    quotes: Vec<(String, PriceQuote)>,
}

/// Clears the in-flight flag when the tick ends, however it ends
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ArbitrageAgent {
    config: EngineConfig,
    state: Mutex<EngineState>,
    sources: RwLock<SourceSet>,
    pairs: Arc<dyn PairConfigProvider>,
    store: Arc<dyn EventStore>,
    journal: tokio::sync::Mutex<PersistJournal>,
    notifications: NotificationCenter,
    live_source: AtomicBool,
    tick_in_flight: AtomicBool,
}

impl ArbitrageAgent {
    pub fn new(
        config: EngineConfig,
        sources: SourceSet,
        pairs: Arc<dyn PairConfigProvider>,
        store: Arc<dyn EventStore>,
        notifications: NotificationCenter,
    ) -> EngineResult<Self> {
        config.validate()?;
        let state = EngineState::new(&config);
        let live = config.live_source_enabled;
        let journal = PersistJournal::with_capacity(config.journal_capacity);

        Ok(Self {
            config,
            state: Mutex::new(state),
            sources: RwLock::new(sources),
            pairs,
            store,
            journal: tokio::sync::Mutex::new(journal),
            notifications,
            live_source: AtomicBool::new(live),
            tick_in_flight: AtomicBool::new(false),
        })
    }

    /// Wire the production collaborators: SQLite store, configured sources,
    /// static pair table.
    pub fn from_config(config: EngineConfig) -> anyhow::Result<Self> {
        let pairs = Arc::new(StaticPairConfigs::new(&config.pairs)?);
        let sources = SourceSet::from_configs(&config.sources);
        let store = Arc::new(SqliteEventStore::new(&config.db_path)?);
        let agent = Self::new(config, sources, pairs, store, NotificationCenter::new())?;
        Ok(agent)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn notifications(&self) -> &NotificationCenter {
        &self.notifications
    }

    pub fn pairs(&self) -> &Arc<dyn PairConfigProvider> {
        &self.pairs
    }

    pub fn is_mainnet(&self) -> bool {
        self.config.is_mainnet()
    }

    pub fn live_source_enabled(&self) -> bool {
        self.live_source.load(Ordering::SeqCst)
    }

    pub fn set_live_source(&self, enabled: bool) {
        let previous = self.live_source.swap(enabled, Ordering::SeqCst);
        if previous != enabled {
            info!(enabled, "🔌 Live price source toggled");
        }
    }

    pub fn replace_sources(&self, sources: SourceSet) {
        *self.sources.write() = sources;
    }

    pub fn tick_in_flight(&self) -> bool {
        self.tick_in_flight.load(Ordering::Acquire)
    }

    /// Interval the scheduler should wait before the next tick
    pub fn next_delay(&self) -> Duration {
        self.state.lock().smart_delay.current()
    }

    pub fn last_update_id(&self) -> u64 {
        self.state.lock().last_update_id
    }

    pub fn status(&self, timer_running: bool) -> SystemStatus {
        SystemStatus::new(
            self.is_mainnet(),
            self.live_source_enabled(),
            timer_running,
            self.last_update_id(),
        )
    }

    // ----- queries -----

    pub fn decision_history(&self) -> Vec<DecisionEvent> {
        self.state.lock().decisions()
    }

    pub fn latency_metrics(&self) -> Vec<LatencyMetric> {
        self.state.lock().latency.all()
    }

    pub fn latency_summary(&self) -> LatencySummary {
        self.state.lock().latency.summary_for(OP_TICK)
    }

    pub fn signal_detection_events(&self) -> Vec<SignalDetectionEvent> {
        self.state.lock().detector.log().all()
    }

    /// Detections that tripped no risk rule
    pub fn safe_optimizer_dataset(&self) -> Vec<SignalDetectionEvent> {
        self.state.lock().detector.log().safe()
    }

    pub fn shadow_metrics(&self) -> ShadowExecutionMetrics {
        self.state.lock().shadow.metrics()
    }

    pub fn snapshots(&self) -> Vec<PriceSnapshot> {
        self.state.lock().snapshots.all()
    }

    pub fn run_arbitrage_analysis(&self, pair_id: &str) -> EngineResult<ArbitrageSignal> {
        let pair = self
            .pairs
            .get_pair_config(pair_id)
            .ok_or_else(|| EngineError::invalid(format!("unknown pair {}", pair_id)))?;

        let mut state = self.state.lock();
        let now = state.clock.now();
        arbitrage::run_arbitrage_analysis(
            pair_id,
            pair.fee_percent(),
            &state.snapshots,
            &state.analyzer,
            now,
        )
    }

    // ----- commands -----

    /// Record an externally observed snapshot
    pub async fn record_snapshot(&self, snapshot: PriceSnapshot) -> EngineResult<()> {
        let event = {
            let mut state = self.state.lock();
            state.snapshots.record(snapshot.clone())?;
            snapshot_event(&snapshot)?
        };
        debug!(pair_id = %snapshot.pair_id, dex = %snapshot.dex_name, "Snapshot recorded");
        self.persist(vec![event]).await.map(|_| ())
    }

    /// Run one full tick. Returns a skipped report if a tick is already in
    /// flight. A persistence failure is returned after the in-memory state
    /// has advanced; the events stay queued for the next flush.
    pub async fn run_tick(&self) -> EngineResult<TickReport> {
        let Some(_in_flight) = InFlightGuard::acquire(&self.tick_in_flight) else {
            debug!("Tick already in flight, skipping");
            return Ok(TickReport::skipped());
        };
        let tick_timer = StageTimer::start();

        // Sense: outbound I/O, no state lock held
        let sense_timer = StageTimer::start();
        let live = self.live_source_enabled();
        let sources: Vec<Arc<dyn PriceSource>> = self.sources.read().active(live).to_vec();
        let pair_ids = self.pairs.pair_ids();

        let mut fetched = Vec::with_capacity(pair_ids.len());
        let mut failures: Vec<(String, EngineError)> = Vec::new();
        for pair_id in &pair_ids {
            let mut quotes = Vec::with_capacity(sources.len());
            for source in &sources {
                match source.fetch_price(pair_id).await {
                    Ok(quote) => quotes.push((source.name().to_string(), quote)),
                    Err(e) => {
                        warn!(pair_id = %pair_id, source = source.name(), error = %e, "Price fetch failed");
                        failures.push((pair_id.clone(), e));
                    }
                }
            }
            fetched.push(PairQuotes {
                pair_id: pair_id.clone(),
                quotes,
            });
        }
        let sense_ns = sense_timer.elapsed_ns();

        let (report, events) = {
            let mut guard = self.state.lock();
            self.apply_tick(&mut guard, live, fetched, &failures, sense_ns, tick_timer)?
        };

        if failures.is_empty() {
            self.notifications.remove_warning(SOURCE_UNAVAILABLE);
        } else {
            let sources_down: Vec<String> = failures.iter().map(|(_, e)| e.to_string()).collect();
            self.notifications.add_warning(
                SOURCE_UNAVAILABLE,
                format!("Price source unavailable: {}", sources_down.join("; ")),
                false,
            );
        }

        info!(
            update_id = report.update_id,
            quotes = report.quotes,
            signals = report.signals.len(),
            opened = report.opened.len(),
            resolved = report.resolved.len(),
            next_delay_ms = report.next_delay_ms,
            "Tick complete"
        );

        self.persist(events).await?;
        Ok(report)
    }

    /// Secondary cadence: reload pair fees, evaluate shadow trades against
    /// the last known prices and retry the persistence journal.
    pub async fn run_refresh(&self) -> EngineResult<usize> {
        let Some(_in_flight) = InFlightGuard::acquire(&self.tick_in_flight) else {
            debug!("Tick in flight, refresh deferred");
            return Ok(0);
        };

        let events = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            for pair_id in self.pairs.pair_ids() {
                if let Some(pair) = self.pairs.get_pair_config(&pair_id) {
                    state.detector.set_pair_fee(&pair_id, pair.fee_percent());
                }
            }

            let now = state.clock.now();
            let resolved = state.shadow.on_tick(now, &state.last_prices);
            let mut events = Vec::with_capacity(resolved.len() + 1);
            for trade in &resolved {
                events.push(StoredEvent::new(
                    EventKind::TradeResolved,
                    trade.pair_id.as_str(),
                    now,
                    trade,
                )?);
            }
            if !resolved.is_empty() {
                let (seq, decision) = state.record_decision(
                    DecisionStep::RiskSandbox,
                    "resolved",
                    now,
                    format!("{} shadow trade(s) resolved on refresh", resolved.len()),
                );
                events.push(decision_event(seq, &decision)?);
            }
            events
        };

        self.persist(events).await
    }

    fn apply_tick(
        &self,
        state: &mut EngineState,
        live: bool,
        fetched: Vec<PairQuotes>,
        failures: &[(String, EngineError)],
        sense_ns: u64,
        tick_timer: StageTimer,
    ) -> EngineResult<(TickReport, Vec<StoredEvent>)> {
        let now = state.clock.now();
        let mut events = Vec::new();
        let mut report = TickReport::default();

        // ----- Sense -----
        for (pair_id, err) in failures {
            let (seq, decision) = state.record_decision(
                DecisionStep::Sense,
                err.decision_result(),
                now,
                format!("{}: {}", pair_id, err),
            );
            events.push(decision_event(seq, &decision)?);
        }

        for pair in &fetched {
            for (dex_name, quote) in &pair.quotes {
                let snapshot = quote.clone().into_snapshot(dex_name, &pair.pair_id);
                match state.snapshots.record(snapshot.clone()) {
                    Ok(()) => events.push(snapshot_event(&snapshot)?),
                    Err(e) => warn!(pair_id = %pair.pair_id, dex = %dex_name, error = %e, "Snapshot rejected"),
                }
            }
        }
        report.quotes = fetched.iter().map(|p| p.quotes.len()).sum();
        report.source_errors = failures.len();

        let sense_result = match (report.quotes, failures.is_empty()) {
            (0, true) => "skip",
            (0, false) => "error",
            _ => "success",
        };
        let (seq, decision) = state.record_decision(
            DecisionStep::Sense,
            sense_result,
            now,
            format!(
                "{} quote(s) for {} pair(s), {} source error(s), live={}",
                report.quotes,
                fetched.len(),
                failures.len(),
                live
            ),
        );
        events.push(decision_event(seq, &decision)?);
        state
            .latency
            .record(OP_FETCH, DecisionStep::Sense.as_str(), sense_ns, "", now);

        // ----- Analyze Routes -----
        // A pair missing any source is skipped: a partial quote set would
        // shift the mean price and read as a move.
        let degraded: HashSet<&str> = failures.iter().map(|(p, _)| p.as_str()).collect();
        let analyze_timer = StageTimer::start();
        let mut analyzed = 0usize;
        let mut spread_notes = Vec::new();
        for pair in fetched.iter().filter(|p| !p.quotes.is_empty()) {
            if degraded.contains(pair.pair_id.as_str()) {
                let missing = failures
                    .iter()
                    .filter(|(p, _)| *p == pair.pair_id)
                    .count();
                let (seq, decision) = state.record_decision(
                    DecisionStep::AnalyzeRoutes,
                    "source-error",
                    now,
                    format!(
                        "{}: skipped, {} source(s) unavailable",
                        pair.pair_id, missing
                    ),
                );
                events.push(decision_event(seq, &decision)?);
                continue;
            }
            analyzed += 1;
            let pair_config = self.pairs.get_pair_config(&pair.pair_id);
            let fee_percent = pair_config
                .as_ref()
                .map(|p| p.fee_percent())
                .unwrap_or(state.detector.config().default_fee_pct);
            let quote_usd = pair_config.as_ref().map(|p| p.quote_usd).unwrap_or(1.0);
            state.detector.set_pair_fee(&pair.pair_id, fee_percent);

            if let [(_, first), (_, second), ..] = pair.quotes.as_slice() {
                let has_reserves = first.reserves.is_some() && second.reserves.is_some();
                match state
                    .analyzer
                    .analyze(first.price, second.price, fee_percent, has_reserves)
                {
                    Ok(analysis) => spread_notes.push(format!(
                        "{} {} {:.3}%",
                        pair.pair_id,
                        analysis.signal.as_str(),
                        analysis.spread_percent
                    )),
                    Err(e) => {
                        let (seq, decision) = state.record_decision(
                            DecisionStep::AnalyzeRoutes,
                            e.decision_result(),
                            now,
                            format!("{}: {}", pair.pair_id, e),
                        );
                        events.push(decision_event(seq, &decision)?);
                    }
                }
            }

            let mean_price =
                pair.quotes.iter().map(|(_, q)| q.price).sum::<f64>() / pair.quotes.len() as f64;
            let tvl_usd = pair
                .quotes
                .iter()
                .find_map(|(_, q)| q.reserves)
                .map(|(_, quote_reserve)| quote_reserve * 2.0 * quote_usd)
                .unwrap_or(0.0);

            match state.detector.detect(&pair.pair_id, mean_price, tvl_usd, now) {
                Ok(Some(event)) => {
                    events.push(StoredEvent::new(
                        EventKind::Detection,
                        pair.pair_id.as_str(),
                        now,
                        &event,
                    )?);
                    report.signals.push(event);
                }
                Ok(None) => {}
                Err(e) => {
                    let (seq, decision) = state.record_decision(
                        DecisionStep::AnalyzeRoutes,
                        e.decision_result(),
                        now,
                        format!("{}: {}", pair.pair_id, e),
                    );
                    events.push(decision_event(seq, &decision)?);
                    continue;
                }
            }
            state.last_prices.insert(pair.pair_id.clone(), mean_price);
        }

        let (seq, decision) = state.record_decision(
            DecisionStep::AnalyzeRoutes,
            if analyzed == 0 { "skip" } else { "success" },
            now,
            format!(
                "{} pair(s) analyzed, {} signal(s){}{}",
                analyzed,
                report.signals.len(),
                if spread_notes.is_empty() { "" } else { "; " },
                spread_notes.join(", ")
            ),
        );
        events.push(decision_event(seq, &decision)?);
        state.latency.record(
            OP_ANALYZE,
            DecisionStep::AnalyzeRoutes.as_str(),
            analyze_timer.elapsed_ns(),
            "",
            now,
        );

        // ----- Risk Sandbox -----
        let risk_timer = StageTimer::start();
        let mut filtered = 0usize;
        for signal in &report.signals {
            if signal.high_risk {
                filtered += 1;
                continue;
            }
            let Some(entry_price) = state.last_prices.get(&signal.pair_id).copied() else {
                continue;
            };
            match state.shadow.on_safe_signal(signal, entry_price, now) {
                Ok(Some(trade)) => {
                    let (seq, decision) = state.record_decision(
                        DecisionStep::RiskSandbox,
                        "opened",
                        now,
                        format!(
                            "{} {:?} @ {} target {:.3}%",
                            trade.pair_id, trade.direction, trade.entry_price, trade.target_spread_pct
                        ),
                    );
                    events.push(decision_event(seq, &decision)?);
                    events.push(StoredEvent::new(
                        EventKind::TradeOpened,
                        trade.pair_id.as_str(),
                        now,
                        &trade,
                    )?);
                    report.opened.push(trade);
                }
                Ok(None) => {}
                Err(e) => {
                    let (seq, decision) = state.record_decision(
                        DecisionStep::RiskSandbox,
                        e.decision_result(),
                        now,
                        format!("{}: {}", signal.pair_id, e),
                    );
                    events.push(decision_event(seq, &decision)?);
                }
            }
        }

        report.resolved = state.shadow.on_tick(now, &state.last_prices);
        for trade in &report.resolved {
            events.push(StoredEvent::new(
                EventKind::TradeResolved,
                trade.pair_id.as_str(),
                now,
                trade,
            )?);
        }

        let risk_busy = !report.signals.is_empty() || !report.resolved.is_empty();
        let (seq, decision) = state.record_decision(
            DecisionStep::RiskSandbox,
            if risk_busy { "success" } else { "skip" },
            now,
            format!(
                "{} opened, {} resolved, {} high-risk filtered",
                report.opened.len(),
                report.resolved.len(),
                filtered
            ),
        );
        events.push(decision_event(seq, &decision)?);
        state.latency.record(
            OP_RISK,
            DecisionStep::RiskSandbox.as_str(),
            risk_timer.elapsed_ns(),
            "",
            now,
        );

        // ----- Schedule -----
        state.latency.record(
            OP_TICK,
            DecisionStep::Schedule.as_str(),
            tick_timer.elapsed_ns(),
            format!("{} pair(s)", fetched.len()),
            now,
        );
        let spike = state.latency.is_spike_for(OP_TICK);
        let previous = state.smart_delay.current();
        let next = state.smart_delay.next(spike);
        if next != previous {
            info!(
                previous_ms = previous.as_millis() as u64,
                next_ms = next.as_millis() as u64,
                spike,
                "⏱️ Smart delay adjusted"
            );
        }
        report.next_delay_ms = next.as_millis() as u64;

        let (seq, decision) = state.record_decision(
            DecisionStep::Schedule,
            "success",
            now,
            format!(
                "next tick in {}ms{}",
                report.next_delay_ms,
                if spike { " (latency spike)" } else { "" }
            ),
        );
        events.push(decision_event(seq, &decision)?);

        state.last_update_id += 1;
        report.update_id = state.last_update_id;

        Ok((report, events))
    }

    /// Hand events to the journal; raises or clears the persistence warning
    async fn persist(&self, events: Vec<StoredEvent>) -> EngineResult<usize> {
        let mut journal = self.journal.lock().await;
        match journal.persist(self.store.as_ref(), events).await {
            Ok(written) => {
                self.notifications.remove_warning(PERSISTENCE_FAILURE);
                Ok(written)
            }
            Err(e) => {
                error!(pending = journal.pending(), error = %e, "Persistence failure");
                let mut message =
                    format!("Event store unavailable, {} event(s) queued", journal.pending());
                if journal.dropped() > 0 {
                    message.push_str(&format!(", {} dropped", journal.dropped()));
                }
                self.notifications
                    .add_warning(PERSISTENCE_FAILURE, message, true);
                Err(e)
            }
        }
    }

    pub async fn pending_events(&self) -> usize {
        self.journal.lock().await.pending()
    }
}

fn decision_event(seq: u64, decision: &DecisionEvent) -> EngineResult<StoredEvent> {
    StoredEvent::new(
        EventKind::Decision,
        format!("{}#{}", decision.step.as_str(), seq),
        decision.timestamp,
        decision,
    )
}

fn snapshot_event(snapshot: &PriceSnapshot) -> EngineResult<StoredEvent> {
    StoredEvent::new(
        EventKind::Snapshot,
        format!("{}@{}", snapshot.pair_id, snapshot.dex_name),
        snapshot.timestamp,
        snapshot,
    )
}
