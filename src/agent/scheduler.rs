//! Timer that drives the agent
//!
//! `stopped -> running -> stopped`. One spawned loop per running scheduler:
//! a smart-delay sleep for the sense tick, a fixed interval for the refresh
//! tick, and a watch channel for shutdown. `stop()` only prevents future
//! ticks; a tick already running finishes normally.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::agent::engine::ArbitrageAgent;
use crate::error::{EngineError, EngineResult};
use crate::models::SystemStatus;
use crate::notifications::TIMER_START_FAILED;

/// Decrements the armed-timer count when the loop task ends
struct ArmedGuard(Arc<AtomicUsize>);

impl Drop for ArmedGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct SchedulerLoop {
    agent: Arc<ArbitrageAgent>,
    running: AtomicBool,
    armed_timers: Arc<AtomicUsize>,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
}

impl SchedulerLoop {
    pub fn new(agent: Arc<ArbitrageAgent>) -> Self {
        Self {
            agent,
            running: AtomicBool::new(false),
            armed_timers: Arc::new(AtomicUsize::new(0)),
            shutdown: Mutex::new(None),
        }
    }

    pub fn agent(&self) -> &Arc<ArbitrageAgent> {
        &self.agent
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Live loop tasks. Briefly 2 after a stop/start while the old loop
    /// finishes its last tick.
    pub fn armed_timers(&self) -> usize {
        self.armed_timers.load(Ordering::SeqCst)
    }

    pub fn timer_running(&self) -> bool {
        self.is_running() && self.armed_timers() > 0
    }

    pub fn system_ready(&self) -> bool {
        self.status().system_ready
    }

    pub fn status(&self) -> SystemStatus {
        self.agent.status(self.timer_running())
    }

    /// Arm the timers. Returns `Ok(false)` if already running.
    pub fn start(&self) -> EngineResult<bool> {
        let mut shutdown = self.shutdown.lock();
        if shutdown.is_some() {
            return Ok(false);
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                self.agent.notifications().add_warning(
                    TIMER_START_FAILED,
                    format!("Failed to start scheduler timer: {}", e),
                    true,
                );
                return Err(EngineError::Config(format!(
                    "scheduler needs a tokio runtime: {}",
                    e
                )));
            }
        };

        let (tx, rx) = watch::channel(false);
        self.armed_timers.fetch_add(1, Ordering::SeqCst);
        let armed = ArmedGuard(self.armed_timers.clone());
        let refresh_every = self.agent.config().scheduler.refresh_interval();

        runtime.spawn(run_loop(self.agent.clone(), rx, armed, refresh_every));

        *shutdown = Some(tx);
        self.running.store(true, Ordering::SeqCst);
        self.agent.notifications().remove_warning(TIMER_START_FAILED);

        info!(
            base_ms = self.agent.next_delay().as_millis() as u64,
            refresh_ms = refresh_every.as_millis() as u64,
            "▶️ Scheduler started"
        );
        Ok(true)
    }

    /// Cancel future ticks. Returns `false` if already stopped.
    pub fn stop(&self) -> bool {
        let Some(tx) = self.shutdown.lock().take() else {
            return false;
        };
        self.running.store(false, Ordering::SeqCst);
        // Receiver gone means the loop already exited
        let _ = tx.send(true);
        info!(
            tick_in_flight = self.agent.tick_in_flight(),
            "⏹️ Scheduler stopped"
        );
        true
    }
}

impl Drop for SchedulerLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_loop(
    agent: Arc<ArbitrageAgent>,
    mut shutdown: watch::Receiver<bool>,
    _armed: ArmedGuard,
    refresh_every: Duration,
) {
    let mut refresh = tokio::time::interval(refresh_every);
    refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // First interval tick fires immediately
    refresh.tick().await;

    // Pinned across iterations so refresh ticks don't restart the countdown
    let tick_sleep = tokio::time::sleep(agent.next_delay());
    tokio::pin!(tick_sleep);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = &mut tick_sleep => {
                if let Err(e) = agent.run_tick().await {
                    warn!(error = %e, result = e.decision_result(), "Tick finished with error");
                }
                tick_sleep.as_mut().reset(Instant::now() + agent.next_delay());
            }
            _ = refresh.tick() => {
                if let Err(e) = agent.run_refresh().await {
                    warn!(error = %e, "Refresh finished with error");
                }
            }
        }
        if *shutdown.borrow() {
            break;
        }
    }

    info!("Scheduler loop exited");
}
