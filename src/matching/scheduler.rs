//! Fixed-cadence driver for the matching engine

use crate::matching::engine::MatchingEngine;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Runs one matching pass per tick until cancelled
pub struct MatchScheduler {
    engine: Arc<MatchingEngine>,
    tick: Duration,
    running: Arc<AtomicBool>,
}

impl MatchScheduler {
    pub fn new(engine: Arc<MatchingEngine>, tick: Duration) -> Self {
        Self {
            engine,
            tick,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared flag that is true while the loop is alive
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Drive the engine until `cancel` fires
    ///
    /// The first pass runs one full tick after start. Cancellation is only
    /// observed between passes, so a pass in progress always completes.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + self.tick, self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        self.running.store(true, Ordering::SeqCst);
        info!("Match scheduler started ({}ms tick)", self.tick.as_millis());

        let mut passes: u64 = 0;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            passes += 1;
            let started = Instant::now();

            match self.engine.run_pass().await {
                Ok(report) if !report.matches.is_empty() => debug!(
                    "Pass {} committed {} match(es) from {} candidate(s)",
                    passes,
                    report.matches.len(),
                    report.candidates
                ),
                Ok(_) => {}
                Err(e) => error!("Matching pass {} failed: {:#}", passes, e),
            }

            let elapsed = started.elapsed();
            if elapsed > self.tick {
                warn!(
                    "Matching pass {} took {}ms, longer than the {}ms tick",
                    passes,
                    elapsed.as_millis(),
                    self.tick.as_millis()
                );
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("Match scheduler stopped after {} pass(es)", passes);
    }
}
