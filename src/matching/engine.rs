//! Matching engine
//!
//! One pass reads a bounded, rating-ordered snapshot from the queue store,
//! groups it greedily and commits each complete group before looking for the
//! next one. A failed commit aborts the rest of the pass; the players stay
//! queued and are reconsidered on the next tick.

use crate::error::{MatchmakingError, Result};
use crate::matching::grouping::{GreedyGrouper, Group, GroupingConfig};
use crate::metrics::collector::pass_outcome;
use crate::metrics::MetricsCollector;
use crate::notify::MatchPublisher;
use crate::queue::QueueStore;
use crate::types::{Match, MatchEvent};
use crate::utils::{current_timestamp, generate_match_id};
use anyhow::Context;
use std::sync::Arc;
use tracing::{debug, error, info};

/// How a pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Not enough candidates to form a single group
    Idle,
    /// Enough candidates, but no complete group
    NoMatch,
    /// At least one group was committed
    Matched,
}

impl PassOutcome {
    fn label(self) -> &'static str {
        match self {
            PassOutcome::Idle => pass_outcome::IDLE,
            PassOutcome::NoMatch => pass_outcome::NO_MATCH,
            PassOutcome::Matched => pass_outcome::MATCHED,
        }
    }
}

/// Summary of one completed pass
#[derive(Debug, Clone)]
pub struct PassReport {
    pub outcome: PassOutcome,
    /// Size of the snapshot the pass worked on
    pub candidates: usize,
    /// Matches committed during the pass, in commit order
    pub matches: Vec<Match>,
}

impl PassReport {
    fn new(candidates: usize) -> Self {
        Self {
            outcome: PassOutcome::Idle,
            candidates,
            matches: Vec::new(),
        }
    }

    pub fn players_matched(&self) -> usize {
        self.matches.iter().map(|m| m.players.len()).sum()
    }
}

/// Matching engine tying the store, the grouping algorithm and the publisher together
pub struct MatchingEngine {
    store: Arc<dyn QueueStore>,
    publisher: Arc<dyn MatchPublisher>,
    grouping: GroupingConfig,
    candidate_limit: usize,
    metrics: Arc<MetricsCollector>,
}

impl MatchingEngine {
    pub fn new(
        store: Arc<dyn QueueStore>,
        publisher: Arc<dyn MatchPublisher>,
        grouping: GroupingConfig,
        candidate_limit: usize,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            store,
            publisher,
            grouping,
            candidate_limit,
            metrics,
        }
    }

    pub fn grouping(&self) -> &GroupingConfig {
        &self.grouping
    }

    /// Run a single matching pass
    pub async fn run_pass(&self) -> Result<PassReport> {
        let timer = self.metrics.start_timer();
        let result = self.execute_pass().await;

        let outcome = match &result {
            Ok(report) => report.outcome.label(),
            Err(_) => pass_outcome::FAILED,
        };
        self.metrics.record_pass(outcome, timer.stop());
        self.refresh_queue_size().await;

        result
    }

    async fn execute_pass(&self) -> Result<PassReport> {
        let candidates = self
            .store
            .peek(self.candidate_limit)
            .await
            .context("Failed to read candidate pool")?;

        let mut report = PassReport::new(candidates.len());
        if candidates.len() < self.grouping.group_size {
            debug!(
                "{} candidate(s) waiting, {} needed for a match",
                candidates.len(),
                self.grouping.group_size
            );
            return Ok(report);
        }

        report.outcome = PassOutcome::NoMatch;
        for group in GreedyGrouper::new(&candidates, self.grouping.clone()) {
            let formed = self.commit_group(group).await.with_context(|| {
                format!(
                    "Matching pass aborted after {} match(es)",
                    report.matches.len()
                )
            })?;
            report.outcome = PassOutcome::Matched;
            report.matches.push(formed);
        }

        debug!(
            "Pass over {} candidate(s) formed {} match(es)",
            report.candidates,
            report.matches.len()
        );
        Ok(report)
    }

    /// Atomically remove a group from the queue, then announce it
    ///
    /// Nothing is published unless the commit succeeded. A failed publish is
    /// logged and counted but the players stay matched.
    pub async fn commit_group(&self, group: Group) -> Result<Match> {
        let band = group.band();

        if let Err(e) = self.store.commit_match(group.members()).await {
            let reason = match e.downcast_ref::<MatchmakingError>() {
                Some(MatchmakingError::StaleGroup { .. }) => "stale_group",
                _ => "storage",
            };
            self.metrics.record_commit_failure(reason);
            error!(
                "Failed to commit group seeded by '{}': {:#}",
                group.seed().id,
                e
            );
            return Err(e);
        }

        let formed = Match {
            match_id: generate_match_id(),
            players: group.into_members(),
            formed_at: current_timestamp(),
        };
        self.metrics.record_match(formed.players.len(), band);

        info!(
            "Match {} formed with {} players (band {:.1}): {:?}",
            formed.match_id,
            formed.players.len(),
            band,
            formed.player_ids()
        );

        if let Err(e) = self
            .publisher
            .publish_match_found(MatchEvent::MatchFound(formed.clone()))
            .await
        {
            error!("Failed to publish match {}: {:#}", formed.match_id, e);
            self.metrics
                .record_notification_dropped("publish_failed", 1);
        }

        Ok(formed)
    }

    async fn refresh_queue_size(&self) {
        match self.store.queue_size().await {
            Ok(size) => self.metrics.set_queue_size(size),
            Err(e) => debug!("Could not refresh queue size: {:#}", e),
        }
    }
}
