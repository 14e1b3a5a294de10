//! Matching engine for the lineup service
//!
//! This module contains the greedy grouping algorithm, the engine that commits
//! groups against the queue store, and the scheduler that drives it.

pub mod engine;
pub mod grouping;
pub mod scheduler;

// Re-export commonly used types
pub use engine::{MatchingEngine, PassOutcome, PassReport};
pub use grouping::{form_groups, GreedyGrouper, Group, GroupingConfig, ReservationPolicy};
pub use scheduler::MatchScheduler;
