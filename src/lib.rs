//! Lineup - MMR matchmaking queue service
//!
//! This crate groups waiting players into fixed-size matches by skill rating,
//! widening the tolerance band until a group fills, and commits each group
//! atomically before announcing it to WebSocket subscribers.

pub mod api;
pub mod config;
pub mod error;
pub mod matching;
pub mod metrics;
pub mod notify;
pub mod queue;
pub mod service;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{MatchmakingError, Result};
pub use types::*;

// Re-export key components
pub use matching::{GreedyGrouper, GroupingConfig, MatchScheduler, MatchingEngine, ReservationPolicy};
pub use notify::{MatchPublisher, NotificationHub};
pub use queue::{InMemoryQueueStore, QueueStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
