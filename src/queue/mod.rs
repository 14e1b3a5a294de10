//! Waiting queue for the matchmaking service
//!
//! Holds players keyed by id with their rating, supports rating-ordered
//! snapshots and atomic removal of whole groups.

pub mod store;

// Re-export commonly used types
pub use store::{validate_join_request, InMemoryQueueStore, QueueStore};
