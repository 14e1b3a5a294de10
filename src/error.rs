//! Error types for the matchmaking service
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the application.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific matchmaking scenarios
#[derive(Debug, thiserror::Error)]
pub enum MatchmakingError {
    #[error("Queue storage unavailable: {message}")]
    StorageUnavailable { message: String },

    #[error("Group is stale, {missing} member(s) no longer queued: {player_ids:?}")]
    StaleGroup {
        missing: usize,
        player_ids: Vec<String>,
    },

    #[error("Invalid join request: {reason}")]
    InvalidJoinRequest { reason: String },

    #[error("Notification channel closed")]
    NotificationChannelClosed,

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}
