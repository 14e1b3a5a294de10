//! Match event publishing interface

use crate::error::Result;
use crate::types::MatchEvent;
use async_trait::async_trait;
use std::sync::Mutex;

/// Trait for announcing formed matches
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MatchPublisher: Send + Sync {
    /// Publish a match_found event to whoever is listening
    async fn publish_match_found(&self, event: MatchEvent) -> Result<()>;
}

/// Publisher that keeps every event in memory, used by tests and benches
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<MatchEvent>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events published so far
    pub fn events(&self) -> Vec<MatchEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Number of events published so far
    pub fn count(&self) -> usize {
        self.events.lock().map(|events| events.len()).unwrap_or(0)
    }
}

#[async_trait]
impl MatchPublisher for RecordingPublisher {
    async fn publish_match_found(&self, event: MatchEvent) -> Result<()> {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
        Ok(())
    }
}
